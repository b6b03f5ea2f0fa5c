//! Extended node store (`spec.md` §3, §4.D).

use super::binary_search_id;
use crate::error::{CoreError, Result};
use crate::model::{NodeX, NO_NODE};

#[derive(Default)]
pub struct NodesX {
    nodes: Vec<NodeX>,
    /// Original OSM ids, parallel to `nodes` once sorted; used for
    /// `Index()` and, later, diagnostics (`log::OriginalIdLookup`).
    ids: Vec<u64>,
    sorted: bool,
}

impl NodesX {
    pub fn new() -> Self {
        NodesX::default()
    }

    pub fn append(&mut self, node: NodeX) -> Result<()> {
        if self.nodes.len() >= u32::MAX as usize {
            return Err(CoreError::CapacityExceeded("NodesX"));
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Sort by ascending OSM id. Stable, so nodes that share an id (a data
    /// error upstream) keep their append order.
    pub fn sort(&mut self) {
        let mut indexed: Vec<(u64, NodeX)> = self.nodes.iter().map(|n| (n.id, *n)).collect();
        indexed.sort_by_key(|(id, _)| *id);
        self.ids = indexed.iter().map(|(id, _)| *id).collect();
        self.nodes = indexed.into_iter().map(|(_, n)| n).collect();
        self.sorted = true;
    }

    /// Binary search by original OSM id, returning the node's sorted index
    /// or `NO_NODE`.
    pub fn index_of(&self, id: u64) -> u32 {
        debug_assert!(self.sorted, "NodesX::index_of called before sort()");
        binary_search_id(&self.ids, id).unwrap_or(NO_NODE)
    }

    pub fn get(&self, index: u32) -> &NodeX {
        &self.nodes[index as usize]
    }

    pub fn get_mut(&mut self, index: u32) -> &mut NodeX {
        &mut self.nodes[index as usize]
    }

    pub fn original_id(&self, index: u32) -> u64 {
        self.ids.get(index as usize).copied().unwrap_or(index as u64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &NodeX)> {
        self.nodes.iter().enumerate().map(|(i, n)| (i as u32, n))
    }

    pub fn original_ids(&self) -> &[u64] {
        &self.ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u64, lat: i32, lon: i32) -> NodeX {
        NodeX {
            id,
            allow: crate::model::transports::ALL_VEHICLES,
            flags: 0,
            lat,
            lon,
        }
    }

    #[test]
    fn sorts_by_id_and_supports_lookup() {
        let mut nodes = NodesX::new();
        nodes.append(node(30, 1, 1)).unwrap();
        nodes.append(node(10, 2, 2)).unwrap();
        nodes.append(node(20, 3, 3)).unwrap();
        nodes.sort();

        assert_eq!(nodes.index_of(10), 0);
        assert_eq!(nodes.index_of(20), 1);
        assert_eq!(nodes.index_of(30), 2);
        assert_eq!(nodes.index_of(999), NO_NODE);
        assert_eq!(nodes.get(1).lat, 3);
    }
}
