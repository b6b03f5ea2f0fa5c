//! Extended way store (`spec.md` §3, §4.D).
//!
//! Keeps the parsed node-reference list alongside each `Way` payload so
//! `segment::split_ways` (§4.E) can walk it after the store has been
//! sorted and deduplicated.

use super::binary_search_id;
use crate::error::{CoreError, Result};
use crate::log::{DiagnosticLog, EntityKind, EntityRef, Severity};
use crate::model::{Way, NO_WAY};

#[derive(Clone, Debug)]
pub struct WayEntry {
    pub way: Way,
    pub node_refs: Vec<u64>,
    pub name: String,
}

#[derive(Default)]
pub struct WaysX {
    entries: Vec<WayEntry>,
    ids: Vec<u64>,
    sorted: bool,
    /// Set by `segment::split_ways` once a way has contributed at least
    /// one surviving segment (`spec.md` §4.E).
    used: Vec<bool>,
}

impl WaysX {
    pub fn new() -> Self {
        WaysX::default()
    }

    pub fn append(&mut self, id: u64, way: Way, node_refs: Vec<u64>, name: String) -> Result<()> {
        if self.entries.len() >= u32::MAX as usize {
            return Err(CoreError::CapacityExceeded("WaysX"));
        }
        self.ids.push(id);
        self.entries.push(WayEntry { way, node_refs, name });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Sort by ascending OSM id (`SortWayList`). Ways sharing an id with an
    /// identical payload are a parse-time duplicate (`spec.md` §8 E3): the
    /// second copy is dropped and logged. Ways sharing an id with a
    /// *different* payload are treated the same way — only one version of
    /// a given way id can survive, so whichever sorts first wins, and the
    /// rest are logged as duplicates too.
    pub fn sort(&mut self, log: &mut DiagnosticLog) {
        let mut indexed: Vec<(u64, WayEntry)> = self
            .ids
            .iter()
            .zip(self.entries.iter())
            .map(|(&id, e)| (id, e.clone()))
            .collect();
        indexed.sort_by_key(|(id, _)| *id);

        let mut ids = Vec::with_capacity(indexed.len());
        let mut entries = Vec::with_capacity(indexed.len());
        let mut i = 0;
        while i < indexed.len() {
            let (id, entry) = indexed[i].clone();
            let mut j = i + 1;
            while j < indexed.len() && indexed[j].0 == id {
                log.record(
                    &[EntityRef {
                        kind: EntityKind::Way,
                        id,
                    }],
                    Severity::DataQuality,
                    "duplicated way",
                );
                j += 1;
            }
            ids.push(id);
            entries.push(entry);
            i = j;
        }

        self.used = vec![false; entries.len()];
        self.ids = ids;
        self.entries = entries;
        self.sorted = true;
    }

    pub fn mark_used(&mut self, index: u32) {
        self.used[index as usize] = true;
    }

    pub fn is_used(&self, index: u32) -> bool {
        self.used[index as usize]
    }

    pub fn index_of(&self, id: u64) -> u32 {
        debug_assert!(self.sorted, "WaysX::index_of called before sort()");
        binary_search_id(&self.ids, id).unwrap_or(NO_WAY)
    }

    pub fn get(&self, index: u32) -> &WayEntry {
        &self.entries[index as usize]
    }

    pub fn get_mut(&mut self, index: u32) -> &mut WayEntry {
        &mut self.entries[index as usize]
    }

    pub fn original_id(&self, index: u32) -> u64 {
        self.ids.get(index as usize).copied().unwrap_or(index as u64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &WayEntry)> {
        self.entries.iter().enumerate().map(|(i, e)| (i as u32, e))
    }

    pub fn original_ids(&self) -> &[u64] {
        &self.ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::DiagnosticLog;
    use tempfile::tempdir;

    fn way() -> Way {
        Way {
            name: 0,
            highway_type: 1,
            allow: crate::model::transports::ALL_VEHICLES,
            props: 0,
            speed: 50,
            weight: 0,
            height: 0,
            width: 0,
            length: 0,
            incline: 0,
        }
    }

    #[test]
    fn drops_duplicate_way_ids() {
        let dir = tempdir().unwrap();
        let mut log = DiagnosticLog::create(&dir.path().join("log.txt")).unwrap();

        let mut ways = WaysX::new();
        ways.append(5, way(), vec![1, 2], "Main St".into()).unwrap();
        ways.append(5, way(), vec![1, 2], "Main St".into()).unwrap();
        ways.append(3, way(), vec![3, 4], "Oak Ave".into()).unwrap();
        ways.sort(&mut log);

        assert_eq!(ways.len(), 2);
        assert_eq!(ways.index_of(3), 0);
        assert_eq!(ways.index_of(5), 1);
        assert_eq!(log.counts().0, 1);
    }
}
