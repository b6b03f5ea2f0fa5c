//! Parser-to-core callback surface (`spec.md` §6).
//!
//! Parsing OSM XML/PBF/O5M, decompression, and interpreting the tagging
//! rules language are all out of scope here — an external parser component
//! calls these three methods once per entity it decodes, handing over
//! whatever it has already resolved (a transport bitset, a built `Way`, a
//! relation's member id lists). `EntityBuilder` owns the four extended
//! stores those calls feed and does only the conversion the core itself is
//! responsible for: degrees to the internal fixed-point coordinate.

use crate::entities::{NodesX, RouteRelsX, TurnRelsX, WaysX};
use crate::error::Result;
use crate::model::{NodeX, RouteRelX, TurnRelX, TurnRestriction, Way};
use crate::segment::COORD_SCALE;

/// Members of a relation, by kind, each as a list of *original* OSM ids.
#[derive(Clone, Debug, Default)]
pub struct RelationMembers {
    pub nodes: Vec<u64>,
    pub ways: Vec<u64>,
    pub relations: Vec<u64>,
}

/// What a relation is for, as far as this core cares — every other OSM
/// relation type is filtered out by the parser before it ever calls
/// `append_relation`.
pub enum RelationKind {
    Route { routes: u16 },
    Turn { from: u32, via: u32, to: u32, restriction: TurnRestriction, except: u16 },
}

/// Converts degrees (as delivered by the parser) to the `1e7`-scaled fixed
/// point representation every other module works in (`segment::COORD_SCALE`).
pub fn degrees_to_fixed(lat: f64, lon: f64) -> (i32, i32) {
    ((lat * COORD_SCALE).round() as i32, (lon * COORD_SCALE).round() as i32)
}

/// Staging point for everything a parser produces, before sorting (`spec.md`
/// §4.D). One `EntityBuilder` per pipeline run.
#[derive(Default)]
pub struct EntityBuilder {
    pub nodes: NodesX,
    pub ways: WaysX,
    pub route_relations: RouteRelsX,
    pub turn_relations: TurnRelsX,
}

impl EntityBuilder {
    pub fn new() -> Self {
        EntityBuilder::default()
    }

    pub fn append_node(&mut self, id: u64, lat: f64, lon: f64, allow: u16) -> Result<()> {
        let (lat, lon) = degrees_to_fixed(lat, lon);
        self.nodes.append(NodeX { id, allow, flags: 0, lat, lon })
    }

    pub fn append_way(&mut self, id: u64, way: Way, node_refs: Vec<u64>, name: String) -> Result<()> {
        self.ways.append(id, way, node_refs, name)
    }

    pub fn append_relation(&mut self, id: u64, kind: RelationKind, members: RelationMembers) -> Result<()> {
        match kind {
            RelationKind::Route { routes } => self.route_relations.append(RouteRelX {
                id,
                routes,
                nodes: members.nodes,
                ways: members.ways,
                relations: members.relations,
            }),
            RelationKind::Turn { from, via, to, restriction, except } => {
                self.turn_relations.append(TurnRelX { id, from, via, to, restriction, except })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::transports;

    #[test]
    fn append_node_converts_degrees_to_fixed_point() {
        let mut builder = EntityBuilder::new();
        builder.append_node(1, 51.5074, -0.1278, transports::ALL_VEHICLES).unwrap();
        builder.nodes.sort();
        let n = builder.nodes.get(builder.nodes.index_of(1));
        assert_eq!(n.lat, 515_074_000);
        assert_eq!(n.lon, -1_278_000);
    }

    #[test]
    fn append_relation_routes_to_the_matching_store() {
        let mut builder = EntityBuilder::new();
        builder
            .append_relation(
                10,
                RelationKind::Route { routes: transports::FOOT },
                RelationMembers { ways: vec![1, 2], ..Default::default() },
            )
            .unwrap();
        builder
            .append_relation(
                20,
                RelationKind::Turn { from: 1, via: 2, to: 3, restriction: TurnRestriction::NoLeftTurn, except: 0 },
                RelationMembers::default(),
            )
            .unwrap();

        assert_eq!(builder.route_relations.len(), 1);
        assert_eq!(builder.turn_relations.len(), 1);
    }
}
