//! Relation processing (`spec.md` §4.F), grounded on `relationsx.c`'s
//! `ProcessRouteRelations`/`ProcessTurnRelations`.

use crate::entities::{NodesX, RouteRelsX, SegmentsX, TurnRelsX, WaysX};
use crate::log::{DiagnosticLog, EntityKind, EntityRef, Severity};
use crate::model::{node_flags, properties, transports, TurnRelX, TurnRestriction, NO_NODE, NO_WAY};

fn relation_ref(id: u64) -> EntityRef {
    EntityRef {
        kind: EntityKind::Relation,
        id,
    }
}

/// Propagate route-relation transport bits across the relation→way
/// hierarchy to a fixpoint, capped at 8 passes (`ProcessRouteRelations`,
/// `spec.md` invariant 4 / testable property 5).
pub fn process_route_relations(relations: &RouteRelsX, ways: &mut WaysX, log: &mut DiagnosticLog) {
    if ways.len() == 0 || relations.is_empty() {
        return;
    }

    for rel in relations.iter() {
        for &child in &rel.relations {
            if child == rel.id {
                log.record(&[relation_ref(rel.id)], Severity::DataQuality, "relation contains itself");
            }
        }
    }

    let mut last_unmatched: Vec<(u64, u16)> = Vec::new();
    let mut iteration = 1u32;

    loop {
        let mut unmatched: Vec<(u64, u16)> = Vec::new();

        for rel in relations.iter() {
            let routes = if iteration == 1 {
                rel.routes
            } else {
                match last_unmatched.iter().find(|(id, _)| *id == rel.id) {
                    Some(&(_, scratch_routes)) => {
                        if (rel.routes | scratch_routes) == rel.routes {
                            0
                        } else {
                            scratch_routes
                        }
                    }
                    None => continue,
                }
            };

            if routes != 0 {
                for &way_id in &rel.ways {
                    let way_idx = ways.index_of(way_id);
                    if way_idx == NO_WAY {
                        log.record(
                            &[relation_ref(rel.id), EntityRef { kind: EntityKind::Way, id: way_id }],
                            Severity::DataQuality,
                            "route relation references a way not in the database",
                        );
                        continue;
                    }

                    if routes & transports::FOOT != 0 {
                        let entry = ways.get_mut(way_idx);
                        if entry.way.allow & transports::FOOT == 0 {
                            log.record(
                                &[relation_ref(rel.id), EntityRef { kind: EntityKind::Way, id: way_id }],
                                Severity::Warning,
                                "route relation for foot overrides a way that disallows foot transport",
                            );
                            entry.way.allow |= transports::FOOT;
                        }
                        entry.way.props |= properties::FOOT_ROUTE;
                    }

                    if routes & transports::BICYCLE != 0 {
                        let entry = ways.get_mut(way_idx);
                        if entry.way.allow & transports::BICYCLE == 0 {
                            log.record(
                                &[relation_ref(rel.id), EntityRef { kind: EntityKind::Way, id: way_id }],
                                Severity::Warning,
                                "route relation for bicycle overrides a way that disallows bicycle transport",
                            );
                            entry.way.allow |= transports::BICYCLE;
                        }
                        entry.way.props |= properties::BICYCLE_ROUTE;
                    }
                }

                for &child in &rel.relations {
                    if child != rel.id {
                        unmatched.push((child, routes));
                    }
                }
            }
        }

        last_unmatched = unmatched;
        iteration += 1;
        if last_unmatched.is_empty() || iteration > 8 {
            break;
        }
    }
}

struct ViaScan {
    node_from: u32,
    node_to: u32,
    oneway_from: bool,
    oneway_to: bool,
    vehicles_from: bool,
    vehicles_to: bool,
    /// Other candidate exits from `via`, excluding the `from`/`to` ways,
    /// that a prescriptive restriction would need to forbid.
    other_exits: Vec<u32>,
}

fn scan_via(via: u32, from_way: u32, to_way: u32, segments: &SegmentsX, ways: &WaysX) -> ViaScan {
    let mut scan = ViaScan {
        node_from: NO_NODE,
        node_to: NO_NODE,
        oneway_from: false,
        oneway_to: false,
        vehicles_from: true,
        vehicles_to: true,
        other_exits: Vec::new(),
    };

    for seg_idx in segments.incident(via) {
        let seg = segments.get(seg_idx);
        let allow = ways.get(seg.way).way.allow;

        if seg.way == from_way {
            scan.node_from = seg.other_node(via);
            if seg.is_oneway_from(via) {
                scan.oneway_from = true;
            }
            if allow & transports::ALL_VEHICLES == 0 {
                scan.vehicles_from = false;
            }
        }

        if seg.way == to_way {
            scan.node_to = seg.other_node(via);
            if seg.is_oneway_to(via) {
                scan.oneway_to = true;
            }
            if allow & transports::ALL_VEHICLES == 0 {
                scan.vehicles_to = false;
            }
        } else if seg.way != from_way
            && !seg.is_oneway_to(via)
            && allow & transports::ALL_VEHICLES != 0
        {
            scan.other_exits.push(seg.other_node(via));
        }
    }

    scan
}

/// Resolve every `TurnRelX` against the live node/segment/way graph
/// (`ProcessTurnRelations`). Returns the resolved relations with `from`/
/// `to` rewritten to the *other node* of the matched segment (still node
/// indexes, not segment indexes — `writer::` maps those to segments once
/// the final node order is known). Also marks `via` and its neighbours
/// with `TURNRSTRCT`/`TURNRSTRCT2` so pruning and super-node selection
/// leave them alone.
pub fn process_turn_relations(
    turns: &TurnRelsX,
    nodes: &mut NodesX,
    segments: &SegmentsX,
    ways: &WaysX,
    log: &mut DiagnosticLog,
) -> Vec<TurnRelX> {
    let mut resolved = Vec::new();

    for rel in turns.iter() {
        let via = nodes.index_of(rel.via as u64);
        if via == NO_NODE {
            log.record(
                &[relation_ref(rel.id)],
                Severity::DataQuality,
                "turn relation's via node is not in the database",
            );
            continue;
        }
        let from_way = ways.index_of(way_id_of(rel.from));
        let to_way = ways.index_of(way_id_of(rel.to));
        if from_way == NO_WAY || to_way == NO_WAY {
            log.record(
                &[relation_ref(rel.id)],
                Severity::DataQuality,
                "turn relation's from/to way is not in the database",
            );
            continue;
        }

        let scan = scan_via(via, from_way, to_way, segments, ways);

        let resolved_rels: Vec<TurnRelX> = if rel.restriction.is_prohibitive() {
            resolve_prohibitive(rel, via, &scan, log).into_iter().collect()
        } else {
            resolve_prescriptive(rel, via, &scan, log)
        };

        if !resolved_rels.is_empty() {
            mark_super_node_flags(nodes, segments, via);
            resolved.extend(resolved_rels);
        }
    }

    resolved
}

/// `TurnRelX.from`/`to`/`via` hold OSM ids as plain `u32` before
/// resolution (`spec.md` §3); ids are assumed to fit, matching every other
/// OSM-id field in this crate.
fn way_id_of(field: u32) -> u64 {
    field as u64
}

fn resolve_prohibitive(rel: &TurnRelX, via: u32, scan: &ViaScan, log: &mut DiagnosticLog) -> Option<TurnRelX> {
    if scan.node_from == NO_NODE {
        log.record(&[relation_ref(rel.id)], Severity::DataQuality, "via node is not part of the from way");
    }
    if scan.node_to == NO_NODE {
        log.record(&[relation_ref(rel.id)], Severity::DataQuality, "via node is not part of the to way");
    }
    if scan.oneway_from {
        log.record(&[relation_ref(rel.id)], Severity::DataQuality, "from way is oneway away from via");
    }
    if scan.oneway_to {
        log.record(&[relation_ref(rel.id)], Severity::DataQuality, "to way is oneway towards via");
    }
    if !scan.vehicles_from {
        log.record(&[relation_ref(rel.id)], Severity::DataQuality, "from way does not allow vehicles");
    }
    if !scan.vehicles_to {
        log.record(&[relation_ref(rel.id)], Severity::DataQuality, "to way does not allow vehicles");
    }

    if scan.oneway_from
        || scan.oneway_to
        || !scan.vehicles_from
        || !scan.vehicles_to
        || scan.node_from == NO_NODE
        || scan.node_to == NO_NODE
    {
        return None;
    }

    Some(TurnRelX {
        id: rel.id,
        from: scan.node_from,
        via,
        to: scan.node_to,
        restriction: rel.restriction,
        except: rel.except,
    })
}

/// One record per forbidden alternative exit (`spec.md` §4.F: "emit one
/// restriction record per such 'forbidden alternative' `other_node`"),
/// each with its restriction transformed to [`TurnRestriction::Prohibited`].
fn resolve_prescriptive(rel: &TurnRelX, via: u32, scan: &ViaScan, log: &mut DiagnosticLog) -> Vec<TurnRelX> {
    if scan.node_from == NO_NODE {
        log.record(&[relation_ref(rel.id)], Severity::DataQuality, "via node is not part of the from way");
    }
    if scan.node_to == NO_NODE {
        log.record(&[relation_ref(rel.id)], Severity::DataQuality, "via node is not part of the to way");
    }
    if scan.other_exits.is_empty() {
        log.record(
            &[relation_ref(rel.id)],
            Severity::DataQuality,
            "the only allowed exit from via is already the to way",
        );
    }
    if scan.oneway_from {
        log.record(&[relation_ref(rel.id)], Severity::DataQuality, "from way is oneway away from via");
    }
    if !scan.vehicles_from {
        log.record(&[relation_ref(rel.id)], Severity::DataQuality, "from way does not allow vehicles");
    }

    if scan.oneway_from || !scan.vehicles_from || scan.node_from == NO_NODE || scan.node_to == NO_NODE || scan.other_exits.is_empty() {
        return Vec::new();
    }

    scan.other_exits
        .iter()
        .map(|&other| TurnRelX {
            id: rel.id,
            from: scan.node_from,
            via,
            to: other,
            restriction: TurnRestriction::Prohibited,
            except: rel.except,
        })
        .collect()
}

fn mark_super_node_flags(nodes: &mut NodesX, segments: &SegmentsX, via: u32) {
    nodes.get_mut(via).flags |= node_flags::TURNRSTRCT;

    for seg_idx in segments.incident(via) {
        let other = segments.get(seg_idx).other_node(via);
        nodes.get_mut(other).flags |= node_flags::TURNRSTRCT2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{NodesX, RouteRelsX, SegmentsX, TurnRelsX, WaysX};
    use crate::model::{properties, Distance, NodeX, RouteRelX, SegmentX, TurnRelX, TurnRestriction, Way, NO_SEGMENT};
    use tempfile::tempdir;

    fn way(allow: u16) -> Way {
        Way {
            name: 0,
            highway_type: 0,
            allow,
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
    fn route_relation_overrides_way_allow_and_sets_props() {
        let dir = tempdir().unwrap();
        let mut log = DiagnosticLog::create(&dir.path().join("log.txt")).unwrap();

        let mut ways = WaysX::new();
        ways.append(1, way(transports::BICYCLE), vec![1, 2], "W".into()).unwrap();
        ways.sort(&mut log);

        let mut routes = RouteRelsX::new();
        routes
            .append(RouteRelX {
                id: 100,
                routes: transports::FOOT,
                nodes: vec![],
                ways: vec![1],
                relations: vec![],
            })
            .unwrap();

        process_route_relations(&routes, &mut ways, &mut log);

        let w = &ways.get(0).way;
        assert!(w.allow & transports::FOOT != 0);
        assert!(w.props & properties::FOOT_ROUTE != 0);
        assert_eq!(log.counts().1, 1); // one override warning
    }

    #[test]
    fn route_relation_propagates_through_child_relation() {
        let dir = tempdir().unwrap();
        let mut log = DiagnosticLog::create(&dir.path().join("log.txt")).unwrap();

        let mut ways = WaysX::new();
        ways.append(1, way(transports::ALL_VEHICLES), vec![1, 2], "W".into()).unwrap();
        ways.sort(&mut log);

        let mut routes = RouteRelsX::new();
        routes
            .append(RouteRelX {
                id: 1,
                routes: transports::BICYCLE,
                nodes: vec![],
                ways: vec![],
                relations: vec![2],
            })
            .unwrap();
        routes
            .append(RouteRelX {
                id: 2,
                routes: 0,
                nodes: vec![],
                ways: vec![1],
                relations: vec![],
            })
            .unwrap();

        process_route_relations(&routes, &mut ways, &mut log);

        assert!(ways.get(0).way.props & properties::BICYCLE_ROUTE != 0);
    }

    fn node(id: u64, lat: i32, lon: i32) -> NodeX {
        NodeX { id, allow: transports::ALL_VEHICLES, flags: 0, lat, lon }
    }

    #[test]
    fn no_left_turn_resolves_to_the_two_end_nodes() {
        let dir = tempdir().unwrap();
        let mut log = DiagnosticLog::create(&dir.path().join("log.txt")).unwrap();

        let mut nodes = NodesX::new();
        nodes.append(node(1, 0, 0)).unwrap(); // A
        nodes.append(node(2, 0, 1)).unwrap(); // via
        nodes.append(node(3, 0, 2)).unwrap(); // C
        nodes.append(node(4, 0, 3)).unwrap(); // D
        nodes.sort();
        let (a, via, c, d) = (nodes.index_of(1), nodes.index_of(2), nodes.index_of(3), nodes.index_of(4));

        let mut ways = WaysX::new();
        ways.append(10, way(transports::ALL_VEHICLES), vec![], "F".into()).unwrap(); // from: A-via
        ways.append(20, way(transports::ALL_VEHICLES), vec![], "T".into()).unwrap(); // to: via-C
        ways.append(30, way(transports::ALL_VEHICLES), vec![], "X".into()).unwrap(); // unrelated: via-D
        ways.sort(&mut log);
        let (from_way, to_way, x_way) = (ways.index_of(10), ways.index_of(20), ways.index_of(30));

        let mut segments = SegmentsX::new();
        segments
            .append(SegmentX { node1: a, node2: via, next2: NO_SEGMENT, way: from_way, distance: Distance(0), kind: 0, incline: 0 })
            .unwrap();
        segments
            .append(SegmentX { node1: via, node2: c, next2: NO_SEGMENT, way: to_way, distance: Distance(0), kind: 0, incline: 0 })
            .unwrap();
        segments
            .append(SegmentX { node1: via, node2: d, next2: NO_SEGMENT, way: x_way, distance: Distance(0), kind: 0, incline: 0 })
            .unwrap();
        segments.index_segments(nodes.len());

        let mut turns = TurnRelsX::new();
        turns
            .append(TurnRelX {
                id: 500,
                from: 10,
                via: 2,
                to: 20,
                restriction: TurnRestriction::NoLeftTurn,
                except: 0,
            })
            .unwrap();

        let resolved = process_turn_relations(&turns, &mut nodes, &segments, &ways, &mut log);

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].from, a);
        assert_eq!(resolved[0].to, c);
        assert!(nodes.get(via).has_flag(node_flags::TURNRSTRCT));
        assert!(nodes.get(a).has_flag(node_flags::TURNRSTRCT2));
        assert!(nodes.get(d).has_flag(node_flags::TURNRSTRCT2));
    }

    /// only_straight_on(F->T, via), with two other exits D and E at via:
    /// one prohibited record per forbidden alternative, both transformed
    /// to `Prohibited`.
    #[test]
    fn only_straight_on_forbids_every_other_exit() {
        let dir = tempdir().unwrap();
        let mut log = DiagnosticLog::create(&dir.path().join("log.txt")).unwrap();

        let mut nodes = NodesX::new();
        nodes.append(node(1, 0, 0)).unwrap(); // A (from)
        nodes.append(node(2, 0, 1)).unwrap(); // via
        nodes.append(node(3, 0, 2)).unwrap(); // C (to, straight on)
        nodes.append(node(4, 1, 1)).unwrap(); // D
        nodes.append(node(5, -1, 1)).unwrap(); // E
        nodes.sort();
        let (a, via, c, d, e) = (
            nodes.index_of(1),
            nodes.index_of(2),
            nodes.index_of(3),
            nodes.index_of(4),
            nodes.index_of(5),
        );

        let mut ways = WaysX::new();
        ways.append(10, way(transports::ALL_VEHICLES), vec![], "F".into()).unwrap();
        ways.append(20, way(transports::ALL_VEHICLES), vec![], "T".into()).unwrap();
        ways.append(30, way(transports::ALL_VEHICLES), vec![], "D".into()).unwrap();
        ways.append(40, way(transports::ALL_VEHICLES), vec![], "E".into()).unwrap();
        ways.sort(&mut log);
        let (from_way, to_way, d_way, e_way) =
            (ways.index_of(10), ways.index_of(20), ways.index_of(30), ways.index_of(40));

        let mut segments = SegmentsX::new();
        segments
            .append(SegmentX { node1: a, node2: via, next2: NO_SEGMENT, way: from_way, distance: Distance(0), kind: 0, incline: 0 })
            .unwrap();
        segments
            .append(SegmentX { node1: via, node2: c, next2: NO_SEGMENT, way: to_way, distance: Distance(0), kind: 0, incline: 0 })
            .unwrap();
        segments
            .append(SegmentX { node1: via, node2: d, next2: NO_SEGMENT, way: d_way, distance: Distance(0), kind: 0, incline: 0 })
            .unwrap();
        segments
            .append(SegmentX { node1: via, node2: e, next2: NO_SEGMENT, way: e_way, distance: Distance(0), kind: 0, incline: 0 })
            .unwrap();
        segments.index_segments(nodes.len());

        let mut turns = TurnRelsX::new();
        turns
            .append(TurnRelX {
                id: 600,
                from: 10,
                via: 2,
                to: 20,
                restriction: TurnRestriction::OnlyStraightOn,
                except: 0,
            })
            .unwrap();

        let resolved = process_turn_relations(&turns, &mut nodes, &segments, &ways, &mut log);

        assert_eq!(resolved.len(), 2);
        for r in &resolved {
            assert_eq!(r.from, a);
            assert_eq!(r.restriction, TurnRestriction::Prohibited);
        }
        let forbidden: Vec<u32> = resolved.iter().map(|r| r.to).collect();
        assert!(forbidden.contains(&d));
        assert!(forbidden.contains(&e));
    }
}
