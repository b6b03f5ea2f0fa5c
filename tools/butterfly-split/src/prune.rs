//! Topology pruning (`spec.md` §4.G), grounded on `segmentsx.c`'s
//! `RemovePrunedSegments`/`delete_pruned` for the "mark then re-sort" idiom.
//! Straight-line elimination, isolated-component removal, and short-segment
//! contraction aren't present in the retrieved C sources (Routino does them
//! inline in `planetsplitter.c`'s driver), so each pass is built from the
//! `spec.md` description directly and reuses the same mark/sweep shape as
//! `RemovePrunedSegments`.

use std::collections::VecDeque;

use crate::entities::{NodesX, SegmentsX, TurnRelsX, WaysX};
use crate::model::{node_flags, segment_flags, Distance, SegmentX, TurnRelX, NO_NODE, NO_SEGMENT};
use crate::segment::{COORD_SCALE, EARTH_RADIUS_M};

#[derive(Clone, Copy, Debug, Default)]
pub struct PruneStats {
    pub removed_nodes: usize,
    pub removed_segments: usize,
}

fn locked(nodes: &NodesX, n: u32) -> bool {
    nodes.get(n).has_flag(node_flags::TURNRSTRCT) || nodes.get(n).has_flag(node_flags::TURNRSTRCT2)
}

/// Perpendicular distance, in metres, from `point` to the line through `p`
/// and `q`, using a local equirectangular projection centred on `p` (valid
/// at the scale of a single straightened node, `spec.md` §4.G.1).
fn perpendicular_offset_m(p: (i32, i32), q: (i32, i32), point: (i32, i32)) -> f64 {
    let lat0 = (p.0 as f64 / COORD_SCALE).to_radians();
    let to_xy = |pt: (i32, i32)| -> (f64, f64) {
        let dlat = (pt.0 - p.0) as f64 / COORD_SCALE;
        let dlon = (pt.1 - p.1) as f64 / COORD_SCALE;
        (
            dlon.to_radians() * lat0.cos() * EARTH_RADIUS_M,
            dlat.to_radians() * EARTH_RADIUS_M,
        )
    };
    let (qx, qy) = to_xy(q);
    let (px, py) = to_xy(point);
    let line_len = (qx * qx + qy * qy).sqrt();
    if line_len < f64::EPSILON {
        return (px * px + py * py).sqrt();
    }
    (qx * py - qy * px).abs() / line_len
}

/// Remove nodes with exactly two unlocked incident segments belonging to
/// the same way class, replacing the pair with one direct segment when the
/// node sits within `tolerance_m` of the line between its neighbours
/// (`spec.md` §4.G.1).
pub fn prune_straight(
    nodes: &NodesX,
    ways: &WaysX,
    segments: &mut SegmentsX,
    tolerance_m: u32,
    num_nodes: usize,
) -> PruneStats {
    let mut stats = PruneStats::default();
    let mut merges = Vec::new();

    for n in 0..num_nodes as u32 {
        if locked(nodes, n) {
            continue;
        }
        let incident: Vec<u32> = segments.incident(n).collect();
        if incident.len() != 2 {
            continue;
        }
        let (s1, s2) = (segments.get(incident[0]), segments.get(incident[1]));
        if s1.is_super() || s2.is_super() {
            continue;
        }
        let way1 = &ways.get(s1.way).way;
        let way2 = &ways.get(s2.way).way;
        if !way1.same_class(way2) {
            continue;
        }

        let p = s1.other_node(n);
        let q = s2.other_node(n);
        if p == q {
            continue;
        }

        let np = nodes.get(p);
        let nq = nodes.get(q);
        let nn = nodes.get(n);
        let offset = perpendicular_offset_m((np.lat, np.lon), (nq.lat, nq.lon), (nn.lat, nn.lon));
        if offset > tolerance_m as f64 {
            continue;
        }

        merges.push((n, incident[0], incident[1], p, q));
    }

    for (n, seg1_idx, seg2_idx, p, q) in merges {
        let seg1 = *segments.get(seg1_idx);
        let seg2 = *segments.get(seg2_idx);
        if seg1.node1 == NO_NODE || seg2.node1 == NO_NODE {
            continue; // one side already consumed by an earlier merge this pass
        }

        let p_to_q = !seg1.is_oneway_from(p) && !seg2.is_oneway_from(n);
        let q_to_p = !seg2.is_oneway_from(q) && !seg1.is_oneway_from(n);
        if !p_to_q && !q_to_p {
            continue; // no traversable direction survives; leave the node alone
        }

        let metres = seg1.distance.metres() + seg2.distance.metres();
        let mut distance = Distance(0).with_metres(metres.min(segment_flags::DISTANCE_MASK));
        if p_to_q && !q_to_p {
            distance = distance.set_flag(segment_flags::ONEWAY_1TO2, true);
        } else if q_to_p && !p_to_q {
            distance = distance.set_flag(segment_flags::ONEWAY_2TO1, true);
        }

        let up_pq = seg1.inclines_up_from(p) || seg2.inclines_up_from(n);
        let up_qp = seg2.inclines_up_from(q) || seg1.inclines_up_from(n);
        let mut incline = 0u8;
        if up_pq {
            incline |= segment_flags::INCLINEUP_1TO2;
        }
        if up_qp {
            incline |= segment_flags::INCLINEUP_2TO1;
        }

        segments.get_mut(seg1_idx).node1 = NO_NODE;
        segments.get_mut(seg2_idx).node1 = NO_NODE;
        stats.removed_segments += 2;
        stats.removed_nodes += 1;

        let merged = SegmentX {
            node1: p,
            node2: q,
            next2: NO_SEGMENT,
            way: seg1.way,
            distance,
            kind: segment_flags::SEGMENT_NORMAL,
            incline,
        };
        segments.append(merged).expect("segment capacity");
    }

    stats
}

/// Flood-fill connected components ignoring one-way direction; drop every
/// segment in a component whose total length is under `threshold_m`
/// (`spec.md` §4.G.2).
pub fn prune_isolated(segments: &mut SegmentsX, threshold_m: u32, num_nodes: usize) -> PruneStats {
    let mut stats = PruneStats::default();
    let live: Vec<(u32, SegmentX)> = segments
        .iter()
        .filter(|(_, s)| s.node1 != NO_NODE)
        .map(|(i, s)| (i, *s))
        .collect();

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); num_nodes];
    for (pos, (_, s)) in live.iter().enumerate() {
        adjacency[s.node1 as usize].push(pos);
        adjacency[s.node2 as usize].push(pos);
    }

    let mut visited = vec![false; live.len()];
    for start in 0..live.len() {
        if visited[start] {
            continue;
        }
        let mut queue = VecDeque::new();
        let mut component = Vec::new();
        queue.push_back(start);
        visited[start] = true;

        while let Some(edge) = queue.pop_front() {
            component.push(edge);
            let (_, s) = live[edge];
            for &endpoint in &[s.node1, s.node2] {
                for &next_edge in &adjacency[endpoint as usize] {
                    if !visited[next_edge] {
                        visited[next_edge] = true;
                        queue.push_back(next_edge);
                    }
                }
            }
        }

        let total: u64 = component.iter().map(|&e| live[e].1.distance.metres() as u64).sum();
        if total < threshold_m as u64 {
            for &e in &component {
                let (idx, _) = live[e];
                segments.get_mut(idx).node1 = NO_NODE;
                stats.removed_segments += 1;
            }
        }
    }

    stats
}

/// Contract every segment shorter than `threshold_m`, merging its endpoints
/// into the lower-indexed survivor (`spec.md` §4.G.3). Returns a `pdata`
/// remap table (`pdata[old] = new`, identity for untouched nodes) so
/// callers can rewrite turn relations through it.
pub fn prune_short(segments: &mut SegmentsX, threshold_m: u32, num_nodes: usize) -> (PruneStats, Vec<u32>) {
    let mut stats = PruneStats::default();
    let mut pdata: Vec<u32> = (0..num_nodes as u32).collect();

    fn resolve(pdata: &[u32], mut n: u32) -> u32 {
        while pdata[n as usize] != n {
            n = pdata[n as usize];
        }
        n
    }

    let short: Vec<u32> = segments
        .iter()
        .filter(|(_, s)| s.node1 != NO_NODE && s.distance.metres() < threshold_m && !s.is_super())
        .map(|(i, _)| i)
        .collect();

    for idx in short {
        let s = *segments.get(idx);
        if s.node1 == NO_NODE {
            continue;
        }
        let a = resolve(&pdata, s.node1);
        let b = resolve(&pdata, s.node2);
        if a == b {
            segments.get_mut(idx).node1 = NO_NODE;
            stats.removed_segments += 1;
            continue;
        }
        let (survivor, removed) = if a < b { (a, b) } else { (b, a) };
        pdata[removed as usize] = survivor;
        segments.get_mut(idx).node1 = NO_NODE;
        stats.removed_segments += 1;
        stats.removed_nodes += 1;
    }

    for n in 0..num_nodes as u32 {
        pdata[n as usize] = resolve(&pdata, n);
    }

    (stats, pdata)
}

/// Rewrite every surviving segment's endpoints through `pdata`, dropping
/// self-loops produced by contraction and re-normalizing `node1 <= node2`.
pub fn apply_node_remap(segments: &mut SegmentsX, pdata: &[u32]) {
    let remapped: Vec<SegmentX> = segments
        .iter()
        .filter(|(_, s)| s.node1 != NO_NODE)
        .map(|(_, s)| {
            let mut s = *s;
            s.node1 = pdata[s.node1 as usize];
            s.node2 = pdata[s.node2 as usize];
            s
        })
        .filter(|s| s.node1 != s.node2)
        .collect();

    segments.replace_all(Vec::new());
    for mut s in remapped {
        if s.node1 > s.node2 {
            s.swap_nodes();
        }
        segments.append(s).expect("segment capacity");
    }
}

/// Drop every segment marked pruned (`node1 == NO_NODE`) and rebuild the
/// adjacency index over the survivors (`RemovePrunedSegments`).
pub fn remove_pruned_segments(segments: &mut SegmentsX, num_nodes: usize) {
    let kept: Vec<SegmentX> = segments.iter().filter(|(_, s)| s.node1 != NO_NODE).map(|(_, s)| *s).collect();
    segments.replace_all(kept);
    segments.index_segments(num_nodes);
}

/// Rewrite `via`/`from`/`to` through `pdata`, dropping any relation that now
/// references a removed node (`RemovePrunedTurnRelations`).
pub fn remap_turn_relations(turns: Vec<TurnRelX>, pdata: &[u32]) -> Vec<TurnRelX> {
    turns
        .into_iter()
        .filter_map(|mut t| {
            t.from = *pdata.get(t.from as usize)?;
            t.via = *pdata.get(t.via as usize)?;
            t.to = *pdata.get(t.to as usize)?;
            Some(t)
        })
        .collect()
}

pub fn turn_rels_to_vec(turns: &TurnRelsX) -> Vec<TurnRelX> {
    turns.iter().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{NodesX, SegmentsX, WaysX};
    use crate::log::DiagnosticLog;
    use crate::model::{transports, NodeX, Way};
    use tempfile::tempdir;

    fn way() -> Way {
        Way {
            name: 0,
            highway_type: 0,
            allow: transports::ALL_VEHICLES,
            props: 0,
            speed: 50,
            weight: 0,
            height: 0,
            width: 0,
            length: 0,
            incline: 0,
        }
    }

    fn node(id: u64, lat: i32, lon: i32) -> NodeX {
        NodeX { id, allow: transports::ALL_VEHICLES, flags: 0, lat, lon }
    }

    #[test]
    fn straight_node_is_replaced_by_one_segment() {
        let dir = tempdir().unwrap();
        let mut log = DiagnosticLog::create(&dir.path().join("log.txt")).unwrap();

        let mut nodes = NodesX::new();
        nodes.append(node(1, 0, 0)).unwrap();
        nodes.append(node(2, 0, 1_000_000)).unwrap(); // straight node, on the line
        nodes.append(node(3, 0, 2_000_000)).unwrap();
        nodes.sort();

        let mut ways = WaysX::new();
        ways.append(1, way(), vec![], "Rd".into()).unwrap();
        ways.sort(&mut log);

        let mut segments = SegmentsX::new();
        segments.append(SegmentX { node1: 0, node2: 1, next2: NO_SEGMENT, way: 0, distance: Distance(0).with_metres(100), kind: segment_flags::SEGMENT_NORMAL, incline: 0 }).unwrap();
        segments.append(SegmentX { node1: 1, node2: 2, next2: NO_SEGMENT, way: 0, distance: Distance(0).with_metres(100), kind: segment_flags::SEGMENT_NORMAL, incline: 0 }).unwrap();
        segments.index_segments(3);

        let stats = prune_straight(&nodes, &ways, &mut segments, 3, 3);
        assert_eq!(stats.removed_nodes, 1);

        remove_pruned_segments(&mut segments, 3);
        assert_eq!(segments.len(), 1);
        let s = segments.get(0);
        assert_eq!((s.node1, s.node2), (0, 2));
        assert_eq!(s.distance.metres(), 200);
    }

    #[test]
    fn isolated_short_component_is_dropped() {
        let mut segments = SegmentsX::new();
        segments.append(SegmentX { node1: 0, node2: 1, next2: NO_SEGMENT, way: 0, distance: Distance(0).with_metres(10), kind: segment_flags::SEGMENT_NORMAL, incline: 0 }).unwrap();
        segments.index_segments(2);

        let stats = prune_isolated(&mut segments, 500, 2);
        assert_eq!(stats.removed_segments, 1);
    }

    #[test]
    fn short_segment_contracts_to_lower_index() {
        let mut segments = SegmentsX::new();
        segments.append(SegmentX { node1: 0, node2: 1, next2: NO_SEGMENT, way: 0, distance: Distance(0).with_metres(2), kind: segment_flags::SEGMENT_NORMAL, incline: 0 }).unwrap();
        segments.append(SegmentX { node1: 1, node2: 2, next2: NO_SEGMENT, way: 0, distance: Distance(0).with_metres(100), kind: segment_flags::SEGMENT_NORMAL, incline: 0 }).unwrap();
        segments.index_segments(3);

        let (stats, pdata) = prune_short(&mut segments, 5, 3);
        assert_eq!(stats.removed_nodes, 1);
        assert_eq!(pdata[1], 0);

        apply_node_remap(&mut segments, &pdata);
        assert_eq!(segments.len(), 1);
        assert_eq!((segments.get(0).node1, segments.get(0).node2), (0, 2));
    }
}
