//! Super-node selection and the two-level graph (`spec.md` §4.H), grounded
//! on `superx.c`'s `ChooseSuperNodes`/`CreateSuperSegments`/
//! `MergeSuperSegments`/`FindSuperRoutes`.

use crate::entities::{NodesX, SegmentsX, WaysX};
use crate::model::{node_flags, segment_flags, transports, Distance, SegmentX, Way, NO_SEGMENT};
use crate::search::{Queue, Results};

/// Mark every node meeting one of the four super-node criteria
/// (`ChooseSuperNodes`). Returns the number marked.
pub fn choose_super_nodes(nodes: &mut NodesX, segments: &SegmentsX, ways: &WaysX) -> usize {
    let mut count = 0;
    for n in 0..nodes.len() as u32 {
        if is_super_node(nodes, segments, ways, n) {
            nodes.get_mut(n).flags |= node_flags::SUPER;
            count += 1;
        }
    }
    count
}

fn is_super_node(nodes: &NodesX, segments: &SegmentsX, ways: &WaysX, n: u32) -> bool {
    let node = nodes.get(n);
    if node.has_flag(node_flags::TURNRSTRCT) || node.has_flag(node_flags::TURNRSTRCT2) {
        return true;
    }

    let mut seen: Vec<(Way, u32)> = Vec::new();
    for seg_idx in segments.incident(n) {
        let seg = segments.get(seg_idx);
        let way = ways.get(seg.way).way;
        let weight: u32 = if seg.node1 == seg.node2 { 2 } else { 1 };

        if way.allow & !node.allow != 0 && node.allow != 0 {
            return true;
        }

        let mut nsegments = weight;
        for &(prev_way, prev_weight) in &seen {
            if way.allow & prev_way.allow != 0 {
                if !way.same_class(&prev_way) {
                    return true;
                }
                nsegments += prev_weight;
                if nsegments > 2 {
                    return true;
                }
            }
        }

        seen.push((way, weight));
    }

    false
}

/// Bounded Dijkstra from `start`, restricted to segments whose way compares
/// equal to `match_way`, stopping at every super-node it reaches
/// (`FindSuperRoutes`).
fn find_super_routes(nodes: &NodesX, segments: &SegmentsX, ways: &WaysX, start: u32, match_way: &Way) -> Results {
    let mut results = Results::new(8);
    let mut queue = Queue::new();

    let h0 = results.insert(start, NO_SEGMENT);
    queue.insert(&mut results, h0, 0);

    while let Some(h1) = queue.pop(&mut results) {
        let node1 = results.get(h1).node;
        let incoming_segment = results.get(h1).segment;
        let prev_score = results.get(h1).score;
        let prev_ascent = results.get(h1).percent_ascent;
        let prev_descent = results.get(h1).percent_descent;

        for seg_idx in segments.incident(node1) {
            let seg = *segments.get(seg_idx);

            if seg.is_oneway_from(node1) {
                continue; // can't leave node1 along this edge
            }
            if incoming_segment == seg_idx {
                continue; // no u-turn back onto the edge we arrived on
            }

            let way = ways.get(seg.way).way;
            if !way.same_class(match_way) {
                continue;
            }

            let node2 = seg.other_node(node1);
            if nodes.get(node2).allow == transports::NONE {
                continue;
            }

            let cumulative = prev_score + seg.distance.metres();
            let ascent_edge = u8::from(seg.inclines_up_from(node1));
            let descent_edge = u8::from(seg.inclines_up_from(node2));

            let existing = results.find(node2, seg_idx);
            let should_update = match existing {
                None => true,
                Some(h2) => cumulative < results.get(h2).score,
            };
            if !should_update {
                continue;
            }

            let h2 = existing.unwrap_or_else(|| results.insert(node2, seg_idx));
            {
                let e = results.get_mut(h2);
                e.prev = h1;
                e.score = cumulative;
                e.percent_ascent = prev_ascent.max(ascent_edge);
                e.percent_descent = prev_descent.max(descent_edge);
            }

            if !nodes.get(node2).has_flag(node_flags::SUPER) {
                queue.insert(&mut results, h2, cumulative);
            }
        }
    }

    results
}

/// Route out from every super-node along each distinct way class it
/// touches, emitting one super-segment per super-node reached
/// (`CreateSuperSegments`).
pub fn create_super_segments(nodes: &NodesX, segments: &SegmentsX, ways: &WaysX) -> SegmentsX {
    let mut supersegments = SegmentsX::new();

    for i in 0..nodes.len() as u32 {
        if !nodes.get(i).has_flag(node_flags::SUPER) {
            continue;
        }

        let mut seen_classes: Vec<Way> = Vec::new();

        for seg_idx in segments.incident(i) {
            let seg = *segments.get(seg_idx);
            let way = ways.get(seg.way).way;
            if seen_classes.iter().any(|w| w.same_class(&way)) {
                continue;
            }
            seen_classes.push(way);

            let results = find_super_routes(nodes, segments, ways, i, &way);
            for (_, r) in results.iter() {
                if r.segment == NO_SEGMENT || !nodes.get(r.node).has_flag(node_flags::SUPER) {
                    continue;
                }

                let mut distance = Distance(0).with_metres(r.score.min(segment_flags::DISTANCE_MASK));
                if way.is_oneway() && r.node != i {
                    distance = distance.set_flag(segment_flags::ONEWAY_1TO2, true);
                }

                let mut incline = 0u8;
                if way.incline != 0 && r.node != i {
                    if r.percent_ascent != 0 {
                        incline |= segment_flags::INCLINEUP_1TO2;
                    }
                    if r.percent_descent != 0 {
                        incline |= segment_flags::INCLINEUP_2TO1;
                    }
                }

                supersegments
                    .append(SegmentX {
                        node1: i,
                        node2: r.node,
                        next2: NO_SEGMENT,
                        way: seg.way,
                        distance,
                        kind: segment_flags::SEGMENT_SUPER,
                        incline,
                    })
                    .expect("segment capacity");
            }
        }
    }

    supersegments
}

/// Drop duplicate super-segments. `create_super_segments` routes out from
/// every super-node independently, so a pair of adjacent super-nodes joined
/// by a two-way path is discovered — and emitted — from both ends.
/// Keep one record per `(node1, node2)` pair per distinct way class and set
/// of direction/area flags (`DeduplicateSuperSegments`/`deduplicate_super`).
pub fn deduplicate_super_segments(supersegments: &SegmentsX, ways: &WaysX) -> SegmentsX {
    let mut sorted: Vec<SegmentX> = supersegments.as_slice().to_vec();
    sorted.sort_by_key(|s| (s.node1, s.node2));

    let flag_bits = |d: Distance| d.0 & !segment_flags::DISTANCE_MASK;

    let mut deduplicated = SegmentsX::new();
    let mut kept: Vec<SegmentX> = Vec::new();

    for (idx, seg) in sorted.iter().enumerate() {
        if idx == 0 || seg.node1 != sorted[idx - 1].node1 || seg.node2 != sorted[idx - 1].node2 {
            kept.clear();
        }

        let way = ways.get(seg.way).way;
        let is_duplicate = kept.iter().any(|k| {
            flag_bits(k.distance) == flag_bits(seg.distance) && ways.get(k.way).way.same_class(&way)
        });

        if !is_duplicate {
            kept.push(*seg);
            deduplicated.append(*seg).expect("segment capacity");
        }
    }

    deduplicated
}

/// Merge the normal and super-segment streams, sorted by `(node1, node2,
/// distance)`; a key match in both streams becomes one record flagged
/// `SEGMENT_SUPER | SEGMENT_NORMAL` (`MergeSuperSegments`).
pub fn merge_super_segments(normal: &SegmentsX, supersegments: &SegmentsX) -> SegmentsX {
    let mut merged = SegmentsX::new();

    let key = |s: &SegmentX| (s.node1, s.node2, s.distance.metres());
    let mut a: Vec<SegmentX> = normal.as_slice().to_vec();
    let mut b: Vec<SegmentX> = supersegments.as_slice().to_vec();
    a.sort_by_key(key);
    b.sort_by_key(key);

    let mut j = 0;
    for mut seg in a {
        let mut is_super = false;

        while j < b.len() {
            let sup = b[j];
            match (sup.node1, sup.node2).cmp(&(seg.node1, seg.node2)) {
                std::cmp::Ordering::Less => {
                    let mut s = sup;
                    s.kind |= segment_flags::SEGMENT_SUPER;
                    merged.append(s).expect("segment capacity");
                    j += 1;
                }
                std::cmp::Ordering::Equal if sup.distance.metres() != seg.distance.metres() => {
                    let mut s = sup;
                    s.kind |= segment_flags::SEGMENT_SUPER;
                    merged.append(s).expect("segment capacity");
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    is_super = true;
                    j += 1;
                    break;
                }
                std::cmp::Ordering::Greater => break,
            }
        }

        seg.kind |= segment_flags::SEGMENT_NORMAL;
        if is_super {
            seg.kind |= segment_flags::SEGMENT_SUPER;
        }
        merged.append(seg).expect("segment capacity");
    }

    while j < b.len() {
        let mut s = b[j];
        s.kind |= segment_flags::SEGMENT_SUPER;
        merged.append(s).expect("segment capacity");
        j += 1;
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::DiagnosticLog;
    use crate::model::NodeX;
    use tempfile::tempdir;

    fn way(highway_type: u8) -> Way {
        Way {
            name: 0,
            highway_type,
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

    fn node() -> NodeX {
        NodeX { id: 0, allow: transports::ALL_VEHICLES, flags: 0, lat: 0, lon: 0 }
    }

    /// Star graph: one four-way junction (super by the "more than two
    /// segments" rule) connects to three dead ends.
    fn star_graph() -> (NodesX, WaysX, SegmentsX) {
        let dir = tempdir().unwrap();
        let mut log = DiagnosticLog::create(&dir.path().join("log.txt")).unwrap();

        let mut nodes = NodesX::new();
        for id in 1..=4u64 {
            nodes.append(NodeX { id, ..node() }).unwrap();
        }
        nodes.sort();

        let mut ways = WaysX::new();
        ways.append(1, way(1), vec![], "Rd".into()).unwrap();
        ways.sort(&mut log);

        let mut segments = SegmentsX::new();
        segments.append(SegmentX { node1: 0, node2: 1, next2: NO_SEGMENT, way: 0, distance: Distance(0).with_metres(100), kind: segment_flags::SEGMENT_NORMAL, incline: 0 }).unwrap();
        segments.append(SegmentX { node1: 0, node2: 2, next2: NO_SEGMENT, way: 0, distance: Distance(0).with_metres(200), kind: segment_flags::SEGMENT_NORMAL, incline: 0 }).unwrap();
        segments.append(SegmentX { node1: 0, node2: 3, next2: NO_SEGMENT, way: 0, distance: Distance(0).with_metres(300), kind: segment_flags::SEGMENT_NORMAL, incline: 0 }).unwrap();
        segments.index_segments(4);

        (nodes, ways, segments)
    }

    #[test]
    fn junction_with_three_segments_is_super() {
        let (mut nodes, ways, segments) = star_graph();
        let count = choose_super_nodes(&mut nodes, &segments, &ways);
        assert_eq!(count, 1);
        assert!(nodes.get(0).has_flag(node_flags::SUPER));
        assert!(!nodes.get(1).has_flag(node_flags::SUPER));
    }

    #[test]
    fn two_node_through_route_is_not_super() {
        let dir = tempdir().unwrap();
        let mut log = DiagnosticLog::create(&dir.path().join("log.txt")).unwrap();

        let mut nodes = NodesX::new();
        nodes.append(NodeX { id: 1, ..node() }).unwrap();
        nodes.append(NodeX { id: 2, ..node() }).unwrap();
        nodes.sort();

        let mut ways = WaysX::new();
        ways.append(1, way(1), vec![], "Rd".into()).unwrap();
        ways.sort(&mut log);

        let mut segments = SegmentsX::new();
        segments.append(SegmentX { node1: 0, node2: 1, next2: NO_SEGMENT, way: 0, distance: Distance(0).with_metres(100), kind: segment_flags::SEGMENT_NORMAL, incline: 0 }).unwrap();
        segments.index_segments(2);

        let count = choose_super_nodes(&mut nodes, &segments, &ways);
        assert_eq!(count, 0);
    }

    #[test]
    fn super_segments_connect_every_reachable_super_node() {
        let (mut nodes, ways, segments) = star_graph();
        choose_super_nodes(&mut nodes, &segments, &ways);
        // All three leaves become super too (trivially, since a 1-segment
        // dead end has nothing to disqualify it — mark them directly to
        // exercise CreateSuperSegments across more than one super-node).
        for leaf in [1u32, 2, 3] {
            nodes.get_mut(leaf).flags |= node_flags::SUPER;
        }

        // Every leaf is super too, so each edge is discovered from both
        // ends: six raw super-segments collapse to three after dedup.
        let supersegments = create_super_segments(&nodes, &segments, &ways);
        assert_eq!(supersegments.len(), 6);

        let supersegments = deduplicate_super_segments(&supersegments, &ways);
        assert_eq!(supersegments.len(), 3);
        let mut lengths: Vec<u32> = supersegments.as_slice().iter().map(|s| s.distance.metres()).collect();
        lengths.sort();
        assert_eq!(lengths, vec![100, 200, 300]);

        let merged = merge_super_segments(&segments, &supersegments);
        assert_eq!(merged.len(), 3);
        for s in merged.as_slice() {
            assert!(s.is_super());
            assert!(s.kind & segment_flags::SEGMENT_NORMAL != 0);
        }
    }
}
