//! Way splitting and segment processing (`spec.md` §4.E), grounded on
//! `segmentsx.c`'s `SplitWays`/`ProcessSegments`/`IndexSegments`.

use crate::entities::{NodesX, SegmentsX, WaysX};
use crate::error::Result;
use crate::log::{DiagnosticLog, EntityKind, EntityRef, Severity};
use crate::model::{segment_flags, Distance, SegmentX, NO_NODE};

/// OSM coordinates are stored as signed fixed-point degrees scaled by
/// `1e7` ("decimicrodegrees", the granularity OSM's own PBF format uses).
pub const COORD_SCALE: f64 = 1e7;

/// WGS-84-ish mean radius used by the original's great-circle formula.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Great-circle distance in metres between two `(lat, lon)` points stored
/// as `COORD_SCALE`-scaled integers (`spec.md` §4.E).
pub fn great_circle_distance(lat1: i32, lon1: i32, lat2: i32, lon2: i32) -> u32 {
    let phi1 = (lat1 as f64 / COORD_SCALE).to_radians();
    let phi2 = (lat2 as f64 / COORD_SCALE).to_radians();
    let dphi = phi2 - phi1;
    let dlambda = ((lon2 - lon1) as f64 / COORD_SCALE).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let d = 2.0 * EARTH_RADIUS_M * a.sqrt().clamp(-1.0, 1.0).asin();
    d.round().max(0.0) as u32
}

/// Explode every way's node-reference list into segments, translating OSM
/// node ids to sorted indexes via `NodesX::index_of` (`SplitWays`).
pub fn split_ways(
    nodes: &NodesX,
    ways: &mut WaysX,
    segments: &mut SegmentsX,
    log: &mut DiagnosticLog,
) -> Result<()> {
    for way_idx in 0..ways.len() as u32 {
        let (node_refs, oneway, area) = {
            let entry = ways.get(way_idx);
            (entry.node_refs.clone(), entry.way.is_oneway(), entry.way.is_area())
        };

        let mut used = false;

        for pair in node_refs.windows(2) {
            let prev_idx = nodes.index_of(pair[0]);
            let cur_idx = nodes.index_of(pair[1]);

            if prev_idx == NO_NODE || cur_idx == NO_NODE {
                log.record(
                    &[way_ref(ways, way_idx)],
                    Severity::DataQuality,
                    "way references unknown node",
                );
                continue;
            }
            if prev_idx == cur_idx {
                log.record(&[way_ref(ways, way_idx)], Severity::DataQuality, "self-loop node");
                continue;
            }

            let mut distance = Distance(0);
            if oneway {
                distance = distance.set_flag(segment_flags::ONEWAY_1TO2, true);
            }
            if area {
                distance = distance.set_flag(segment_flags::AREA, true);
            }

            segments.append(SegmentX {
                node1: prev_idx,
                node2: cur_idx,
                next2: crate::model::NO_SEGMENT,
                way: way_idx,
                distance,
                kind: segment_flags::SEGMENT_NORMAL,
                incline: 0,
            })?;
            used = true;
        }

        if used {
            ways.mark_used(way_idx);
        }
    }

    Ok(())
}

fn way_ref(ways: &WaysX, index: u32) -> EntityRef {
    EntityRef {
        kind: EntityKind::Way,
        id: ways.original_id(index),
    }
}

/// Sort segments, drop duplicates per the area/non-area policy, and
/// compute each survivor's great-circle length (`ProcessSegments`).
pub fn process_segments(
    nodes: &NodesX,
    ways: &mut WaysX,
    segments: &mut SegmentsX,
    log: &mut DiagnosticLog,
) -> Result<()> {
    let mut sorted: Vec<SegmentX> = segments.as_slice().to_vec();
    sorted.sort_by(|a, b| {
        (a.node1, a.node2, a.distance.metres(), a.distance.0).cmp(&(
            b.node1,
            b.node2,
            b.distance.metres(),
            b.distance.0,
        ))
    });

    let mut kept = Vec::with_capacity(sorted.len());
    let mut i = 0;
    while i < sorted.len() {
        let mut cur = sorted[i];
        let mut j = i + 1;

        while j < sorted.len() && sorted[j].node1 == cur.node1 && sorted[j].node2 == cur.node2 {
            let other = sorted[j];
            let cur_area = cur.distance.flag(segment_flags::AREA);
            let other_area = other.distance.flag(segment_flags::AREA);

            if cur.way == other.way || (!cur_area && !other_area) {
                log.record(
                    &[way_ref(ways, cur.way)],
                    Severity::DataQuality,
                    "duplicated segment",
                );
            } else if cur_area && !other_area {
                // Keep the non-area copy.
                log.record(
                    &[way_ref(ways, cur.way)],
                    Severity::DataQuality,
                    "duplicated segment",
                );
                cur = other;
            } else {
                // `other` is an area (or both are) — keep `cur`.
                log.record(
                    &[way_ref(ways, other.way)],
                    Severity::DataQuality,
                    "duplicated segment",
                );
            }

            j += 1;
        }

        let n1 = nodes.get(cur.node1);
        let n2 = nodes.get(cur.node2);
        let metres = great_circle_distance(n1.lat, n1.lon, n2.lat, n2.lon);

        cur.distance = cur
            .distance
            .set_flag(segment_flags::AREA, false)
            .with_metres(metres.min(segment_flags::DISTANCE_MASK));

        ways.mark_used(cur.way);
        kept.push(cur);
        i = j;
    }

    segments.replace_all(kept);
    Ok(())
}

/// Build the `firstnode`/`next2` adjacency index over the final segment
/// set (`IndexSegments`).
pub fn index_segments(segments: &mut SegmentsX, num_nodes: usize) {
    segments.index_segments(num_nodes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{transports, Way, NodeX};
    use tempfile::tempdir;

    fn way(oneway: bool) -> Way {
        Way {
            name: 0,
            highway_type: if oneway { crate::model::way_flags::ONEWAY } else { 0 },
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

    /// Reference-distance check for the great-circle formula itself
    /// (`original_source/src/test/is-fast-math.c` guarded against unsafe
    /// float optimizations breaking this same formula at build time; here
    /// the check is just a value assertion against known distances).
    #[test]
    fn great_circle_reference() {
        assert_eq!(great_circle_distance(0, 0, 0, 0), 0);

        // One degree of longitude along the equator is ~111.32 km.
        let d = great_circle_distance(0, 0, 0, 10_000_000);
        assert!((111_000..112_000).contains(&d), "got {d}");

        // One degree of latitude is ~111.19 km anywhere.
        let d = great_circle_distance(0, 0, 10_000_000, 0);
        assert!((111_000..112_000).contains(&d), "got {d}");
    }

    #[test]
    fn splits_way_and_computes_distance() {
        let dir = tempdir().unwrap();
        let mut log = DiagnosticLog::create(&dir.path().join("log.txt")).unwrap();

        let mut nodes = NodesX::new();
        nodes.append(node(1, 0, 0)).unwrap();
        nodes.append(node(2, 0, 10_000_000)).unwrap(); // 1 degree east
        nodes.sort();

        let mut ways = WaysX::new();
        ways.append(1, way(true), vec![1, 2], "Test Rd".into()).unwrap();
        ways.sort(&mut log);

        let mut segments = SegmentsX::new();
        split_ways(&nodes, &mut ways, &mut segments, &mut log).unwrap();
        assert_eq!(segments.len(), 1);

        process_segments(&nodes, &mut ways, &mut segments, &mut log).unwrap();
        assert_eq!(segments.len(), 1);

        let s = segments.get(0);
        // ~111.3 km for one degree of longitude at the equator.
        assert!(s.distance.metres() > 110_000 && s.distance.metres() < 112_000);
        assert!(s.distance.flag(segment_flags::ONEWAY_1TO2));
        assert!(ways.is_used(0));
    }

    #[test]
    fn drops_self_loop_and_unknown_node_references() {
        let dir = tempdir().unwrap();
        let mut log = DiagnosticLog::create(&dir.path().join("log.txt")).unwrap();

        let mut nodes = NodesX::new();
        nodes.append(node(1, 0, 0)).unwrap();
        nodes.sort();

        let mut ways = WaysX::new();
        // Self-loop (1,1) then reference to a nonexistent node 99.
        ways.append(1, way(false), vec![1, 1, 99], "Loop".into()).unwrap();
        ways.sort(&mut log);

        let mut segments = SegmentsX::new();
        split_ways(&nodes, &mut ways, &mut segments, &mut log).unwrap();

        assert_eq!(segments.len(), 0);
        assert!(!ways.is_used(0));
        assert_eq!(log.counts().0, 2);
    }

    #[test]
    fn duplicate_segments_prefer_non_area() {
        let dir = tempdir().unwrap();
        let mut log = DiagnosticLog::create(&dir.path().join("log.txt")).unwrap();

        let mut nodes = NodesX::new();
        nodes.append(node(1, 0, 0)).unwrap();
        nodes.append(node(2, 0, 1_000_000)).unwrap();
        nodes.sort();

        let mut ways = WaysX::new();
        ways.append(1, way(false), vec![1, 2], "Area".into()).unwrap();
        ways.append(2, way(false), vec![1, 2], "Road".into()).unwrap();
        ways.sort(&mut log);
        // Way 1 sorts before way 2 after SortWayList's ascending-id order.
        let area_way_index = ways.index_of(1);
        ways.get_mut(area_way_index).way.highway_type |= crate::model::way_flags::AREA;

        let mut segments = SegmentsX::new();
        split_ways(&nodes, &mut ways, &mut segments, &mut log).unwrap();
        assert_eq!(segments.len(), 2);

        process_segments(&nodes, &mut ways, &mut segments, &mut log).unwrap();
        assert_eq!(segments.len(), 1);
        assert!(!segments.get(0).distance.flag(segment_flags::AREA));
    }
}
