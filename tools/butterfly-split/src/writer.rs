//! Geographic re-indexing and the final bin-indexed file writer
//! (`spec.md` §4.I, §6).
//!
//! Four files come out of this phase — `<prefix>-nodes.mem`,
//! `<prefix>-segments.mem`, `<prefix>-ways.mem`, `<prefix>-relations.mem` —
//! each a `[header][records]` stream, with nodes and segments additionally
//! carrying a prefix-sum bin index ahead of their records. Ways and
//! relations aren't geographic entities in their own right so they get no
//! bin index, matching the per-file layout table rather than the looser
//! prose summary above it.

use crate::entities::{NodesX, SegmentsX, WaysX};
use crate::error::{CoreError, Result};
use crate::io::BufferedWriter;
use crate::model::{node_flags, segment_flags, NodeX, SegmentX, TurnRelX, NO_NODE, NO_SEGMENT};
use std::collections::HashMap;
use std::path::Path;

/// A `(lat, lon)` quantization grid used to bin nodes and segments
/// spatially (`spec.md` §8 property 8: "geographic bin index").
#[derive(Clone, Copy, Debug)]
pub struct BinGrid {
    pub latzero: i32,
    pub lonzero: i32,
    pub latbins: u32,
    pub lonbins: u32,
    lat_span: i64,
    lon_span: i64,
}

impl BinGrid {
    pub fn compute(coords: &[(i32, i32)]) -> Self {
        if coords.is_empty() {
            return BinGrid { latzero: 0, lonzero: 0, latbins: 1, lonbins: 1, lat_span: 1, lon_span: 1 };
        }

        let (mut latmin, mut latmax) = (i32::MAX, i32::MIN);
        let (mut lonmin, mut lonmax) = (i32::MAX, i32::MIN);
        for &(lat, lon) in coords {
            latmin = latmin.min(lat);
            latmax = latmax.max(lat);
            lonmin = lonmin.min(lon);
            lonmax = lonmax.max(lon);
        }

        // Aim for roughly 64 records per bin; one bin is always enough for
        // a handful of nodes.
        let side = ((coords.len() as f64 / 64.0).sqrt().ceil() as u32).max(1);
        BinGrid {
            latzero: latmin,
            lonzero: lonmin,
            latbins: side,
            lonbins: side,
            lat_span: (latmax - latmin) as i64 + 1,
            lon_span: (lonmax - lonmin) as i64 + 1,
        }
    }

    pub fn total_bins(&self) -> usize {
        (self.latbins * self.lonbins) as usize
    }

    fn lat_index(&self, lat: i32) -> u32 {
        let idx = (((lat - self.latzero) as i64 * self.latbins as i64) / self.lat_span) as u32;
        idx.min(self.latbins - 1)
    }

    fn lon_index(&self, lon: i32) -> u32 {
        let idx = (((lon - self.lonzero) as i64 * self.lonbins as i64) / self.lon_span) as u32;
        idx.min(self.lonbins - 1)
    }

    pub fn bin_of(&self, lat: i32, lon: i32) -> u32 {
        self.lat_index(lat) * self.lonbins + self.lon_index(lon)
    }

    /// The (lat, lon) of a bin's own origin, used to compute the small
    /// `latoff`/`lonoff` deltas stored per node record.
    fn cell_origin(&self, bin: u32) -> (i32, i32) {
        let latidx = (bin / self.lonbins) as i64;
        let lonidx = (bin % self.lonbins) as i64;
        let lat = self.latzero as i64 + (latidx * self.lat_span) / self.latbins as i64;
        let lon = self.lonzero as i64 + (lonidx * self.lon_span) / self.lonbins as i64;
        (lat as i32, lon as i32)
    }
}

fn prefix_sums(bins: &[u32], total_bins: usize) -> Vec<u32> {
    let mut counts = vec![0u32; total_bins];
    for &b in bins {
        counts[b as usize] += 1;
    }
    let mut offsets = vec![0u32; total_bins + 1];
    for i in 0..total_bins {
        offsets[i + 1] = offsets[i] + counts[i];
    }
    offsets
}

struct GeoNodes {
    grid: BinGrid,
    old_to_new: Vec<u32>,
    ordered: Vec<NodeX>,
    bins: Vec<u32>,
}

/// Sort nodes into geographic bin order, dropping any node left with no
/// incident segment (an artifact of pruning that contracted every edge
/// touching it away).
fn geo_sort_nodes(nodes: &NodesX, segments: &SegmentsX) -> GeoNodes {
    let n = nodes.len();
    let coords: Vec<(i32, i32)> = (0..n as u32).map(|i| (nodes.get(i).lat, nodes.get(i).lon)).collect();
    let grid = BinGrid::compute(&coords);

    let mut retained: Vec<u32> = (0..n as u32).filter(|&i| segments.first_segment(i).is_some()).collect();
    retained.sort_by_key(|&i| grid.bin_of(coords[i as usize].0, coords[i as usize].1));

    let mut old_to_new = vec![NO_NODE; n];
    for (new_idx, &old_idx) in retained.iter().enumerate() {
        old_to_new[old_idx as usize] = new_idx as u32;
    }

    let ordered: Vec<NodeX> = retained.iter().map(|&i| *nodes.get(i)).collect();
    let bins: Vec<u32> = ordered.iter().map(|nd| grid.bin_of(nd.lat, nd.lon)).collect();

    GeoNodes { grid, old_to_new, ordered, bins }
}

/// Remap segment endpoints through the node geo-sort, re-normalize, and
/// rebuild the `firstnode`/`next2` adjacency over the new node numbering.
fn geo_sort_segments(segments: &SegmentsX, old_to_new: &[u32], num_new_nodes: usize) -> SegmentsX {
    let mut remapped: Vec<SegmentX> = Vec::new();
    for (_, seg) in segments.iter() {
        let n1 = old_to_new[seg.node1 as usize];
        let n2 = old_to_new[seg.node2 as usize];
        if n1 == NO_NODE || n2 == NO_NODE {
            continue;
        }
        let mut s = *seg;
        s.node1 = n1;
        s.node2 = n2;
        if s.node1 > s.node2 {
            s.swap_nodes();
        }
        remapped.push(s);
    }
    remapped.sort_by_key(|s| (s.node1, s.node2));

    let mut out = SegmentsX::new();
    out.replace_all(remapped);
    out.index_segments(num_new_nodes);
    out
}

/// Pack `kind`/`incline`, which the in-memory `SegmentX` keeps as separate
/// bytes, into the spare high bits of the final on-disk `distance` word.
/// Metres are capped to 24 bits (~16,700 km) to make room.
fn pack_final_distance(seg: &SegmentX) -> u32 {
    let mut v = seg.distance.metres().min(0x00FF_FFFF);
    if seg.distance.flag(segment_flags::ONEWAY_1TO2) {
        v |= 1 << 24;
    }
    if seg.distance.flag(segment_flags::ONEWAY_2TO1) {
        v |= 1 << 25;
    }
    if seg.distance.flag(segment_flags::AREA) {
        v |= 1 << 26;
    }
    if seg.is_super() {
        v |= 1 << 27;
    }
    if seg.incline & segment_flags::INCLINEUP_1TO2 != 0 {
        v |= 1 << 28;
    }
    if seg.incline & segment_flags::INCLINEUP_2TO1 != 0 {
        v |= 1 << 29;
    }
    v
}

/// Resolve turn relations against the final node/segment numbering:
/// `via` becomes the new node index, `from`/`to` become the segment
/// indexes connecting `via` to those (now-renumbered) nodes, found by
/// walking `via`'s incidence list (`spec.md` §4.I).
fn resolve_turn_relations(turns: &[TurnRelX], old_to_new: &[u32], final_segments: &SegmentsX) -> Vec<(u32, u32, u32, u8)> {
    let mut out = Vec::new();
    for t in turns {
        let via = old_to_new[t.via as usize];
        let from_node = old_to_new[t.from as usize];
        let to_node = old_to_new[t.to as usize];
        if via == NO_NODE || from_node == NO_NODE || to_node == NO_NODE {
            continue;
        }

        let from_seg = final_segments.incident(via).find(|&s| final_segments.get(s).other_node(via) == from_node);
        let to_seg = final_segments.incident(via).find(|&s| final_segments.get(s).other_node(via) == to_node);

        if let (Some(fs), Some(ts)) = (from_seg, to_seg) {
            out.push((fs, via, ts, t.except as u8));
        }
    }
    out.sort_by_key(|&(from, via, to, _)| (via, from, to));
    out
}

fn write_nodes(path: &Path, geo: &GeoNodes, firstseg: &[u32]) -> Result<()> {
    let mut w = BufferedWriter::create(path).map_err(|e| CoreError::io(path, e))?;

    let count = geo.ordered.len() as u32;
    let super_count = geo.ordered.iter().filter(|n| n.has_flag(node_flags::SUPER)).count() as u32;
    let normal_count = count - super_count;

    let mut header = Vec::with_capacity(28);
    header.extend_from_slice(&count.to_le_bytes());
    header.extend_from_slice(&super_count.to_le_bytes());
    header.extend_from_slice(&normal_count.to_le_bytes());
    header.extend_from_slice(&geo.grid.latbins.to_le_bytes());
    header.extend_from_slice(&geo.grid.lonbins.to_le_bytes());
    header.extend_from_slice(&geo.grid.latzero.to_le_bytes());
    header.extend_from_slice(&geo.grid.lonzero.to_le_bytes());
    w.write_record(&header).map_err(|e| CoreError::io(path, e))?;

    let offsets = prefix_sums(&geo.bins, geo.grid.total_bins());
    for off in &offsets {
        w.write_record(&off.to_le_bytes()).map_err(|e| CoreError::io(path, e))?;
    }

    for (idx, nd) in geo.ordered.iter().enumerate() {
        let bin = geo.bins[idx];
        let (origin_lat, origin_lon) = geo.grid.cell_origin(bin);
        let latoff = (nd.lat as i64 - origin_lat as i64).clamp(i16::MIN as i64, i16::MAX as i64) as i16;
        let lonoff = (nd.lon as i64 - origin_lon as i64).clamp(i16::MIN as i64, i16::MAX as i64) as i16;

        let mut rec = [0u8; 12];
        rec[0..2].copy_from_slice(&latoff.to_le_bytes());
        rec[2..4].copy_from_slice(&lonoff.to_le_bytes());
        rec[4..8].copy_from_slice(&firstseg[idx].to_le_bytes());
        rec[8] = nd.allow as u8;
        rec[9] = nd.flags as u8;
        w.write_record(&rec).map_err(|e| CoreError::io(path, e))?;
    }

    w.flush().map_err(|e| CoreError::io(path, e))
}

fn write_segments(path: &Path, grid: &BinGrid, node_bins: &[u32], final_segments: &SegmentsX) -> Result<()> {
    let mut w = BufferedWriter::create(path).map_err(|e| CoreError::io(path, e))?;

    let slice = final_segments.as_slice();
    let count = slice.len() as u32;
    let super_count = slice.iter().filter(|s| s.is_super()).count() as u32;
    let normal_count = slice.iter().filter(|s| s.kind & segment_flags::SEGMENT_NORMAL != 0).count() as u32;

    let mut header = Vec::with_capacity(12);
    header.extend_from_slice(&count.to_le_bytes());
    header.extend_from_slice(&super_count.to_le_bytes());
    header.extend_from_slice(&normal_count.to_le_bytes());
    w.write_record(&header).map_err(|e| CoreError::io(path, e))?;

    let seg_bins: Vec<u32> = slice.iter().map(|s| node_bins[s.node1 as usize]).collect();
    let offsets = prefix_sums(&seg_bins, grid.total_bins());
    for off in &offsets {
        w.write_record(&off.to_le_bytes()).map_err(|e| CoreError::io(path, e))?;
    }

    for seg in slice {
        let mut rec = [0u8; 20];
        rec[0..4].copy_from_slice(&seg.node1.to_le_bytes());
        rec[4..8].copy_from_slice(&seg.node2.to_le_bytes());
        rec[8..12].copy_from_slice(&seg.next2.to_le_bytes());
        rec[12..16].copy_from_slice(&seg.way.to_le_bytes());
        rec[16..20].copy_from_slice(&pack_final_distance(seg).to_le_bytes());
        w.write_record(&rec).map_err(|e| CoreError::io(path, e))?;
    }

    w.flush().map_err(|e| CoreError::io(path, e))
}

fn write_ways(path: &Path, ways: &WaysX) -> Result<()> {
    let mut w = BufferedWriter::create(path).map_err(|e| CoreError::io(path, e))?;

    let mut highway_union = 0u8;
    let mut allow_union = 0u16;
    let mut props_union = 0u16;
    for (_, entry) in ways.iter() {
        highway_union |= entry.way.highway_type;
        allow_union |= entry.way.allow;
        props_union |= entry.way.props;
    }

    let mut header = Vec::with_capacity(9);
    header.extend_from_slice(&(ways.len() as u32).to_le_bytes());
    header.push(highway_union);
    header.extend_from_slice(&allow_union.to_le_bytes());
    header.extend_from_slice(&props_union.to_le_bytes());
    w.write_record(&header).map_err(|e| CoreError::io(path, e))?;

    // Build the name pool first so each Way record can carry its pool
    // offset; names repeated across ways (very common: "Main Street")
    // share one entry.
    let mut pool = Vec::new();
    let mut offsets_by_name: HashMap<String, u32> = HashMap::new();
    let mut name_offsets = Vec::with_capacity(ways.len());
    for (_, entry) in ways.iter() {
        let offset = *offsets_by_name.entry(entry.name.clone()).or_insert_with(|| {
            let offset = pool.len() as u32;
            pool.extend_from_slice(entry.name.as_bytes());
            pool.push(0);
            offset
        });
        name_offsets.push(offset);
    }

    for (idx, (_, entry)) in ways.iter().enumerate() {
        let mut way = entry.way;
        way.name = name_offsets[idx];
        w.write_record(&way.to_bytes()).map_err(|e| CoreError::io(path, e))?;
    }

    w.write_record(&pool).map_err(|e| CoreError::io(path, e))?;
    w.flush().map_err(|e| CoreError::io(path, e))
}

fn write_relations(path: &Path, resolved: &[(u32, u32, u32, u8)]) -> Result<()> {
    let mut w = BufferedWriter::create(path).map_err(|e| CoreError::io(path, e))?;

    let mut header = Vec::with_capacity(4);
    header.extend_from_slice(&(resolved.len() as u32).to_le_bytes());
    w.write_record(&header).map_err(|e| CoreError::io(path, e))?;

    for &(from, via, to, except) in resolved {
        let mut rec = [0u8; 13];
        rec[0..4].copy_from_slice(&from.to_le_bytes());
        rec[4..8].copy_from_slice(&via.to_le_bytes());
        rec[8..12].copy_from_slice(&to.to_le_bytes());
        rec[12] = except;
        w.write_record(&rec).map_err(|e| CoreError::io(path, e))?;
    }

    w.flush().map_err(|e| CoreError::io(path, e))
}

/// Write the four output files (`spec.md` §6 "Output file layout").
pub fn write_database(
    nodes: &NodesX,
    segments: &SegmentsX,
    ways: &WaysX,
    turns: &[TurnRelX],
    dir: &Path,
    prefix: &str,
) -> Result<()> {
    let geo = geo_sort_nodes(nodes, segments);
    let final_segments = geo_sort_segments(segments, &geo.old_to_new, geo.ordered.len());

    let firstseg: Vec<u32> = (0..geo.ordered.len() as u32)
        .map(|n| final_segments.first_segment(n).unwrap_or(NO_SEGMENT))
        .collect();

    let resolved_turns = resolve_turn_relations(turns, &geo.old_to_new, &final_segments);

    write_nodes(&dir.join(format!("{prefix}-nodes.mem")), &geo, &firstseg)?;
    write_segments(&dir.join(format!("{prefix}-segments.mem")), &geo.grid, &geo.bins, &final_segments)?;
    write_ways(&dir.join(format!("{prefix}-ways.mem")), ways)?;
    write_relations(&dir.join(format!("{prefix}-relations.mem")), &resolved_turns)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{transports, Distance};

    fn node(id: u64, lat: i32, lon: i32) -> NodeX {
        NodeX { id, allow: transports::ALL_VEHICLES, flags: 0, lat, lon }
    }

    #[test]
    fn bin_grid_assigns_every_point_a_valid_bin() {
        let coords = vec![(0, 0), (1_000_000, 1_000_000), (-500_000, 2_000_000)];
        let grid = BinGrid::compute(&coords);
        for &(lat, lon) in &coords {
            assert!(grid.bin_of(lat, lon) < grid.total_bins() as u32);
        }
    }

    #[test]
    fn geo_sort_drops_nodes_with_no_incident_segment() {
        let mut nodes = NodesX::new();
        nodes.append(node(1, 0, 0)).unwrap();
        nodes.append(node(2, 100, 100)).unwrap();
        nodes.append(node(3, 200, 200)).unwrap(); // orphan, no segment
        nodes.sort();

        let mut segments = SegmentsX::new();
        segments
            .append(SegmentX {
                node1: 0,
                node2: 1,
                next2: NO_SEGMENT,
                way: 0,
                distance: Distance(0).with_metres(10),
                kind: segment_flags::SEGMENT_NORMAL,
                incline: 0,
            })
            .unwrap();
        segments.index_segments(3);

        let geo = geo_sort_nodes(&nodes, &segments);
        assert_eq!(geo.ordered.len(), 2);
        assert_eq!(geo.old_to_new[2], NO_NODE);
    }

    #[test]
    fn prefix_sums_match_bin_membership() {
        let bins = vec![0u32, 0, 1, 1, 1, 2];
        let offsets = prefix_sums(&bins, 3);
        assert_eq!(offsets, vec![0, 2, 5, 6]);
    }

    #[test]
    fn write_nodes_round_trips_header_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut nodes = NodesX::new();
        nodes.append(node(1, 0, 0)).unwrap();
        nodes.append(node(2, 1000, 1000)).unwrap();
        nodes.sort();

        let mut segments = SegmentsX::new();
        segments
            .append(SegmentX {
                node1: 0,
                node2: 1,
                next2: NO_SEGMENT,
                way: 0,
                distance: Distance(0).with_metres(5),
                kind: segment_flags::SEGMENT_NORMAL,
                incline: 0,
            })
            .unwrap();
        segments.index_segments(2);

        let geo = geo_sort_nodes(&nodes, &segments);
        let firstseg = vec![NO_SEGMENT; geo.ordered.len()];
        let path = dir.path().join("test-nodes.mem");
        write_nodes(&path, &geo, &firstseg).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        assert_eq!(count, 2);
    }
}
