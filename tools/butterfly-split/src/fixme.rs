//! Error-log re-indexer (`spec.md` §4.J), the core half of the
//! `butterfly-fixme` second pipeline (`extras/find-fixme/*.c`).
//!
//! Every diagnostic recorded during parsing (`log::Diagnostic`) names one or
//! more N/W/R entities by their *original* OSM id. Once the main pipeline has
//! produced sorted `NodesX`/`WaysX`/`RouteRelsX`, this module resolves each
//! diagnostic to a single geographic coordinate so a viewer can plot it on a
//! map, then bin-sorts the results the same way `writer::geo_sort_nodes`
//! does.

use crate::entities::{NodesX, RouteRelsX, WaysX};
use crate::error::{CoreError, Result};
use crate::io::BufferedWriter;
use crate::log::{Diagnostic, EntityKind, EntityRef};
use crate::writer::BinGrid;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

/// Marks a diagnostic with no resolvable coordinate. Kept separate from the
/// fixed-point node coordinate range so it can never collide with a real
/// location.
pub const NO_LATLONG: i32 = i32::MIN;

/// One re-indexed diagnostic: where its text lives in the companion log,
/// and where (if anywhere) it happened.
#[derive(Clone, Copy, Debug)]
pub struct ErrorLogX {
    pub offset: u64,
    pub length: u32,
    pub lat: i32,
    pub lon: i32,
}

impl ErrorLogX {
    fn is_geographic(&self) -> bool {
        self.lat != NO_LATLONG && self.lon != NO_LATLONG
    }
}

fn resolve_node(nodes: &NodesX, id: u64) -> Option<(i32, i32)> {
    let idx = nodes.index_of(id);
    if idx == crate::model::NO_NODE {
        return None;
    }
    let n = nodes.get(idx);
    Some((n.lat, n.lon))
}

/// Midpoint of one adjacent node pair along a way, chosen at random (but
/// deterministically, seeded by the diagnostic's own index) among the pairs
/// that both resolve to a known node.
fn resolve_way(nodes: &NodesX, ways: &WaysX, id: u64, rng: &mut StdRng) -> Option<(i32, i32)> {
    let idx = ways.index_of(id);
    if idx == crate::model::NO_WAY {
        return None;
    }
    let refs = &ways.get(idx).node_refs;
    if refs.len() < 2 {
        return None;
    }

    let start = rng.random_range(0..refs.len() - 1);
    for offset in 0..refs.len() - 1 {
        let i = (start + offset) % (refs.len() - 1);
        if let (Some((lat1, lon1)), Some((lat2, lon2))) = (resolve_node(nodes, refs[i]), resolve_node(nodes, refs[i + 1])) {
            return Some((((lat1 as i64 + lat2 as i64) / 2) as i32, ((lon1 as i64 + lon2 as i64) / 2) as i32));
        }
    }
    None
}

/// One member coordinate of a relation: a random node if it has any,
/// otherwise the midpoint of a random member way. Member sub-relations
/// aren't followed — Routino's own `find-fixme` doesn't recurse into them
/// either.
fn resolve_relation(nodes: &NodesX, ways: &WaysX, routes: &RouteRelsX, id: u64, rng: &mut StdRng) -> Option<(i32, i32)> {
    let rel = routes.iter().find(|r| r.id == id)?;

    if !rel.nodes.is_empty() {
        let start = rng.random_range(0..rel.nodes.len());
        for offset in 0..rel.nodes.len() {
            let i = (start + offset) % rel.nodes.len();
            if let Some(coord) = resolve_node(nodes, rel.nodes[i]) {
                return Some(coord);
            }
        }
    }

    if !rel.ways.is_empty() {
        let start = rng.random_range(0..rel.ways.len());
        for offset in 0..rel.ways.len() {
            let i = (start + offset) % rel.ways.len();
            if let Some(coord) = resolve_way(nodes, ways, rel.ways[i], rng) {
                return Some(coord);
            }
        }
    }

    None
}

fn resolve_single(r: &EntityRef, nodes: &NodesX, ways: &WaysX, routes: &RouteRelsX, rng: &mut StdRng) -> Option<(i32, i32)> {
    match r.kind {
        EntityKind::Node => resolve_node(nodes, r.id),
        EntityKind::Way => resolve_way(nodes, ways, r.id, rng),
        EntityKind::Relation => resolve_relation(nodes, ways, routes, r.id, rng),
    }
}

/// Average the resolved coordinates of every ref sharing the first
/// nonempty kind among a diagnostic's refs, in node -> way -> relation
/// preference order.
fn resolve_multiple(refs: &[EntityRef], nodes: &NodesX, ways: &WaysX, routes: &RouteRelsX, rng: &mut StdRng) -> Option<(i32, i32)> {
    for kind in [EntityKind::Node, EntityKind::Way, EntityKind::Relation] {
        let class: Vec<&EntityRef> = refs.iter().filter(|r| r.kind == kind).collect();
        if class.is_empty() {
            continue;
        }

        let mut lat_sum = 0i64;
        let mut lon_sum = 0i64;
        let mut n = 0i64;
        for r in &class {
            if let Some((lat, lon)) = resolve_single(r, nodes, ways, routes, rng) {
                lat_sum += lat as i64;
                lon_sum += lon as i64;
                n += 1;
            }
        }
        if n > 0 {
            return Some(((lat_sum / n) as i32, (lon_sum / n) as i32));
        }
        return None;
    }
    None
}

fn resolve_diagnostic(index: usize, diag: &Diagnostic, nodes: &NodesX, ways: &WaysX, routes: &RouteRelsX) -> ErrorLogX {
    let mut rng = StdRng::seed_from_u64(index as u64);

    let coord = match diag.refs.len() {
        0 => None,
        1 => resolve_single(&diag.refs[0], nodes, ways, routes, &mut rng),
        _ => resolve_multiple(&diag.refs, nodes, ways, routes, &mut rng),
    };
    let (lat, lon) = coord.unwrap_or((NO_LATLONG, NO_LATLONG));

    ErrorLogX {
        offset: diag.log_offset,
        length: diag.log_len,
        lat,
        lon,
    }
}

/// Resolve every diagnostic to a coordinate, then sort the geographic ones
/// into bin order with the unresolvable ones trailing (`spec.md` §4.J).
pub fn build_error_log(diags: &[Diagnostic], nodes: &NodesX, ways: &WaysX, routes: &RouteRelsX) -> (BinGrid, Vec<ErrorLogX>) {
    let mut entries: Vec<ErrorLogX> = diags.iter().enumerate().map(|(i, d)| resolve_diagnostic(i, d, nodes, ways, routes)).collect();

    let coords: Vec<(i32, i32)> = entries.iter().filter(|e| e.is_geographic()).map(|e| (e.lat, e.lon)).collect();
    let grid = BinGrid::compute(&coords);

    entries.sort_by_key(|e| if e.is_geographic() { (0u8, grid.bin_of(e.lat, e.lon)) } else { (1u8, 0) });

    (grid, entries)
}

/// Write the `<prefix>-fixme.mem` companion file: header, prefix-sum bin
/// index over the geographic entries, then the `ErrorLogX` records
/// themselves (geographic first, non-geographic trailing).
pub fn write_error_log(path: &Path, grid: &BinGrid, entries: &[ErrorLogX]) -> Result<()> {
    let mut w = BufferedWriter::create(path).map_err(|e| CoreError::io(path, e))?;

    let geographic = entries.iter().filter(|e| e.is_geographic()).count() as u32;

    let mut header = Vec::with_capacity(24);
    header.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    header.extend_from_slice(&geographic.to_le_bytes());
    header.extend_from_slice(&grid.latbins.to_le_bytes());
    header.extend_from_slice(&grid.lonbins.to_le_bytes());
    header.extend_from_slice(&grid.latzero.to_le_bytes());
    header.extend_from_slice(&grid.lonzero.to_le_bytes());
    w.write_record(&header).map_err(|e| CoreError::io(path, e))?;

    let bins: Vec<u32> = entries.iter().filter(|e| e.is_geographic()).map(|e| grid.bin_of(e.lat, e.lon)).collect();
    let mut counts = vec![0u32; grid.total_bins()];
    for &b in &bins {
        counts[b as usize] += 1;
    }
    let mut offset = 0u32;
    for c in &counts {
        w.write_record(&offset.to_le_bytes()).map_err(|e| CoreError::io(path, e))?;
        offset += c;
    }
    w.write_record(&offset.to_le_bytes()).map_err(|e| CoreError::io(path, e))?;

    for e in entries {
        let mut rec = [0u8; 20];
        rec[0..8].copy_from_slice(&e.offset.to_le_bytes());
        rec[8..12].copy_from_slice(&e.length.to_le_bytes());
        rec[12..16].copy_from_slice(&e.lat.to_le_bytes());
        rec[16..20].copy_from_slice(&e.lon.to_le_bytes());
        w.write_record(&rec).map_err(|e| CoreError::io(path, e))?;
    }

    w.flush().map_err(|e| CoreError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::Severity;
    use crate::model::{transports, Way};

    fn node(id: u64, lat: i32, lon: i32) -> crate::model::NodeX {
        crate::model::NodeX { id, allow: transports::ALL_VEHICLES, flags: 0, lat, lon }
    }

    fn way() -> Way {
        Way {
            name: 0,
            highway_type: 1,
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

    #[test]
    fn single_node_ref_resolves_to_its_own_coordinate() {
        let mut nodes = NodesX::new();
        nodes.append(node(1, 100, 200)).unwrap();
        nodes.sort();
        let ways = WaysX::new();
        let routes = RouteRelsX::new();

        let diag = Diagnostic {
            severity: Severity::Warning,
            refs: vec![EntityRef { kind: EntityKind::Node, id: 1 }],
            message: "test".into(),
            log_offset: 0,
            log_len: 5,
        };

        let entry = resolve_diagnostic(0, &diag, &nodes, &ways, &routes);
        assert_eq!((entry.lat, entry.lon), (100, 200));
    }

    #[test]
    fn way_ref_resolves_to_a_midpoint_of_two_of_its_nodes() {
        let mut nodes = NodesX::new();
        nodes.append(node(1, 0, 0)).unwrap();
        nodes.append(node(2, 100, 100)).unwrap();
        nodes.sort();

        let mut ways = WaysX::new();
        let mut log = crate::log::DiagnosticLog::create(&tempfile::tempdir().unwrap().path().join("log.txt")).unwrap();
        ways.append(7, way(), vec![1, 2], "Test Way".into()).unwrap();
        ways.sort(&mut log);
        let routes = RouteRelsX::new();

        let diag = Diagnostic {
            severity: Severity::Warning,
            refs: vec![EntityRef { kind: EntityKind::Way, id: 7 }],
            message: "test".into(),
            log_offset: 0,
            log_len: 5,
        };

        let entry = resolve_diagnostic(0, &diag, &nodes, &ways, &routes);
        assert_eq!((entry.lat, entry.lon), (50, 50));
    }

    #[test]
    fn unresolvable_ref_gets_no_latlong() {
        let nodes = NodesX::new();
        let ways = WaysX::new();
        let routes = RouteRelsX::new();

        let diag = Diagnostic {
            severity: Severity::Warning,
            refs: vec![EntityRef { kind: EntityKind::Node, id: 999 }],
            message: "missing node".into(),
            log_offset: 0,
            log_len: 5,
        };

        let entry = resolve_diagnostic(0, &diag, &nodes, &ways, &routes);
        assert_eq!(entry.lat, NO_LATLONG);
        assert_eq!(entry.lon, NO_LATLONG);
    }

    #[test]
    fn build_error_log_sorts_geographic_entries_before_trailing_unresolved() {
        let mut nodes = NodesX::new();
        nodes.append(node(1, 500_000, 500_000)).unwrap();
        nodes.sort();
        let ways = WaysX::new();
        let routes = RouteRelsX::new();

        let diags = vec![
            Diagnostic {
                severity: Severity::Warning,
                refs: vec![EntityRef { kind: EntityKind::Node, id: 999 }],
                message: "unresolvable".into(),
                log_offset: 0,
                log_len: 5,
            },
            Diagnostic {
                severity: Severity::Warning,
                refs: vec![EntityRef { kind: EntityKind::Node, id: 1 }],
                message: "resolvable".into(),
                log_offset: 5,
                log_len: 5,
            },
        ];

        let (_grid, entries) = build_error_log(&diags, &nodes, &ways, &routes);
        assert!(entries[0].is_geographic());
        assert!(!entries[1].is_geographic());
    }
}
