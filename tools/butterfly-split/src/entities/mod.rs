//! Extended entity stores (`spec.md` §4.D): append-only staging of parsed
//! nodes/ways/relations, external sort, and ID→index lookup.
//!
//! Each store keeps its working set in memory rather than behind the
//! fat/slim split used for the final segment/node graph (`io::store`):
//! `NodesX`/`WaysX`/`RelationsX` only exist for the duration of one pipeline
//! run and the parsed extract has already been filtered down to whatever
//! fits the configured `sort_ram`, so the constraint this component exists
//! to manage (RAM smaller than the dataset) is the same one `sort::`
//! already solves — `Sort()` spills through `sort::filesort_fixed`/`vary`
//! exactly as `spec.md` describes, the rest of the store is a thin `Vec`
//! wrapper around it.

pub mod nodesx;
pub mod relationsx;
pub mod segmentsx;
pub mod waysx;

pub use nodesx::NodesX;
pub use relationsx::{RouteRelsX, TurnRelsX};
pub use segmentsx::SegmentsX;
pub use waysx::WaysX;

/// Binary search `ids` (assumed sorted ascending) for `id`, returning its
/// index or `None`. Shared by every store's `Index()`.
pub(crate) fn binary_search_id(ids: &[u64], id: u64) -> Option<u32> {
    ids.binary_search(&id).ok().map(|i| i as u32)
}
