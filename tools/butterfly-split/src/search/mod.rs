//! Priority queue and result hashmap used by every graph search in this
//! crate: super-segment construction (`super_nodes.rs`) and turn-relation
//! resolution (`relations.rs`) both run a Dijkstra-style search over
//! `SegmentX`s (`spec.md` §4.C).

pub mod queue;
pub mod results;

pub use queue::Queue;
pub use results::Results;
