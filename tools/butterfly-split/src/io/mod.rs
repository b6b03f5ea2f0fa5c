//! Buffered sequential I/O, the slim direct-mapped cache, and the fat/slim
//! dual-mode record accessor (`spec.md` §4.A).

pub mod buffered;
pub mod cache;
pub mod store;

pub use buffered::{BufferedReader, BufferedWriter};
pub use cache::SlimCache;
pub use store::{FixedRecord, ReadOnlyFat, RecordStore};
