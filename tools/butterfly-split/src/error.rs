//! Library-level error type.
//!
//! `anyhow` is used at the CLI boundary (`bin/*.rs`); inside the library,
//! `thiserror` gives callers a typed error they can match on. Only *fatal*
//! conditions (`spec.md` §7) are represented here — data-quality problems
//! never become an `Err`, they go through [`crate::log::Diagnostic`] and the
//! offending record is dropped.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("external sort failed: {0}")]
    SortFailed(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("malformed record in {file} at offset {offset}: {reason}")]
    MalformedRecord {
        file: PathBuf,
        offset: u64,
        reason: String,
    },

    #[error("record count overflowed u32 capacity in {0}")]
    CapacityExceeded(&'static str),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }
}
