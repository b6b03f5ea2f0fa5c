//! Structured diagnostics (`spec.md` §7).
//!
//! Replaces the original's variadic `logerror(format, ...)` with a typed
//! record carrying the entity kind, its *original* OSM id (see
//! `OriginalIdLookup` — ids are overwritten with sorted indexes partway
//! through the pipeline, but diagnostics must still name the entity the way
//! a human who wrote the `.osm` file would recognize it), a message
//! template and its arguments. Diagnostics are `tracing`-emitted and,
//! optionally, appended to a binary side-channel that `butterfly-fixme`
//! consumes (`spec.md` §4.J).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Way,
    Relation,
}

#[derive(Clone, Debug)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    DataQuality,
    Fatal,
}

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub refs: Vec<EntityRef>,
    pub message: String,
    /// Byte offset into the free-text log this diagnostic was written at;
    /// used by `butterfly-fixme` to recover the full message later.
    pub log_offset: u64,
    pub log_len: u32,
}

/// Sink that every phase logs data-quality and warning diagnostics through.
/// Writes a human-readable line to a text log and, if `binary` is enabled,
/// appends a compact binary record consumed by the fixme pipeline.
pub struct DiagnosticLog {
    text: BufWriter<File>,
    text_offset: u64,
    count_dataquality: u64,
    count_warning: u64,
    /// Every diagnostic recorded so far, kept so `Pipeline::write_fixme_log`
    /// can re-index them once the entity stores are sorted — the binary
    /// side-channel the original writes incrementally, held in memory
    /// instead since one pipeline run's diagnostics already fit comfortably
    /// alongside the entity stores they reference.
    recorded: Vec<Diagnostic>,
}

impl DiagnosticLog {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(DiagnosticLog {
            text: BufWriter::new(file),
            text_offset: 0,
            count_dataquality: 0,
            count_warning: 0,
            recorded: Vec::new(),
        })
    }

    pub fn record(&mut self, refs: &[EntityRef], severity: Severity, message: impl Into<String>) -> Diagnostic {
        let message = message.into();
        let line = format!("{}\n", render_line(refs, severity, &message));
        let offset = self.text_offset;
        let _ = self.text.write_all(line.as_bytes());
        self.text_offset += line.len() as u64;

        match severity {
            Severity::Warning => {
                self.count_warning += 1;
                tracing::warn!(target: "butterfly_split::diagnostics", "{}", line.trim_end());
            }
            Severity::DataQuality => {
                self.count_dataquality += 1;
                tracing::warn!(target: "butterfly_split::diagnostics", "{}", line.trim_end());
            }
            Severity::Fatal => {
                tracing::error!(target: "butterfly_split::diagnostics", "{}", line.trim_end());
            }
        }

        let diagnostic = Diagnostic {
            severity,
            refs: refs.to_vec(),
            message,
            log_offset: offset,
            log_len: line.len() as u32,
        };
        self.recorded.push(diagnostic.clone());
        diagnostic
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.recorded
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.text.flush()
    }

    pub fn counts(&self) -> (u64, u64) {
        (self.count_dataquality, self.count_warning)
    }
}

fn render_line(refs: &[EntityRef], severity: Severity, message: &str) -> String {
    let mut parts = Vec::new();
    for r in refs {
        let kind = match r.kind {
            EntityKind::Node => "node",
            EntityKind::Way => "way",
            EntityKind::Relation => "relation",
        };
        parts.push(format!("{kind}={}", r.id));
    }
    let tag = match severity {
        Severity::Warning => "WARN",
        Severity::DataQuality => "DATA",
        Severity::Fatal => "FATAL",
    };
    format!("[{tag}] {} {}", parts.join(" "), message)
}

/// Maps a store's *current* index back to the original OSM id, so
/// diagnostics stay meaningful after `SortNodeList`/`SortWayList` overwrite
/// `id` with a sorted position (`spec.md` §4.D, §G.2 in `SPEC_FULL.md`).
#[derive(Default)]
pub struct OriginalIdLookup {
    pub node_ids: Vec<u64>,
    pub way_ids: Vec<u64>,
    pub relation_ids: Vec<u64>,
}

impl OriginalIdLookup {
    pub fn node(&self, index: u32) -> EntityRef {
        EntityRef {
            kind: EntityKind::Node,
            id: self.node_ids.get(index as usize).copied().unwrap_or(index as u64),
        }
    }

    pub fn way(&self, index: u32) -> EntityRef {
        EntityRef {
            kind: EntityKind::Way,
            id: self.way_ids.get(index as usize).copied().unwrap_or(index as u64),
        }
    }

    pub fn relation_raw(&self, id: u64) -> EntityRef {
        EntityRef {
            kind: EntityKind::Relation,
            id,
        }
    }
}

/// Path for the companion text log, given the configured output directory.
pub fn default_log_path(dir: &Path, prefix: &str) -> PathBuf {
    dir.join(format!("{prefix}.errorlog"))
}
