//! Temporary run files used by the external sort merge phase.

use super::unique_tmp_path;
use crate::error::{CoreError, Result};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub struct RunFile {
    pub path: PathBuf,
}

/// Sort `records` in place (stable on `compare`, ties broken by the carried
/// sequence number) and spill them to a fresh temp file as `seq:u64 ||
/// bytes` repeated. Clears `records` on return.
pub fn write_sorted_run(
    tmp_dir: &Path,
    records: &mut Vec<(Vec<u8>, u64)>,
    compare: &impl Fn(&[u8], &[u8]) -> Ordering,
) -> Result<RunFile> {
    records.sort_by(|a, b| compare(&a.0, &b.0).then_with(|| a.1.cmp(&b.1)));

    let path = unique_tmp_path(tmp_dir, "run");
    let file = File::create(&path).map_err(|e| CoreError::io(&path, e))?;
    let mut w = BufWriter::new(file);
    for (bytes, seq) in records.iter() {
        w.write_all(&seq.to_le_bytes())
            .map_err(|e| CoreError::io(&path, e))?;
        w.write_all(bytes).map_err(|e| CoreError::io(&path, e))?;
    }
    w.flush().map_err(|e| CoreError::io(&path, e))?;

    records.clear();
    Ok(RunFile { path })
}

/// Same as [`write_sorted_run`] but for variable-length records, spilled as
/// `size:u32 || seq:u64 || bytes` repeated.
pub fn write_sorted_run_vary(
    tmp_dir: &Path,
    records: &mut Vec<(Vec<u8>, u64)>,
    compare: &impl Fn(&[u8], &[u8]) -> Ordering,
) -> Result<RunFile> {
    records.sort_by(|a, b| compare(&a.0, &b.0).then_with(|| a.1.cmp(&b.1)));

    let path = unique_tmp_path(tmp_dir, "runvary");
    let file = File::create(&path).map_err(|e| CoreError::io(&path, e))?;
    let mut w = BufWriter::new(file);
    for (bytes, seq) in records.iter() {
        w.write_all(&(bytes.len() as u32).to_le_bytes())
            .map_err(|e| CoreError::io(&path, e))?;
        w.write_all(&seq.to_le_bytes())
            .map_err(|e| CoreError::io(&path, e))?;
        w.write_all(bytes).map_err(|e| CoreError::io(&path, e))?;
    }
    w.flush().map_err(|e| CoreError::io(&path, e))?;

    records.clear();
    Ok(RunFile { path })
}

pub enum RunReader {
    Fixed(BufReader<File>),
    Vary(BufReader<File>),
}

impl RunReader {
    pub fn open_fixed(path: &Path, _record_size: usize) -> std::io::Result<Self> {
        Ok(RunReader::Fixed(BufReader::new(File::open(path)?)))
    }

    pub fn open_vary(path: &Path) -> std::io::Result<Self> {
        Ok(RunReader::Vary(BufReader::new(File::open(path)?)))
    }

    pub fn next_fixed(&mut self, record_size: usize) -> Result<Option<(Vec<u8>, u64)>> {
        let r = match self {
            RunReader::Fixed(r) => r,
            RunReader::Vary(_) => unreachable!("run opened as vary read as fixed"),
        };
        let mut seq_buf = [0u8; 8];
        match r.read_exact(&mut seq_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(CoreError::io(Path::new("<run file>"), e)),
        }
        let mut bytes = vec![0u8; record_size];
        r.read_exact(&mut bytes)
            .map_err(|e| CoreError::io(Path::new("<run file>"), e))?;
        Ok(Some((bytes, u64::from_le_bytes(seq_buf))))
    }

    pub fn next_vary(&mut self) -> Result<Option<(Vec<u8>, u64)>> {
        let r = match self {
            RunReader::Vary(r) => r,
            RunReader::Fixed(_) => unreachable!("run opened as fixed read as vary"),
        };
        let mut size_buf = [0u8; 4];
        match r.read_exact(&mut size_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(CoreError::io(Path::new("<run file>"), e)),
        }
        let mut seq_buf = [0u8; 8];
        r.read_exact(&mut seq_buf)
            .map_err(|e| CoreError::io(Path::new("<run file>"), e))?;
        let size = u32::from_le_bytes(size_buf) as usize;
        let mut bytes = vec![0u8; size];
        r.read_exact(&mut bytes)
            .map_err(|e| CoreError::io(Path::new("<run file>"), e))?;
        Ok(Some((bytes, u64::from_le_bytes(seq_buf))))
    }
}
