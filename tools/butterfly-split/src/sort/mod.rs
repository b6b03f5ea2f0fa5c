//! External sort for fixed and variable-length records (`spec.md` §4.B).
//!
//! Both entry points share one contract: stream records in, let `pre`
//! cheaply discard/transform each one as it's seen (sort keys included),
//! partition into RAM-sized runs, sort each run stably, merge the runs with
//! a k-way min-heap, and let `post` deduplicate/transform the merged,
//! sorted stream. Stability is explicit: every record carries a monotone
//! sequence number from the moment it's read, and every comparison falls
//! back to that number on a tie — this is the `FILESORT_PRESERVE_ORDER`
//! macro from the original, made structural instead of bolted onto whatever
//! comparator the caller supplies (`spec.md` §9 Open Question 3: "treat all
//! ties as stable").

use crate::error::{CoreError, Result};
use crate::io::{BufferedReader, BufferedWriter};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

mod heap;
mod run;

use heap::MergeHeap;

/// Sort a file of fixed-size `record_size`-byte records.
///
/// `pre(bytes, seen_index)` runs once per input record, in input order,
/// before it is placed into a run; it may mutate the record in place and
/// returns whether to keep it. `compare` orders two records. `post(bytes,
/// out_index)` runs once per record of the final merged stream, in sorted
/// order, and returns whether to keep it (used to drop duplicates, since
/// sort order puts them adjacent).
#[allow(clippy::too_many_arguments)]
pub fn filesort_fixed(
    input_path: &Path,
    output_path: &Path,
    tmp_dir: &Path,
    record_size: usize,
    ram_bytes: usize,
    threads: usize,
    mut pre: impl FnMut(&mut [u8], u64) -> bool,
    compare: impl Fn(&[u8], &[u8]) -> Ordering + Sync,
    mut post: impl FnMut(&mut [u8], u64) -> bool,
) -> Result<u64> {
    let per_record_overhead = record_size + 8; // + sequence number
    let run_capacity = (ram_bytes / per_record_overhead).max(1);

    let mut reader = BufferedReader::open(input_path).map_err(|e| CoreError::io(input_path, e))?;
    let mut runs: Vec<run::RunFile> = Vec::new();
    let mut seen: u64 = 0;
    let mut buf = vec![0u8; record_size];
    let mut current: Vec<(Vec<u8>, u64)> = Vec::with_capacity(run_capacity);

    loop {
        let got = reader
            .read_record(&mut buf)
            .map_err(|e| CoreError::io(input_path, e))?;
        if !got {
            break;
        }

        let keep = pre(&mut buf, seen);
        seen += 1;
        if keep {
            current.push((buf.clone(), seen - 1));
        }

        if current.len() >= run_capacity {
            runs.push(run::write_sorted_run(tmp_dir, &mut current, &compare)?);
        }
    }
    if !current.is_empty() {
        runs.push(run::write_sorted_run(tmp_dir, &mut current, &compare)?);
    }

    let _ = threads; // run-building parallelism is a tuning knob, not a semantic one here.

    let written = merge_runs(&runs, output_path, record_size, &compare, &mut post)?;

    for r in &runs {
        let _ = std::fs::remove_file(&r.path);
    }

    Ok(written)
}

/// Sort a file of variable-length records, each prefixed by a 32-bit size
/// word (`FILESORT_VARSIZE`). Otherwise identical contract to
/// [`filesort_fixed`].
#[allow(clippy::too_many_arguments)]
pub fn filesort_vary(
    input_path: &Path,
    output_path: &Path,
    tmp_dir: &Path,
    ram_bytes: usize,
    threads: usize,
    mut pre: impl FnMut(&mut Vec<u8>, u64) -> bool,
    compare: impl Fn(&[u8], &[u8]) -> Ordering + Sync,
    mut post: impl FnMut(&mut Vec<u8>, u64) -> bool,
) -> Result<u64> {
    let mut reader = BufferedReader::open(input_path).map_err(|e| CoreError::io(input_path, e))?;
    let mut runs: Vec<run::RunFile> = Vec::new();
    let mut seen: u64 = 0;
    let mut current: Vec<(Vec<u8>, u64)> = Vec::new();
    let mut current_bytes = 0usize;

    loop {
        let mut size_buf = [0u8; 4];
        let got = reader
            .read_record(&mut size_buf)
            .map_err(|e| CoreError::io(input_path, e))?;
        if !got {
            break;
        }
        let size = u32::from_le_bytes(size_buf) as usize;
        let mut record = vec![0u8; size];
        reader
            .read_record(&mut record)
            .map_err(|e| CoreError::io(input_path, e))?;

        let keep = pre(&mut record, seen);
        seen += 1;
        if keep {
            current_bytes += record.len() + 12;
            current.push((record, seen - 1));
        }

        if current_bytes >= ram_bytes {
            runs.push(run::write_sorted_run_vary(tmp_dir, &mut current, &compare)?);
            current_bytes = 0;
        }
    }
    if !current.is_empty() {
        runs.push(run::write_sorted_run_vary(tmp_dir, &mut current, &compare)?);
    }

    let _ = threads;

    let written = merge_runs_vary(&runs, output_path, &compare, &mut post)?;

    for r in &runs {
        let _ = std::fs::remove_file(&r.path);
    }

    Ok(written)
}

fn merge_runs(
    runs: &[run::RunFile],
    output_path: &Path,
    record_size: usize,
    compare: &(impl Fn(&[u8], &[u8]) -> Ordering + Sync),
    post: &mut impl FnMut(&mut [u8], u64) -> bool,
) -> Result<u64> {
    let mut writer =
        BufferedWriter::create(output_path).map_err(|e| CoreError::io(output_path, e))?;
    let mut readers: Vec<run::RunReader> = runs
        .iter()
        .map(|r| run::RunReader::open_fixed(&r.path, record_size))
        .collect::<std::io::Result<_>>()
        .map_err(|e| CoreError::io(output_path, e))?;

    let mut heap = MergeHeap::new(compare);
    for (i, r) in readers.iter_mut().enumerate() {
        if let Some((bytes, seq)) = r.next_fixed(record_size)? {
            heap.push(bytes, seq, i);
        }
    }

    let mut out_index = 0u64;
    while let Some((mut bytes, _seq, run_id)) = heap.pop() {
        if let Some((nbytes, nseq)) = readers[run_id].next_fixed(record_size)? {
            heap.push(nbytes, nseq, run_id);
        }
        if post(&mut bytes, out_index) {
            writer
                .write_record(&bytes)
                .map_err(|e| CoreError::io(output_path, e))?;
            out_index += 1;
        }
    }

    writer.flush().map_err(|e| CoreError::io(output_path, e))?;
    Ok(out_index)
}

fn merge_runs_vary(
    runs: &[run::RunFile],
    output_path: &Path,
    compare: &(impl Fn(&[u8], &[u8]) -> Ordering + Sync),
    post: &mut impl FnMut(&mut Vec<u8>, u64) -> bool,
) -> Result<u64> {
    let mut writer =
        BufferedWriter::create(output_path).map_err(|e| CoreError::io(output_path, e))?;
    let mut readers: Vec<run::RunReader> = runs
        .iter()
        .map(|r| run::RunReader::open_vary(&r.path))
        .collect::<std::io::Result<_>>()
        .map_err(|e| CoreError::io(output_path, e))?;

    let mut heap = MergeHeap::new(compare);
    for (i, r) in readers.iter_mut().enumerate() {
        if let Some((bytes, seq)) = r.next_vary()? {
            heap.push(bytes, seq, i);
        }
    }

    let mut out_index = 0u64;
    while let Some((mut bytes, _seq, run_id)) = heap.pop() {
        if let Some((nbytes, nseq)) = readers[run_id].next_vary()? {
            heap.push(nbytes, nseq, run_id);
        }
        if post(&mut bytes, out_index) {
            writer
                .write_record(&(bytes.len() as u32).to_le_bytes())
                .map_err(|e| CoreError::io(output_path, e))?;
            writer
                .write_record(&bytes)
                .map_err(|e| CoreError::io(output_path, e))?;
            out_index += 1;
        }
    }

    writer.flush().map_err(|e| CoreError::io(output_path, e))?;
    Ok(out_index)
}

pub(crate) fn unique_tmp_path(tmp_dir: &Path, label: &str) -> PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    tmp_dir.join(format!("{label}.{}.{}.tmp", std::process::id(), n))
}
