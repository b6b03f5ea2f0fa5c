//! Dual-mode (fat/slim) fixed-record accessor (`spec.md` §4.A, §4.D).
//!
//! Fat mode memory-maps the whole file; slim mode goes through the
//! direct-mapped [`SlimCache`]. Per `spec.md` §9 ("Pointer-return-then-put
//! back idiom"): `lookup`/`put_back` replace the C code's raw pointer into
//! the mmap or cache slot with an owned copy plus an explicit write-back —
//! a `&mut` with manual commit is equivalent in this single-threaded
//! pipeline, and it sidesteps unsafe aliasing between the mmap and Rust's
//! borrow rules entirely.

use super::cache::{RecordIo, SlimCache};
use memmap2::{Mmap, MmapMut};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// A record type with a fixed, known-at-runtime encoded size.
pub trait FixedRecord: Copy {
    const SIZE: usize;
    fn encode(&self, out: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

pub enum RecordStore {
    /// Whole file held in memory (mmap in a true low-level build; here a
    /// read-write memory map via `memmap2`, matching the donor family's use
    /// of that crate for this exact purpose).
    Fat { mmap: MmapMut },
    Slim { file: File, cache: SlimCache },
}

impl RecordStore {
    pub fn open_fat(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(RecordStore::Fat { mmap })
    }

    pub fn open_slim(path: &Path, record_size: usize) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let cache = SlimCache::new(record_size, 0);
        Ok(RecordStore::Slim { file, cache })
    }

    pub fn lookup<T: FixedRecord>(&mut self, index: u32) -> io::Result<T> {
        match self {
            RecordStore::Fat { mmap } => {
                let start = index as usize * T::SIZE;
                Ok(T::decode(&mmap[start..start + T::SIZE]))
            }
            RecordStore::Slim { file, cache } => {
                let buf = cache.fetch(index, file)?;
                Ok(T::decode(buf))
            }
        }
    }

    /// Write `value` back at `index`. In fat mode this writes straight into
    /// the mapped region; in slim mode it goes through the cache's
    /// write-through path.
    pub fn put_back<T: FixedRecord>(&mut self, index: u32, value: &T) -> io::Result<()> {
        let mut buf = vec![0u8; T::SIZE];
        value.encode(&mut buf);
        match self {
            RecordStore::Fat { mmap } => {
                let start = index as usize * T::SIZE;
                mmap[start..start + T::SIZE].copy_from_slice(&buf);
                Ok(())
            }
            RecordStore::Slim { file, cache } => cache.replace(index, &buf, file),
        }
    }

    pub fn invalidate(&mut self) {
        if let RecordStore::Slim { cache, .. } = self {
            cache.invalidate();
        }
    }
}

/// Read-only fat view, used for stores that are only ever consulted (e.g.
/// `WaysX`/`SegmentsX` while mutating `NodesX`).
pub struct ReadOnlyFat {
    mmap: Mmap,
}

impl ReadOnlyFat {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(ReadOnlyFat { mmap })
    }

    pub fn lookup<T: FixedRecord>(&self, index: u32) -> T {
        let start = index as usize * T::SIZE;
        T::decode(&self.mmap[start..start + T::SIZE])
    }
}
