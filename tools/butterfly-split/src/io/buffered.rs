//! Block-buffered sequential file I/O (`spec.md` §4.A).
//!
//! A thin wrapper over `std::fs::File` used wherever a phase streams
//! records in or out rather than doing positional access. Seeking flushes
//! the write buffer first, matching the original's `SeekFileBuffered`
//! contract.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Default buffer size, chosen to be a multiple of common filesystem block
/// sizes (`spec.md` §4.A: "4 KiB-order").
pub const BUFFER_SIZE: usize = 64 * 1024;

pub struct BufferedWriter {
    inner: BufWriter<File>,
}

impl BufferedWriter {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(BufferedWriter {
            inner: BufWriter::with_capacity(BUFFER_SIZE, file),
        })
    }

    pub fn append(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().append(true).open(path)?;
        Ok(BufferedWriter {
            inner: BufWriter::with_capacity(BUFFER_SIZE, file),
        })
    }

    pub fn write_record(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn into_file(mut self) -> io::Result<File> {
        self.inner.flush()?;
        Ok(self.inner.into_inner().map_err(|e| e.into_error())?)
    }
}

pub struct BufferedReader {
    inner: BufReader<File>,
}

impl BufferedReader {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(BufferedReader {
            inner: BufReader::with_capacity(BUFFER_SIZE, file),
        })
    }

    /// Read exactly `buf.len()` bytes, returning `Ok(false)` at a clean EOF
    /// (zero bytes read) and `Ok(true)` otherwise, matching the original's
    /// `ReadFileBuffered` "did we hit EOF" return convention.
    pub fn read_record(&mut self, buf: &mut [u8]) -> io::Result<bool> {
        match self.inner.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Seeking flushes implicitly because reads go through a fresh
    /// `BufReader` buffer invalidation on `seek`.
    pub fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn round_trip() {
        let tmp = NamedTempFile::new().unwrap();
        let mut w = BufferedWriter::create(tmp.path()).unwrap();
        w.write_record(&42u32.to_le_bytes()).unwrap();
        w.write_record(&7u32.to_le_bytes()).unwrap();
        w.flush().unwrap();
        drop(w);

        let mut r = BufferedReader::open(tmp.path()).unwrap();
        let mut buf = [0u8; 4];
        assert!(r.read_record(&mut buf).unwrap());
        assert_eq!(u32::from_le_bytes(buf), 42);
        assert!(r.read_record(&mut buf).unwrap());
        assert_eq!(u32::from_le_bytes(buf), 7);
        assert!(!r.read_record(&mut buf).unwrap());
    }
}
