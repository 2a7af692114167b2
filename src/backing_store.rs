//! The `BackingStore` seam: raw byte I/O at fixed offsets.
//!
//! The specification declares this contract an external collaborator, not
//! part of the filesystem core. The core never opens a host file itself; it
//! only ever talks to a `&mut dyn BackingStore`. `FileBackingStore` is the
//! thin adapter the shell binary uses to drive a real image file;
//! `MemBackingStore` is a second, in-memory implementation used by tests so
//! the core's invariants can be checked without touching disk.

use std::fs::File;
use std::io;
use std::io::{Read, Seek, SeekFrom, Write};

/// Byte-addressable storage for the whole filesystem image.
pub trait BackingStore {
    /// Reads exactly `len` bytes starting at byte offset `off`.
    fn read(&mut self, off: u64, len: usize) -> io::Result<Vec<u8>>;

    /// Writes `bytes` starting at byte offset `off`.
    fn write(&mut self, off: u64, bytes: &[u8]) -> io::Result<()>;

    /// Truncates (or extends with zeroes) the store to exactly `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

/// A `BackingStore` backed by a host file, opened once and kept for the
/// lifetime of the mounted filesystem.
pub struct FileBackingStore {
    file: File,
}

impl FileBackingStore {
    /// Wraps an already-open file.
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

impl BackingStore for FileBackingStore {
    fn read(&mut self, off: u64, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.file.seek(SeekFrom::Start(off))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write(&mut self, off: u64, bytes: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(off))?;
        self.file.write_all(bytes)?;
        self.file.flush()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }
}

/// A `BackingStore` backed by a plain in-memory buffer.
///
/// Used by the test suite so property checks run without creating files on
/// disk.
#[derive(Default)]
pub struct MemBackingStore {
    data: Vec<u8>,
}

impl MemBackingStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackingStore for MemBackingStore {
    fn read(&mut self, off: u64, len: usize) -> io::Result<Vec<u8>> {
        let off = off as usize;
        if off + len > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read past end of image",
            ));
        }
        Ok(self.data[off..off + len].to_vec())
    }

    fn write(&mut self, off: u64, bytes: &[u8]) -> io::Result<()> {
        let off = off as usize;
        let end = off + bytes.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[off..end].copy_from_slice(bytes);
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.data.resize(len as usize, 0);
        Ok(())
    }
}
