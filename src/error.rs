//! The error taxonomy shared by every layer of the filesystem core.

use std::fmt;
use std::io;

/// An error produced by the filesystem core.
///
/// Variants map directly onto the taxonomy in the specification; each one
/// corresponds to a single failure trigger rather than a generic catch-all.
#[derive(Debug)]
pub enum Error {
    /// Opening the backing image for read failed before any command other
    /// than `init` ran.
    ImageMissing,
    /// A path was empty, had an empty component, or contained an illegal
    /// character (`/` or whitespace inside a component).
    InvalidPath,
    /// A path component was missing where one was required.
    NotFound,
    /// A middle path component, or a `cd` target, was not a directory.
    NotDirectory,
    /// An entry with the same name and type already exists in the parent.
    AlreadyExists,
    /// A directory would need more than 12 data blocks to grow further.
    DirectoryFull,
    /// A file write would exceed `12 * BLOCK_SIZE`.
    FileTooLarge,
    /// No free inode is left in the inode table.
    NoFreeInodes,
    /// No free data block is left in the bitmap.
    NoFreeBlocks,
    /// The backing store failed to complete a read or write.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImageMissing => write!(f, "no such image"),
            Self::InvalidPath => write!(f, "invalid path"),
            Self::NotFound => write!(f, "no such file or directory"),
            Self::NotDirectory => write!(f, "not a directory"),
            Self::AlreadyExists => write!(f, "already exists"),
            Self::DirectoryFull => write!(f, "directory cannot hold more entries"),
            Self::FileTooLarge => write!(f, "file too large"),
            Self::NoFreeInodes => write!(f, "no free inode left"),
            Self::NoFreeBlocks => write!(f, "no free data block left"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
