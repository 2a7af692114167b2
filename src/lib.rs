//! NanoFS: a tiny, single-image-file-backed filesystem.
//!
//! The image is laid out as four contiguous regions (superblock, inode
//! table, free-space bitmap, data region), built up by the modules below
//! from the lowest layer (raw byte I/O) to the highest (the ten user-facing
//! operations in [`fsapi`]).

pub mod backing_store;
pub mod bitmap;
pub mod dentry;
pub mod error;
pub mod fsapi;
pub mod inode;
pub mod layout;
pub mod path;

pub use backing_store::{BackingStore, FileBackingStore, MemBackingStore};
pub use error::{Error, Result};
pub use fsapi::FsApi;
