//! The on-disk superblock and the pure offset arithmetic derived from it.
//!
//! Nothing in this module performs I/O; `Layout` is a pure function of the
//! five superblock fields, exactly as specified.

use crate::backing_store::BackingStore;
use crate::error::Result;

/// Byte size of the on-disk superblock record (§6: `u32 + u16*4`).
pub const SUPERBLOCK_SIZE: u64 = 4 + 2 + 2 + 2 + 2;

/// Offset of the superblock: always the first byte of the image.
pub const SUPERBLOCK_OFFSET: u64 = 0;

/// The default total image size in bytes (1 MiB).
pub const DEFAULT_TOTAL_SIZE: u32 = 1_048_576;
/// The default block size in bytes.
pub const DEFAULT_BLOCK_SIZE: u16 = 1024;
/// The default number of inodes: one inode per 4 KiB of image.
pub const DEFAULT_INODE_COUNT: u16 = (DEFAULT_TOTAL_SIZE / 4096) as u16;

/// The fixed-size superblock record, written once at `init` and never
/// mutated afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    /// Total size of the image in bytes.
    pub total_size: u32,
    /// Size of one data block in bytes.
    pub block_size: u16,
    /// Number of data blocks in the data region.
    pub block_count: u16,
    /// Size of one inode record in bytes.
    pub inode_size: u16,
    /// Number of inode records in the inode table.
    pub inode_count: u16,
}

impl Superblock {
    /// Builds the default superblock for a freshly `init`ed image.
    ///
    /// `block_count` is derived so that superblock + inode table + bitmap +
    /// data region fit within `total_size`: `block_count` is the largest
    /// value satisfying
    /// `total_size >= SB + inode_count*inode_size + ceil(block_count/8) + block_count*block_size`,
    /// which the specification states as
    /// `floor((total_size - SB - inode_count*inode_size) / (block_size + 1/8))`.
    pub fn defaults() -> Self {
        let total_size = DEFAULT_TOTAL_SIZE;
        let block_size = DEFAULT_BLOCK_SIZE;
        let inode_count = DEFAULT_INODE_COUNT;
        let inode_size = crate::inode::Inode::SIZE as u16;

        let numerator =
            total_size as u64 - SUPERBLOCK_SIZE - inode_count as u64 * inode_size as u64;
        // block_size + 1/8, expressed in eighths to stay in integer arithmetic.
        let denom_eighths = 8 * block_size as u64 + 1;
        let block_count = (numerator * 8) / denom_eighths;

        Self {
            total_size,
            block_size,
            block_count: block_count as u16,
            inode_size,
            inode_count,
        }
    }

    /// Encodes the superblock into its bit-exact, little-endian, 12-byte
    /// on-disk form.
    pub fn encode(&self) -> [u8; SUPERBLOCK_SIZE as usize] {
        let mut buf = [0u8; SUPERBLOCK_SIZE as usize];
        buf[0..4].copy_from_slice(&self.total_size.to_le_bytes());
        buf[4..6].copy_from_slice(&self.block_size.to_le_bytes());
        buf[6..8].copy_from_slice(&self.block_count.to_le_bytes());
        buf[8..10].copy_from_slice(&self.inode_size.to_le_bytes());
        buf[10..12].copy_from_slice(&self.inode_count.to_le_bytes());
        buf
    }

    /// Decodes a superblock from its on-disk representation.
    pub fn decode(bytes: &[u8]) -> Self {
        Self {
            total_size: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            block_size: u16::from_le_bytes(bytes[4..6].try_into().unwrap()),
            block_count: u16::from_le_bytes(bytes[6..8].try_into().unwrap()),
            inode_size: u16::from_le_bytes(bytes[8..10].try_into().unwrap()),
            inode_count: u16::from_le_bytes(bytes[10..12].try_into().unwrap()),
        }
    }

    /// Reads the superblock from the start of the image.
    pub fn read(store: &mut dyn BackingStore) -> Result<Self> {
        let bytes = store.read(SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE as usize)?;
        Ok(Self::decode(&bytes))
    }

    /// Writes the superblock to the start of the image.
    pub fn write(&self, store: &mut dyn BackingStore) -> Result<()> {
        store.write(SUPERBLOCK_OFFSET, &self.encode())?;
        Ok(())
    }
}

/// Fixed region offsets derived from a superblock. Pure arithmetic, no I/O.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    /// Offset of the first byte of the inode table.
    pub inode_table_off: u64,
    /// Offset of the first byte of the free-space bitmap.
    pub bitmap_off: u64,
    /// Offset of the first byte of the data region.
    pub data_off: u64,
    /// Size of one inode record, in bytes.
    pub inode_size: u64,
    /// Size of one data block, in bytes.
    pub block_size: u64,
    /// Number of inodes in the inode table.
    pub inode_count: u32,
    /// Number of data blocks in the data region.
    pub block_count: u32,
}

impl Layout {
    /// Computes the fixed region offsets for the given superblock.
    pub fn new(sb: &Superblock) -> Self {
        let inode_table_off = SUPERBLOCK_SIZE;
        let bitmap_off =
            inode_table_off + sb.inode_count as u64 * sb.inode_size as u64;
        let bitmap_bytes = ceil_division(sb.block_count as u32, 8) as u64;
        let data_off = bitmap_off + bitmap_bytes;

        Self {
            inode_table_off,
            bitmap_off,
            data_off,
            inode_size: sb.inode_size as u64,
            block_size: sb.block_size as u64,
            inode_count: sb.inode_count as u32,
            block_count: sb.block_count as u32,
        }
    }

    /// Byte offset of inode number `k`.
    pub fn inode_offset(&self, k: u32) -> u64 {
        self.inode_table_off + k as u64 * self.inode_size
    }

    /// Byte offset of the bitmap byte covering data block `k`.
    pub fn bitmap_byte_offset(&self, k: u32) -> u64 {
        self.bitmap_off + (k / 8) as u64
    }

    /// Number of bytes needed for the whole bitmap: `ceil(block_count/8)`.
    ///
    /// This is the correct scan/allocation bound. An earlier implementation
    /// conflated this with `block_size/8`, which undercounts whenever
    /// `block_count` and `block_size` diverge; that bug is not reproduced
    /// here.
    pub fn bitmap_size(&self) -> u32 {
        ceil_division(self.block_count, 8)
    }

    /// Byte offset of data block `k`.
    pub fn data_block_offset(&self, k: u32) -> u64 {
        self.data_off + k as u64 * self.block_size
    }
}

/// Integer ceiling division.
pub fn ceil_division(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}
