//! Fixed-size inode records and the inode table.

use crate::backing_store::BackingStore;
use crate::error::{Error, Result};
use crate::layout::Layout;

/// Number of direct block pointers an inode holds. No indirect blocks.
pub const BLOCK_POINTERS: usize = 12;

/// Inode 0 is reserved for the root directory.
pub const ROOT_INODE: u32 = 0;

/// An in-memory view of one inode record.
///
/// File-type is deliberately absent here: it lives in the parent directory's
/// dentry instead, trading one lookup indirection for a smaller inode
/// record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    /// Number of bytes currently occupied by the file or directory.
    pub file_size: u16,
    /// Direct data block pointers; `0` means "no block assigned" (data
    /// block 0 is reserved for the root directory and never appears as a
    /// non-root pointer, so `0` doubles as a safe sentinel).
    pub block_pointers: [u16; BLOCK_POINTERS],
    /// Whether this inode is currently allocated to a file or directory.
    pub is_used: bool,
}

impl Default for Inode {
    fn default() -> Self {
        Self {
            file_size: 0,
            block_pointers: [0; BLOCK_POINTERS],
            is_used: false,
        }
    }
}

impl Inode {
    /// Byte size of one encoded inode record: `u16 + [u16; 12] + u8`.
    pub const SIZE: u64 = 2 + 2 * BLOCK_POINTERS as u64 + 1;

    /// Encodes the inode into its bit-exact on-disk form.
    pub fn encode(&self) -> [u8; Self::SIZE as usize] {
        let mut buf = [0u8; Self::SIZE as usize];
        buf[0..2].copy_from_slice(&self.file_size.to_le_bytes());
        for (i, ptr) in self.block_pointers.iter().enumerate() {
            let off = 2 + i * 2;
            buf[off..off + 2].copy_from_slice(&ptr.to_le_bytes());
        }
        buf[26] = self.is_used as u8;
        buf
    }

    /// Decodes an inode from its on-disk representation.
    pub fn decode(bytes: &[u8]) -> Self {
        let file_size = u16::from_le_bytes(bytes[0..2].try_into().unwrap());
        let mut block_pointers = [0u16; BLOCK_POINTERS];
        for (i, ptr) in block_pointers.iter_mut().enumerate() {
            let off = 2 + i * 2;
            *ptr = u16::from_le_bytes(bytes[off..off + 2].try_into().unwrap());
        }
        let is_used = bytes[26] != 0;
        Self {
            file_size,
            block_pointers,
            is_used,
        }
    }

    /// Returns the non-zero block pointers, in slot order.
    pub fn used_blocks(&self) -> impl Iterator<Item = u16> + '_ {
        self.block_pointers.iter().copied().filter(|&b| b != 0)
    }
}

/// Reads inode number `n`.
pub fn read(store: &mut dyn BackingStore, layout: &Layout, n: u32) -> Result<Inode> {
    let bytes = store.read(layout.inode_offset(n), Inode::SIZE as usize)?;
    Ok(Inode::decode(&bytes))
}

/// Writes inode number `n`.
pub fn write(store: &mut dyn BackingStore, layout: &Layout, n: u32, inode: &Inode) -> Result<()> {
    store.write(layout.inode_offset(n), &inode.encode())?;
    Ok(())
}

/// Finds the first free inode, starting the scan at index 1 (index 0 is the
/// reserved root directory). Returns `None` if the table is full.
pub fn find_free(store: &mut dyn BackingStore, layout: &Layout) -> Result<Option<u32>> {
    for n in 1..layout.inode_count {
        if !read(store, layout, n)?.is_used {
            return Ok(Some(n));
        }
    }
    Ok(None)
}

/// Releases inode `n`: clears `is_used` and zeroes its block pointers.
///
/// The caller must have already freed the data blocks the inode owned.
pub fn free(store: &mut dyn BackingStore, layout: &Layout, n: u32) -> Result<()> {
    let inode = Inode::default();
    write(store, layout, n, &inode)
}

/// Allocates the first free inode and marks it used, without touching its
/// contents otherwise. Returns `Error::NoFreeInodes` if the table is full.
pub fn allocate(store: &mut dyn BackingStore, layout: &Layout, inode: &Inode) -> Result<u32> {
    let n = find_free(store, layout)?.ok_or(Error::NoFreeInodes)?;
    write(store, layout, n, inode)?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing_store::MemBackingStore;
    use crate::layout::Superblock;

    fn fresh_layout(store: &mut MemBackingStore) -> Layout {
        let sb = Superblock::defaults();
        let layout = Layout::new(&sb);
        store.truncate(sb.total_size as u64).unwrap();
        layout
    }

    #[test]
    fn inode_round_trips() {
        let mut inode = Inode::default();
        inode.file_size = 42;
        inode.block_pointers[3] = 7;
        inode.is_used = true;
        assert_eq!(Inode::decode(&inode.encode()), inode);
    }

    #[test]
    fn find_free_skips_root_and_used() {
        let mut store = MemBackingStore::new();
        let layout = fresh_layout(&mut store);

        let mut root = Inode::default();
        root.is_used = true;
        write(&mut store, &layout, ROOT_INODE, &root).unwrap();

        assert_eq!(find_free(&mut store, &layout).unwrap(), Some(1));

        let mut one = Inode::default();
        one.is_used = true;
        write(&mut store, &layout, 1, &one).unwrap();

        assert_eq!(find_free(&mut store, &layout).unwrap(), Some(2));
    }

    #[test]
    fn free_clears_usage_and_pointers() {
        let mut store = MemBackingStore::new();
        let layout = fresh_layout(&mut store);

        let mut inode = Inode::default();
        inode.is_used = true;
        inode.block_pointers[0] = 5;
        write(&mut store, &layout, 1, &inode).unwrap();

        free(&mut store, &layout, 1).unwrap();

        let reread = read(&mut store, &layout, 1).unwrap();
        assert!(!reread.is_used);
        assert_eq!(reread.block_pointers, [0; BLOCK_POINTERS]);
    }

    #[test]
    fn no_free_inodes_once_table_exhausted() {
        let mut store = MemBackingStore::new();
        let layout = fresh_layout(&mut store);

        for n in 0..layout.inode_count {
            let mut used = Inode::default();
            used.is_used = true;
            write(&mut store, &layout, n, &used).unwrap();
        }

        assert_eq!(find_free(&mut store, &layout).unwrap(), None);
        assert!(matches!(
            allocate(&mut store, &layout, &Inode::default()),
            Err(Error::NoFreeInodes)
        ));
    }
}
