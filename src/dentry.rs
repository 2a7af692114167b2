//! Directory entries and the operations that read, append to, and remove
//! from a directory's flat entry array.

use crate::backing_store::BackingStore;
use crate::bitmap;
use crate::error::{Error, Result};
use crate::inode::{self, Inode, BLOCK_POINTERS};
use crate::layout::Layout;

/// Maximum number of data blocks a directory may span.
pub const MAX_DIR_BLOCKS: usize = BLOCK_POINTERS;

/// Capacity of a dentry's `name` field, including the mandatory trailing
/// NUL (so usable filename length is `NAME_CAPACITY - 1`).
pub const NAME_CAPACITY: usize = 253;

/// The type recorded for a directory entry. Stored in the dentry, not the
/// inode, since several entries could in principle point at one inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
}

impl FileType {
    fn to_u8(self) -> u8 {
        match self {
            Self::File => 0,
            Self::Directory => 1,
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::File),
            1 => Some(Self::Directory),
            _ => None,
        }
    }
}

/// A single directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dentry {
    pub inode_number: u32,
    pub file_type: FileType,
    pub name: String,
}

impl Dentry {
    /// Byte size of one encoded dentry: `u16 + u8 + [u8; 253]`.
    pub const SIZE: u64 = 2 + 1 + NAME_CAPACITY as u64;

    /// Encodes the dentry into its bit-exact on-disk form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE as usize];
        buf[0..2].copy_from_slice(&(self.inode_number as u16).to_le_bytes());
        buf[2] = self.file_type.to_u8();
        let name_bytes = self.name.as_bytes();
        // Validated at creation time to fit within NAME_CAPACITY - 1.
        buf[3..3 + name_bytes.len()].copy_from_slice(name_bytes);
        buf
    }

    /// Decodes a dentry from its on-disk representation.
    pub fn decode(bytes: &[u8]) -> Self {
        let inode_number = u16::from_le_bytes(bytes[0..2].try_into().unwrap()) as u32;
        let file_type = FileType::from_u8(bytes[2]).unwrap_or(FileType::File);
        let name_bytes = &bytes[3..3 + NAME_CAPACITY];
        let nul = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        let name = String::from_utf8_lossy(&name_bytes[..nul]).into_owned();
        Self {
            inode_number,
            file_type,
            name,
        }
    }
}

/// Number of dentries that fit in one data block.
pub fn dentries_per_block(layout: &Layout) -> u32 {
    (layout.block_size / Dentry::SIZE) as u32
}

/// Number of entries currently stored in a directory.
pub fn count(inode: &Inode) -> u32 {
    inode.file_size as u32 / Dentry::SIZE as u32
}

/// Reads every entry of a directory, in stored (not necessarily insertion)
/// order.
pub fn read_all(store: &mut dyn BackingStore, layout: &Layout, inode: &Inode) -> Result<Vec<Dentry>> {
    let dpb = dentries_per_block(layout);
    let total = count(inode);
    let mut entries = Vec::with_capacity(total as usize);

    let mut remaining = total;
    for &block in inode.block_pointers.iter() {
        if remaining == 0 {
            break;
        }
        let in_this_block = remaining.min(dpb);
        let block_bytes = store.read(
            layout.data_block_offset(block as u32),
            (in_this_block as u64 * Dentry::SIZE) as usize,
        )?;
        for i in 0..in_this_block {
            let off = (i as u64 * Dentry::SIZE) as usize;
            entries.push(Dentry::decode(&block_bytes[off..off + Dentry::SIZE as usize]));
        }
        remaining -= in_this_block;
    }
    Ok(entries)
}

/// Finds the index of the entry matching `name` and `expected_type` exactly.
pub fn find_by_name(
    store: &mut dyn BackingStore,
    layout: &Layout,
    inode: &Inode,
    name: &str,
    expected_type: FileType,
) -> Result<Option<usize>> {
    let entries = read_all(store, layout, inode)?;
    Ok(entries
        .iter()
        .position(|d| d.name == name && d.file_type == expected_type))
}

/// Appends `dentry` to the directory described by inode `dir_ino`,
/// allocating a fresh data block when the current last block is full.
///
/// On any failure past a block allocation, the freshly allocated block is
/// released before returning, so no block is ever leaked.
pub fn append(
    store: &mut dyn BackingStore,
    layout: &Layout,
    dir_ino: u32,
    dentry: &Dentry,
) -> Result<()> {
    let mut dir_inode = inode::read(store, layout, dir_ino)?;
    let dpb = dentries_per_block(layout);
    let n = count(&dir_inode);

    let mut allocated_block = None;
    if n % dpb == 0 {
        let block_slot = (n / dpb) as usize;
        if block_slot >= MAX_DIR_BLOCKS {
            return Err(Error::DirectoryFull);
        }
        let block = bitmap::find_free(store, layout)?.ok_or(Error::NoFreeBlocks)?;
        bitmap::set(store, layout, block, true)?;
        dir_inode.block_pointers[block_slot] = block as u16;
        allocated_block = Some(block);
    }

    let result = (|| -> Result<()> {
        let block_slot = (n / dpb) as usize;
        let block = dir_inode.block_pointers[block_slot] as u32;
        let slot_in_block = n % dpb;
        let off = layout.data_block_offset(block) + slot_in_block as u64 * Dentry::SIZE;
        store.write(off, &dentry.encode())?;
        dir_inode.file_size += Dentry::SIZE as u16;
        inode::write(store, layout, dir_ino, &dir_inode)?;
        Ok(())
    })();

    if result.is_err() {
        if let Some(block) = allocated_block {
            // Roll back the block allocation in reverse order: the bitmap
            // bit is the last thing that was set, so it is the first thing
            // undone.
            let _ = bitmap::set(store, layout, block, false);
        }
    }
    result
}

/// Removes the entry at index `i` from the directory described by inode
/// `dir_ino`, compacting by overwriting it with the last entry
/// ("swap-delete"). Entry order is therefore not a stable property.
///
/// If removing the last entry drains its block, the block is freed and its
/// pointer cleared.
pub fn remove_index(
    store: &mut dyn BackingStore,
    layout: &Layout,
    dir_ino: u32,
    i: usize,
) -> Result<()> {
    let mut dir_inode = inode::read(store, layout, dir_ino)?;
    let dpb = dentries_per_block(layout);
    let n = count(&dir_inode) as usize;

    let last_idx = n - 1;
    if i != last_idx {
        let entries = read_all(store, layout, &dir_inode)?;
        let last = &entries[last_idx];
        let block = dir_inode.block_pointers[i / dpb as usize] as u32;
        let off = layout.data_block_offset(block) + (i % dpb as usize) as u64 * Dentry::SIZE;
        store.write(off, &last.encode())?;
    }

    dir_inode.file_size -= Dentry::SIZE as u16;

    // If the block that used to hold the trailing (now-removed) entry is
    // now empty, free it.
    if last_idx % dpb as usize == 0 {
        let drained_slot = last_idx / dpb as usize;
        let block = dir_inode.block_pointers[drained_slot] as u32;
        bitmap::set(store, layout, block, false)?;
        dir_inode.block_pointers[drained_slot] = 0;
    }

    inode::write(store, layout, dir_ino, &dir_inode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing_store::MemBackingStore;
    use crate::layout::Superblock;

    fn setup() -> (MemBackingStore, Layout) {
        let sb = Superblock::defaults();
        let layout = Layout::new(&sb);
        let mut store = MemBackingStore::new();
        store.truncate(sb.total_size as u64).unwrap();
        (store, layout)
    }

    fn dentry(n: u32, ty: FileType, name: &str) -> Dentry {
        Dentry {
            inode_number: n,
            file_type: ty,
            name: name.to_string(),
        }
    }

    #[test]
    fn dentry_round_trips() {
        let d = dentry(3, FileType::Directory, "etc");
        assert_eq!(Dentry::decode(&d.encode()), d);
    }

    #[test]
    fn append_and_read_all_preserve_entries() {
        let (mut store, layout) = setup();
        bitmap::set(&mut store, &layout, 0, true).unwrap();
        let mut root = Inode::default();
        root.is_used = true;
        inode::write(&mut store, &layout, 0, &root).unwrap();

        append(&mut store, &layout, 0, &dentry(0, FileType::Directory, ".")).unwrap();
        append(&mut store, &layout, 0, &dentry(0, FileType::Directory, "..")).unwrap();
        append(&mut store, &layout, 0, &dentry(1, FileType::File, "a")).unwrap();

        let root = inode::read(&mut store, &layout, 0).unwrap();
        assert_eq!(count(&root), 3);
        let entries = read_all(&mut store, &layout, &root).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].name, "a");
    }

    #[test]
    fn append_allocates_new_block_on_boundary() {
        let (mut store, layout) = setup();
        let mut dir = Inode::default();
        dir.is_used = true;
        inode::write(&mut store, &layout, 1, &dir).unwrap();

        let dpb = dentries_per_block(&layout);
        for i in 0..dpb + 1 {
            append(&mut store, &layout, 1, &dentry(2, FileType::File, &format!("f{i}"))).unwrap();
        }

        let dir = inode::read(&mut store, &layout, 1).unwrap();
        assert_eq!(count(&dir), dpb + 1);
        assert_ne!(dir.block_pointers[0], 0);
        assert_ne!(dir.block_pointers[1], 0);
    }

    #[test]
    fn append_fails_past_twelve_blocks() {
        let (mut store, layout) = setup();
        let mut dir = Inode::default();
        dir.is_used = true;
        // Pre-fill all 12 blocks as if full of entries, i.e. file_size is
        // an exact multiple of one block's worth of dentries 12 times over.
        let dpb = dentries_per_block(&layout);
        dir.file_size = (dpb as u64 * Dentry::SIZE * MAX_DIR_BLOCKS as u64) as u16;
        for (i, ptr) in dir.block_pointers.iter_mut().enumerate() {
            *ptr = (i + 10) as u16;
        }
        inode::write(&mut store, &layout, 1, &dir).unwrap();

        let result = append(&mut store, &layout, 1, &dentry(2, FileType::File, "overflow"));
        assert!(matches!(result, Err(Error::DirectoryFull)));
    }

    #[test]
    fn remove_index_swap_deletes_and_frees_drained_block() {
        let (mut store, layout) = setup();
        let mut dir = Inode::default();
        dir.is_used = true;
        inode::write(&mut store, &layout, 1, &dir).unwrap();

        append(&mut store, &layout, 1, &dentry(2, FileType::File, "a")).unwrap();
        append(&mut store, &layout, 1, &dentry(3, FileType::File, "b")).unwrap();

        let before = inode::read(&mut store, &layout, 1).unwrap();
        let block = before.block_pointers[0] as u32;
        assert!(bitmap::is_used(&mut store, &layout, block).unwrap());

        remove_index(&mut store, &layout, 1, 0).unwrap();
        let mid = inode::read(&mut store, &layout, 1).unwrap();
        assert_eq!(count(&mid), 1);
        let entries = read_all(&mut store, &layout, &mid).unwrap();
        assert_eq!(entries[0].name, "b");

        remove_index(&mut store, &layout, 1, 0).unwrap();
        let after = inode::read(&mut store, &layout, 1).unwrap();
        assert_eq!(count(&after), 0);
        assert_eq!(after.block_pointers[0], 0);
        assert!(!bitmap::is_used(&mut store, &layout, block).unwrap());
    }

    #[test]
    fn find_by_name_requires_exact_type_match() {
        let (mut store, layout) = setup();
        let mut dir = Inode::default();
        dir.is_used = true;
        inode::write(&mut store, &layout, 1, &dir).unwrap();

        append(&mut store, &layout, 1, &dentry(2, FileType::File, "x")).unwrap();
        let dir = inode::read(&mut store, &layout, 1).unwrap();

        assert_eq!(
            find_by_name(&mut store, &layout, &dir, "x", FileType::File).unwrap(),
            Some(0)
        );
        assert_eq!(
            find_by_name(&mut store, &layout, &dir, "x", FileType::Directory).unwrap(),
            None
        );
    }
}
