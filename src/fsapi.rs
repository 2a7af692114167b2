//! `FsApi`: the ten filesystem operations, wired together from the lower
//! layers, with the rollback discipline of §4.7 applied at every multi-write
//! operation.

use std::path::Path;

use crate::backing_store::BackingStore;
use crate::bitmap;
use crate::dentry::{self, Dentry, FileType};
use crate::error::{Error, Result};
use crate::inode::{self, Inode, ROOT_INODE};
use crate::layout::{Layout, Superblock};
use crate::path::{self, Resolved};

/// The filesystem core, mounted over one `BackingStore`.
///
/// Holds the only process-local mutable state the specification allows: the
/// loaded superblock/layout and `cwd`. There is no global mutable state
/// anywhere else in the crate.
pub struct FsApi<S: BackingStore> {
    store: S,
    superblock: Option<Superblock>,
    layout: Option<Layout>,
    cwd: u32,
    verbose: bool,
}

impl<S: BackingStore> FsApi<S> {
    /// Builds an `FsApi` in the `Unmounted` state: only `init` is legal
    /// until a superblock is loaded.
    pub fn new(store: S, verbose: bool) -> Self {
        Self {
            store,
            superblock: None,
            layout: None,
            cwd: ROOT_INODE,
            verbose,
        }
    }

    /// Mounts an already-`init`ed image by reading its superblock.
    ///
    /// Corresponds to the `Mounting` transition: if the superblock cannot be
    /// read (the image is missing or truncated), the mount fails with
    /// `ImageMissing` and the instance stays `Unmounted`.
    pub fn mount(store: S, verbose: bool) -> Result<Self> {
        let mut api = Self::new(store, verbose);
        let sb = Superblock::read(&mut api.store).map_err(|_| Error::ImageMissing)?;
        api.layout = Some(Layout::new(&sb));
        api.superblock = Some(sb);
        Ok(api)
    }

    fn layout(&self) -> Result<Layout> {
        self.layout.ok_or(Error::ImageMissing)
    }

    fn log(&self, op: &str, detail: &str) {
        if self.verbose {
            println!("[{op}] {detail}");
        }
    }

    /// Current working directory, as an inode number.
    pub fn cwd(&self) -> u32 {
        self.cwd
    }

    /// The currently loaded superblock, if mounted.
    pub fn superblock(&self) -> Option<Superblock> {
        self.superblock
    }

    /// Creates (overwriting) the image: writes the superblock, a blank
    /// inode table, a blank bitmap, a blank data region, and the root
    /// directory's `.`/`..` entries. Resets `cwd` to 0. Legal from every
    /// state.
    pub fn init(&mut self) -> Result<()> {
        let sb = Superblock::defaults();
        // Zero the whole image: truncating to 0 first guarantees the
        // subsequent grow is all zero bytes, regardless of what the file
        // held before.
        self.store.truncate(0)?;
        self.store.truncate(sb.total_size as u64)?;

        let layout = Layout::new(&sb);
        sb.write(&mut self.store)?;

        let mut root = Inode {
            is_used: true,
            ..Inode::default()
        };
        inode::write(&mut self.store, &layout, ROOT_INODE, &root)?;

        // The bitmap starts all-zero (nothing allocated yet), so the first
        // `append` below finds block 0 as the first free block, exactly
        // the block the root directory is required to own.
        dentry::append(
            &mut self.store,
            &layout,
            ROOT_INODE,
            &Dentry {
                inode_number: ROOT_INODE,
                file_type: FileType::Directory,
                name: ".".to_string(),
            },
        )?;
        dentry::append(
            &mut self.store,
            &layout,
            ROOT_INODE,
            &Dentry {
                inode_number: ROOT_INODE,
                file_type: FileType::Directory,
                name: "..".to_string(),
            },
        )?;

        root = inode::read(&mut self.store, &layout, ROOT_INODE)?;
        debug_assert_eq!(root.block_pointers[0], 0);

        self.superblock = Some(sb);
        self.layout = Some(layout);
        self.cwd = ROOT_INODE;
        self.log("init", "filesystem created");
        Ok(())
    }

    /// Lists the names of `cwd`'s entries, in stored order.
    pub fn ls(&mut self) -> Result<Vec<String>> {
        let layout = self.layout()?;
        let dir = inode::read(&mut self.store, &layout, self.cwd)?;
        let entries = dentry::read_all(&mut self.store, &layout, &dir)?;
        self.log("ls", &format!("{} entries", entries.len()));
        Ok(entries.into_iter().map(|d| d.name).collect())
    }

    /// Resolves a directory-relative parent path (the `""` convention of
    /// `split_path` means "the current working directory").
    fn resolve_dir(&mut self, layout: &Layout, dir_path: &str) -> Result<u32> {
        if dir_path.is_empty() {
            return Ok(self.cwd);
        }
        match path::resolve(&mut self.store, layout, self.cwd, dir_path, FileType::Directory)? {
            Resolved::Found(n) => Ok(n),
            _ => Err(Error::NotFound),
        }
    }

    /// Frees every block an inode owns and the inode itself.
    fn free_inode(&mut self, layout: &Layout, ino: u32) -> Result<()> {
        let freed = inode::read(&mut self.store, layout, ino)?;
        for block in freed.used_blocks() {
            bitmap::set(&mut self.store, layout, block as u32, false)?;
        }
        inode::free(&mut self.store, layout, ino)
    }

    /// Creates an empty file at `path`.
    pub fn create(&mut self, path: &str) -> Result<()> {
        let layout = self.layout()?;
        let resolved = path::resolve(&mut self.store, &layout, self.cwd, path, FileType::File)?;
        let (parent, name) = match resolved {
            Resolved::Found(_) => return Err(Error::AlreadyExists),
            Resolved::ParentOnly(parent, name) => {
                let parent_inode = inode::read(&mut self.store, &layout, parent)?;
                if dentry::find_by_name(&mut self.store, &layout, &parent_inode, &name, FileType::Directory)?
                    .is_some()
                {
                    return Err(Error::AlreadyExists);
                }
                (parent, name)
            }
            Resolved::NotFound => return Err(Error::NotFound),
        };

        let block = bitmap::find_free(&mut self.store, &layout)?.ok_or(Error::NoFreeBlocks)?;
        bitmap::set(&mut self.store, &layout, block, true)?;

        let mut new_inode = Inode {
            is_used: true,
            ..Inode::default()
        };
        new_inode.block_pointers[0] = block as u16;

        let ino = match inode::allocate(&mut self.store, &layout, &new_inode) {
            Ok(ino) => ino,
            Err(e) => {
                let _ = bitmap::set(&mut self.store, &layout, block, false);
                return Err(e);
            }
        };

        let d = Dentry {
            inode_number: ino,
            file_type: FileType::File,
            name: name.clone(),
        };
        if let Err(e) = dentry::append(&mut self.store, &layout, parent, &d) {
            let _ = self.free_inode(&layout, ino);
            return Err(e);
        }

        self.log("create", path);
        Ok(())
    }

    /// Creates a directory at `path`, with `.`/`..` self-entries.
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        let layout = self.layout()?;
        let resolved = path::resolve(&mut self.store, &layout, self.cwd, path, FileType::Directory)?;
        let (parent, name) = match resolved {
            Resolved::Found(_) => return Err(Error::AlreadyExists),
            Resolved::ParentOnly(parent, name) => {
                let parent_inode = inode::read(&mut self.store, &layout, parent)?;
                if dentry::find_by_name(&mut self.store, &layout, &parent_inode, &name, FileType::File)?
                    .is_some()
                {
                    return Err(Error::AlreadyExists);
                }
                (parent, name)
            }
            Resolved::NotFound => return Err(Error::NotFound),
        };

        let new_inode = Inode {
            is_used: true,
            ..Inode::default()
        };
        let ino = inode::allocate(&mut self.store, &layout, &new_inode)?;

        let init_result = (|| -> Result<()> {
            dentry::append(
                &mut self.store,
                &layout,
                ino,
                &Dentry {
                    inode_number: ino,
                    file_type: FileType::Directory,
                    name: ".".to_string(),
                },
            )?;
            dentry::append(
                &mut self.store,
                &layout,
                ino,
                &Dentry {
                    inode_number: parent,
                    file_type: FileType::Directory,
                    name: "..".to_string(),
                },
            )
        })();
        if let Err(e) = init_result {
            let _ = self.free_inode(&layout, ino);
            return Err(e);
        }

        let d = Dentry {
            inode_number: ino,
            file_type: FileType::Directory,
            name: name.clone(),
        };
        if let Err(e) = dentry::append(&mut self.store, &layout, parent, &d) {
            let _ = self.free_inode(&layout, ino);
            return Err(e);
        }

        self.log("mkdir", path);
        Ok(())
    }

    /// Writes `bytes` to the file at `path`, replacing its current content.
    /// An empty slice truncates the file to zero length.
    pub fn write_file(&mut self, path: &str, bytes: &[u8]) -> Result<()> {
        let layout = self.layout()?;
        let ino = match path::resolve(&mut self.store, &layout, self.cwd, path, FileType::File)? {
            Resolved::Found(n) => n,
            _ => return Err(Error::NotFound),
        };
        if bytes.len() as u64 > layout.block_size {
            return Err(Error::FileTooLarge);
        }

        let mut file_inode = inode::read(&mut self.store, &layout, ino)?;
        let block = file_inode.block_pointers[0] as u32;
        self.store.write(layout.data_block_offset(block), bytes)?;
        file_inode.file_size = bytes.len() as u16;
        inode::write(&mut self.store, &layout, ino, &file_inode)?;

        self.log("write", path);
        Ok(())
    }

    /// Reads the full (single-block) content of the file at `path`.
    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let layout = self.layout()?;
        let ino = match path::resolve(&mut self.store, &layout, self.cwd, path, FileType::File)? {
            Resolved::Found(n) => n,
            _ => return Err(Error::NotFound),
        };
        let file_inode = inode::read(&mut self.store, &layout, ino)?;
        let block = file_inode.block_pointers[0] as u32;
        let bytes = self
            .store
            .read(layout.data_block_offset(block), file_inode.file_size as usize)?;
        self.log("read", path);
        Ok(bytes)
    }

    /// Removes the file at `path`. Directories are not supported.
    pub fn rm(&mut self, path: &str) -> Result<()> {
        let layout = self.layout()?;
        let ino = match path::resolve(&mut self.store, &layout, self.cwd, path, FileType::File)? {
            Resolved::Found(n) => n,
            _ => return Err(Error::NotFound),
        };

        let (parent_path, name) = path::split_path(path);
        let parent = self.resolve_dir(&layout, &parent_path)?;
        let parent_inode = inode::read(&mut self.store, &layout, parent)?;
        let idx = dentry::find_by_name(&mut self.store, &layout, &parent_inode, &name, FileType::File)?
            .ok_or(Error::NotFound)?;

        // Unlink before freeing: if freeing fails partway, the entry is
        // already gone rather than left dangling over freed resources.
        dentry::remove_index(&mut self.store, &layout, parent, idx)?;
        self.free_inode(&layout, ino)?;

        self.log("rm", path);
        Ok(())
    }

    /// Changes `cwd` to the directory at `path`.
    pub fn cd(&mut self, path: &str) -> Result<()> {
        let layout = self.layout()?;
        match path::resolve(&mut self.store, &layout, self.cwd, path, FileType::Directory)? {
            Resolved::Found(n) => {
                self.cwd = n;
                self.log("cd", path);
                Ok(())
            }
            Resolved::ParentOnly(parent, name) => {
                let parent_inode = inode::read(&mut self.store, &layout, parent)?;
                if dentry::find_by_name(&mut self.store, &layout, &parent_inode, &name, FileType::File)?
                    .is_some()
                {
                    Err(Error::NotDirectory)
                } else {
                    Err(Error::NotFound)
                }
            }
            Resolved::NotFound => Err(Error::NotFound),
        }
    }

    /// Reads a file's full content, following every data block it owns (up
    /// to 12), not just the first.
    fn read_file_spanning(&mut self, layout: &Layout, inode: &Inode) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(inode.file_size as usize);
        let mut remaining = inode.file_size as usize;
        for &ptr in inode.block_pointers.iter() {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(layout.block_size as usize);
            let bytes = self.store.read(layout.data_block_offset(ptr as u32), take)?;
            data.extend_from_slice(&bytes);
            remaining -= take;
        }
        Ok(data)
    }

    /// Copies the content of the file at `fs_path` into a host file at
    /// `host_path`.
    pub fn open(&mut self, fs_path: &str, host_path: &Path) -> Result<()> {
        let layout = self.layout()?;
        let ino = match path::resolve(&mut self.store, &layout, self.cwd, fs_path, FileType::File)? {
            Resolved::Found(n) => n,
            _ => return Err(Error::NotFound),
        };
        let file_inode = inode::read(&mut self.store, &layout, ino)?;
        let bytes = self.read_file_spanning(&layout, &file_inode)?;
        std::fs::write(host_path, &bytes)?;

        self.log("open", fs_path);
        Ok(())
    }

    /// Copies a host file's bytes into the filesystem file at `fs_path`,
    /// allocating data blocks on demand (up to 12). Rolls back any newly
    /// allocated block if the copy cannot complete.
    pub fn save(&mut self, host_path: &Path, fs_path: &str) -> Result<()> {
        let bytes = std::fs::read(host_path)?;

        let layout = self.layout()?;
        let max_len = layout.block_size * inode::BLOCK_POINTERS as u64;
        if bytes.len() as u64 > max_len {
            return Err(Error::FileTooLarge);
        }

        let ino = match path::resolve(&mut self.store, &layout, self.cwd, fs_path, FileType::File)? {
            Resolved::Found(n) => n,
            _ => return Err(Error::NotFound),
        };
        let mut file_inode = inode::read(&mut self.store, &layout, ino)?;
        let mut newly_allocated = Vec::new();

        let copy_result = (|| -> Result<()> {
            for (i, chunk) in bytes.chunks(layout.block_size as usize).enumerate() {
                if file_inode.block_pointers[i] == 0 {
                    let block = bitmap::find_free(&mut self.store, &layout)?.ok_or(Error::NoFreeBlocks)?;
                    bitmap::set(&mut self.store, &layout, block, true)?;
                    file_inode.block_pointers[i] = block as u16;
                    newly_allocated.push(block);
                }
                let block = file_inode.block_pointers[i] as u32;
                self.store.write(layout.data_block_offset(block), chunk)?;
            }
            Ok(())
        })();

        if let Err(e) = copy_result {
            for block in newly_allocated {
                let _ = bitmap::set(&mut self.store, &layout, block, false);
            }
            return Err(e);
        }

        file_inode.file_size = bytes.len() as u16;
        inode::write(&mut self.store, &layout, ino, &file_inode)?;

        self.log("save", fs_path);
        Ok(())
    }
}
