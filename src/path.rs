//! Path resolution: walking a slash-delimited, `cwd`-relative path to an
//! inode, or to the parent inode plus the leaf name a creator needs.

use crate::backing_store::BackingStore;
use crate::dentry::{self, FileType};
use crate::error::{Error, Result};
use crate::inode::{self, Inode};
use crate::layout::Layout;

/// The outcome of resolving a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Every component existed with the expected type.
    Found(u32),
    /// Every intermediate component resolved as a directory, but the final
    /// name was not present. The state required by creators (`create`,
    /// `mkdir`); an error for everyone else.
    ParentOnly(u32, String),
    /// An intermediate component was missing or had the wrong type. Fatal
    /// for every caller.
    NotFound,
}

/// Splits `path` on its last `/` into `(parent_path, leaf_name)`.
/// `parent_path == ""` means "the current working directory".
pub fn split_path(path: &str) -> (String, String) {
    match path.rfind('/') {
        Some(i) => (path[..i].to_string(), path[i + 1..].to_string()),
        None => (String::new(), path.to_string()),
    }
}

/// Validates that `name` is a legal path component: non-empty, containing
/// no `/` and no whitespace, and short enough to fit a dentry's name field.
fn validate_component(name: &str) -> Result<()> {
    if name.is_empty()
        || name.len() >= dentry::NAME_CAPACITY
        || name.contains('/')
        || name.contains(char::is_whitespace)
    {
        return Err(Error::InvalidPath);
    }
    Ok(())
}

/// Resolves `path` relative to `cwd`, requiring the leaf (if found) to have
/// type `expected_leaf_type`. Absolute paths (a leading `/`) are rejected:
/// only resolution relative to `cwd` is supported.
pub fn resolve(
    store: &mut dyn BackingStore,
    layout: &Layout,
    cwd: u32,
    path: &str,
    expected_leaf_type: FileType,
) -> Result<Resolved> {
    if path.is_empty() {
        return Err(Error::InvalidPath);
    }

    let components: Vec<&str> = path.split('/').collect();
    if components.iter().any(|c| c.is_empty()) {
        return Err(Error::InvalidPath);
    }
    for c in &components {
        validate_component(c)?;
    }

    let mut current = cwd;
    for (i, name) in components.iter().enumerate() {
        let is_leaf = i == components.len() - 1;
        let expected = if is_leaf {
            expected_leaf_type
        } else {
            FileType::Directory
        };

        let dir_inode = read_as_directory(store, layout, current)?;
        let idx = dentry::find_by_name(store, layout, &dir_inode, name, expected)?;

        match idx {
            Some(idx) => {
                let entries = dentry::read_all(store, layout, &dir_inode)?;
                current = entries[idx].inode_number;
            }
            None => {
                if is_leaf {
                    return Ok(Resolved::ParentOnly(current, (*name).to_string()));
                }
                return Ok(Resolved::NotFound);
            }
        }
    }

    Ok(Resolved::Found(current))
}

/// Reads inode `n`, failing with `NotDirectory` unless it is plausibly a
/// directory (used while walking intermediate path components).
fn read_as_directory(store: &mut dyn BackingStore, layout: &Layout, n: u32) -> Result<Inode> {
    let inode = inode::read(store, layout, n)?;
    if !inode.is_used {
        return Err(Error::NotFound);
    }
    Ok(inode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing_store::MemBackingStore;
    use crate::bitmap;
    use crate::dentry::Dentry;
    use crate::layout::Superblock;

    fn setup() -> (MemBackingStore, Layout) {
        let sb = Superblock::defaults();
        let layout = Layout::new(&sb);
        let mut store = MemBackingStore::new();
        store.truncate(sb.total_size as u64).unwrap();
        bitmap::set(&mut store, &layout, 0, true).unwrap();

        let mut root = Inode::default();
        root.is_used = true;
        inode::write(&mut store, &layout, 0, &root).unwrap();
        dentry::append(
            &mut store,
            &layout,
            0,
            &Dentry {
                inode_number: 0,
                file_type: FileType::Directory,
                name: ".".into(),
            },
        )
        .unwrap();
        dentry::append(
            &mut store,
            &layout,
            0,
            &Dentry {
                inode_number: 0,
                file_type: FileType::Directory,
                name: "..".into(),
            },
        )
        .unwrap();

        (store, layout)
    }

    #[test]
    fn split_path_examples() {
        assert_eq!(split_path("a"), ("".to_string(), "a".to_string()));
        assert_eq!(split_path("a/b"), ("a".to_string(), "b".to_string()));
        assert_eq!(
            split_path("a/b/c"),
            ("a/b".to_string(), "c".to_string())
        );
    }

    #[test]
    fn empty_path_and_empty_components_are_invalid() {
        let (mut store, layout) = setup();
        assert!(matches!(
            resolve(&mut store, &layout, 0, "", FileType::File),
            Err(Error::InvalidPath)
        ));
        assert!(matches!(
            resolve(&mut store, &layout, 0, "/a", FileType::File),
            Err(Error::InvalidPath)
        ));
        assert!(matches!(
            resolve(&mut store, &layout, 0, "a//b", FileType::File),
            Err(Error::InvalidPath)
        ));
    }

    #[test]
    fn missing_leaf_is_parent_only() {
        let (mut store, layout) = setup();
        let resolved = resolve(&mut store, &layout, 0, "missing", FileType::File).unwrap();
        assert_eq!(resolved, Resolved::ParentOnly(0, "missing".to_string()));
    }

    #[test]
    fn missing_intermediate_is_not_found() {
        let (mut store, layout) = setup();
        let resolved = resolve(&mut store, &layout, 0, "nope/leaf", FileType::File).unwrap();
        assert_eq!(resolved, Resolved::NotFound);
    }

    #[test]
    fn dot_and_dotdot_resolve_through_dentries() {
        let (mut store, layout) = setup();
        let resolved = resolve(&mut store, &layout, 0, ".", FileType::Directory).unwrap();
        assert_eq!(resolved, Resolved::Found(0));
        let resolved = resolve(&mut store, &layout, 0, "..", FileType::Directory).unwrap();
        assert_eq!(resolved, Resolved::Found(0));
    }
}
