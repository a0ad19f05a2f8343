//! The `Filesystem` façade: ties the segment store and the inode/block
//! managers together, performs first-run initialization, and implements
//! the five path-walking commands (`add`, `extract`, `list`, `remove`,
//! `debug`).

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::block::BlockManager;
use crate::chain::FileChain;
use crate::dirent;
use crate::error::{Error, Result};
use crate::inode::{InodeManager, InodeType, RawInode};
use crate::layout::{NO_BLOCK, ROOT_INODE_ID};
use crate::path::split_path;
use crate::segment::{SegmentKind, SegmentStore};

pub struct Filesystem {
    store: SegmentStore,
    inodes: InodeManager,
    blocks: BlockManager,
}

impl Filesystem {
    /// Opens the segment files rooted at `root_dir`, creating
    /// `inode_seg_0` (with the root directory inode populated) and
    /// `data_seg_0` if `inode_seg_0` does not yet exist.
    pub fn open_or_init(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let store = SegmentStore::new(root_dir);
        store.ensure_root_dir()?;
        let fs = Self {
            store,
            inodes: InodeManager::new(),
            blocks: BlockManager::new(),
        };
        fs.init_if_needed()?;
        Ok(fs)
    }

    fn init_if_needed(&self) -> Result<()> {
        if !self.store.exists(SegmentKind::Inode, 0) {
            let id = self.inodes.allocate(&self.store)?;
            debug_assert_eq!(id, ROOT_INODE_ID, "the first-ever inode allocation must be slot 0");
            self.inodes.write(&self.store, id, &RawInode::new_directory())?;
            if !self.store.exists(SegmentKind::Data, 0) {
                self.store.create(SegmentKind::Data, 0)?;
            }
        }
        Ok(())
    }

    fn chain(&self) -> FileChain<'_> {
        FileChain::new(&self.store, &self.blocks)
    }

    /// Walks `components` from the root, requiring every one of them to
    /// already exist and be a directory. Used for `extract`/`remove`'s
    /// parent-directory resolution, where nothing is created on the fly.
    fn walk_existing_dir(&self, components: &[String]) -> Result<(u64, RawInode)> {
        let mut cur_id = ROOT_INODE_ID;
        let mut cur = self.inodes.read(&self.store, cur_id)?;
        for name in components {
            if !cur.is_directory() {
                return Err(Error::NotADirectory);
            }
            let child_id = dirent::find(&self.store, &self.blocks, &cur, name)?.ok_or(Error::NotFound)?;
            cur_id = child_id;
            cur = self.inodes.read(&self.store, cur_id)?;
        }
        Ok((cur_id, cur))
    }

    /// Walks `components` from the root, creating any missing component as
    /// a new, empty directory inode inserted into its parent. Fails with
    /// [`Error::NotADirectory`] if a non-directory is encountered mid-walk.
    fn walk_or_create_dirs(&self, components: &[String]) -> Result<(u64, RawInode)> {
        let mut cur_id = ROOT_INODE_ID;
        let mut cur = self.inodes.read(&self.store, cur_id)?;
        for name in components {
            if !cur.is_directory() {
                return Err(Error::NotADirectory);
            }
            match dirent::find(&self.store, &self.blocks, &cur, name)? {
                Some(child_id) => {
                    cur_id = child_id;
                    cur = self.inodes.read(&self.store, cur_id)?;
                }
                None => {
                    let new_id = self.inodes.allocate(&self.store)?;
                    let new_dir = RawInode::new_directory();
                    self.inodes.write(&self.store, new_id, &new_dir)?;
                    dirent::add(&self.store, &self.blocks, &self.inodes, cur_id, &mut cur, name, new_id)?;
                    cur_id = new_id;
                    cur = new_dir;
                }
            }
        }
        Ok((cur_id, cur))
    }

    /// Adds the host file at `host_path` to the ExFS2 tree at `fs_path`,
    /// creating any missing intermediate directories.
    pub fn add(&self, fs_path: &str, host_path: &Path) -> Result<()> {
        let components = split_path(fs_path)?;
        let (name, parents) = components.split_last().ok_or(Error::NotFound)?;

        let (parent_id, mut parent) = self.walk_or_create_dirs(parents)?;
        if !parent.is_directory() {
            return Err(Error::NotADirectory);
        }
        if dirent::find(&self.store, &self.blocks, &parent, name)?.is_some() {
            return Err(Error::AlreadyExists);
        }

        let file_id = self.inodes.allocate(&self.store)?;
        let mut file_inode = RawInode::new_file();
        let mut host_file = File::open(host_path)?;
        self.chain().write_stream(&mut file_inode, &mut host_file)?;
        self.inodes.write(&self.store, file_id, &file_inode)?;

        dirent::add(&self.store, &self.blocks, &self.inodes, parent_id, &mut parent, name, file_id)?;
        Ok(())
    }

    /// Streams the file at `fs_path` to `writer`.
    pub fn extract(&self, fs_path: &str, writer: &mut impl Write) -> Result<()> {
        let components = split_path(fs_path)?;
        let (name, parents) = components.split_last().ok_or(Error::NotFound)?;

        let (_, parent) = self.walk_existing_dir(parents)?;
        if !parent.is_directory() {
            return Err(Error::NotADirectory);
        }
        let file_id = dirent::find(&self.store, &self.blocks, &parent, name)?.ok_or(Error::NotFound)?;
        let file_inode = self.inodes.read(&self.store, file_id)?;
        if !file_inode.is_file() {
            return Err(Error::NotFound);
        }
        self.chain().read_stream(&file_inode, writer)
    }

    /// Removes the subtree rooted at `fs_path`, recursively freeing every
    /// inode and block it owns, then clears the parent's entry.
    pub fn remove(&self, fs_path: &str) -> Result<()> {
        let components = split_path(fs_path)?;
        let (name, parents) = components.split_last().ok_or(Error::NotFound)?;

        let (_, parent) = self.walk_existing_dir(parents)?;
        if !parent.is_directory() {
            return Err(Error::NotADirectory);
        }
        let child_id = dirent::find(&self.store, &self.blocks, &parent, name)?.ok_or(Error::NotFound)?;

        self.remove_recursive(child_id)?;
        dirent::remove_entry(&self.store, &self.blocks, &parent, child_id)?;
        Ok(())
    }

    fn remove_recursive(&self, inode_id: u64) -> Result<()> {
        let inode = self.inodes.read(&self.store, inode_id)?;
        match inode.kind() {
            InodeType::File => {
                self.chain().free_chain(&inode)?;
            }
            InodeType::Directory => {
                for (_, child_id) in dirent::entries(&self.store, &self.blocks, &inode)? {
                    self.remove_recursive(child_id)?;
                }
                for &block_id in inode.direct_slice() {
                    self.blocks.free(&self.store, block_id as u64)?;
                }
            }
            InodeType::Free => return Err(Error::NotFound),
        }
        self.inodes.free(&self.store, inode_id)
    }

    /// Prints `/` followed by the tree's entries, indented by depth and
    /// with directories suffixed by `/`.
    pub fn list(&self, writer: &mut impl Write) -> Result<()> {
        writeln!(writer, "/")?;
        let root = self.inodes.read(&self.store, ROOT_INODE_ID)?;
        self.list_recursive(&root, 1, writer)
    }

    fn list_recursive(&self, dir: &RawInode, depth: usize, writer: &mut impl Write) -> Result<()> {
        let indent = "  ".repeat(depth);
        for (name, child_id) in dirent::entries(&self.store, &self.blocks, dir)? {
            let child = self.inodes.read(&self.store, child_id)?;
            if child.is_directory() {
                writeln!(writer, "{indent}{name}/")?;
                self.list_recursive(&child, depth + 1, writer)?;
            } else {
                writeln!(writer, "{indent}{name}")?;
            }
        }
        Ok(())
    }

    /// Descends `fs_path` printing each directory's entries along the way;
    /// at a file terminus, prints its size and a block-allocation summary.
    pub fn debug(&self, fs_path: &str, writer: &mut impl Write) -> Result<()> {
        let components = split_path(fs_path)?;

        let mut cur_id = ROOT_INODE_ID;
        let mut cur = self.inodes.read(&self.store, cur_id)?;
        writeln!(writer, "/ (inode {cur_id})")?;
        self.debug_print_entries(&cur, writer)?;

        for name in &components {
            if !cur.is_directory() {
                return Err(Error::NotADirectory);
            }
            let child_id = dirent::find(&self.store, &self.blocks, &cur, name)?.ok_or(Error::NotFound)?;
            cur = self.inodes.read(&self.store, child_id)?;
            cur_id = child_id;
            if cur.is_directory() {
                writeln!(writer, "{name}/ (inode {cur_id})")?;
                self.debug_print_entries(&cur, writer)?;
            } else {
                writeln!(writer, "{name} (inode {cur_id})")?;
            }
        }

        if cur.is_file() {
            self.debug_print_file_summary(&cur, writer)?;
        }
        Ok(())
    }

    fn debug_print_entries(&self, dir: &RawInode, writer: &mut impl Write) -> Result<()> {
        for (name, id) in dirent::entries(&self.store, &self.blocks, dir)? {
            writeln!(writer, "  {name} -> inode {id}")?;
        }
        Ok(())
    }

    fn debug_print_file_summary(&self, file: &RawInode, writer: &mut impl Write) -> Result<()> {
        writeln!(writer, "size: {} bytes", file.size())?;

        let direct = file.direct_slice();
        if direct.is_empty() {
            writeln!(writer, "direct blocks: 0")?;
        } else {
            writeln!(
                writer,
                "direct blocks: {} (first={}, last={})",
                direct.len(),
                direct.first().unwrap(),
                direct.last().unwrap()
            )?;
        }

        if file.indirect() != NO_BLOCK {
            let ptrs = self.blocks.read_pointer_block(&self.store, file.indirect() as u64)?;
            let count = ptrs.iter().take_while(|&&p| p != 0).count();
            writeln!(writer, "indirect blocks: {count} (indirect id={})", file.indirect())?;
        } else {
            writeln!(writer, "indirect blocks: 0")?;
        }

        if file.double_indirect() != NO_BLOCK {
            let count = self.count_tier_leaves(file.double_indirect() as u64, 2)?;
            writeln!(writer, "double indirect blocks: {count}")?;
        } else {
            writeln!(writer, "double indirect blocks: 0")?;
        }

        if file.triple_indirect() != NO_BLOCK {
            let count = self.count_tier_leaves(file.triple_indirect() as u64, 3)?;
            writeln!(writer, "triple indirect blocks: {count}")?;
        } else {
            writeln!(writer, "triple indirect blocks: 0")?;
        }
        Ok(())
    }

    fn count_tier_leaves(&self, block_id: u64, depth: u32) -> Result<usize> {
        let ptrs = self.blocks.read_pointer_block(&self.store, block_id)?;
        let mut total = 0usize;
        for &ptr in ptrs.iter() {
            if ptr == 0 {
                break;
            }
            total += if depth == 1 {
                1
            } else {
                self.count_tier_leaves(ptr as u64, depth - 1)?
            };
        }
        Ok(total)
    }
}
