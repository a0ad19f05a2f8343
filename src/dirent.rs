//! Directory-entry records and the directory module's `find`/`add`/
//! `remove_entry` operations.
//!
//! A directory inode's `direct[0..num_direct)` point at directory-entry
//! blocks; each block holds [`DIR_ENTRIES_PER_BLOCK`] fixed-size
//! `(name, inode_num)` records packed back-to-back starting at offset 0,
//! exactly as specified. Unlike [`crate::inode::RawInode`], a single entry
//! does not fill a whole block, so entries are packed/unpacked at explicit
//! byte offsets rather than transferred via a block-sized `#[repr(C)]`
//! cast.

use crate::block::BlockManager;
use crate::error::{Error, Result};
use crate::inode::{InodeManager, RawInode};
use crate::layout::{BLOCK_SIZE, MAX_DIRECT, MAX_FILENAME, NO_INODE};
use crate::segment::SegmentStore;

/// Byte size of one packed directory-entry record: the name buffer plus a
/// 32-bit inode number.
const DIR_ENTRY_SIZE: usize = MAX_FILENAME + 4;

/// Number of directory entries packed into one data block.
pub const DIR_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIR_ENTRY_SIZE;

/// One unpacked directory entry.
#[derive(Clone, Copy)]
pub struct DirEntry {
    name: [u8; MAX_FILENAME],
    inode_num: i32,
}

impl DirEntry {
    fn free() -> Self {
        Self {
            name: [0; MAX_FILENAME],
            inode_num: NO_INODE,
        }
    }

    fn occupied(name: &str, inode_num: u64) -> Self {
        let mut buf = [0u8; MAX_FILENAME];
        let bytes = name.as_bytes();
        let copy_len = bytes.len().min(MAX_FILENAME - 1);
        buf[..copy_len].copy_from_slice(&bytes[..copy_len]);
        // buf[copy_len] is already 0, the NUL terminator.
        Self {
            name: buf,
            inode_num: inode_num as i32,
        }
    }

    pub fn is_free(&self) -> bool {
        self.inode_num == NO_INODE
    }

    pub fn inode_num(&self) -> u64 {
        self.inode_num as u64
    }

    /// The name up to (not including) its NUL terminator.
    pub fn name_bytes(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        &self.name[..len]
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let mut name = [0u8; MAX_FILENAME];
        name.copy_from_slice(&bytes[..MAX_FILENAME]);
        let inode_num = i32::from_ne_bytes(bytes[MAX_FILENAME..DIR_ENTRY_SIZE].try_into().unwrap());
        Self { name, inode_num }
    }

    fn write_to(&self, out: &mut [u8]) {
        out[..MAX_FILENAME].copy_from_slice(&self.name);
        out[MAX_FILENAME..DIR_ENTRY_SIZE].copy_from_slice(&self.inode_num.to_ne_bytes());
    }
}

fn read_entry(block: &[u8; BLOCK_SIZE], index: usize) -> DirEntry {
    let off = index * DIR_ENTRY_SIZE;
    DirEntry::from_bytes(&block[off..off + DIR_ENTRY_SIZE])
}

fn write_entry(block: &mut [u8; BLOCK_SIZE], index: usize, entry: &DirEntry) {
    let off = index * DIR_ENTRY_SIZE;
    entry.write_to(&mut block[off..off + DIR_ENTRY_SIZE]);
}

/// A freshly allocated, fully-free directory-entry block.
fn blank_entry_block() -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    let free = DirEntry::free();
    for i in 0..DIR_ENTRIES_PER_BLOCK {
        write_entry(&mut block, i, &free);
    }
    block
}

/// Linearly scans `dir`'s entry blocks for `name`, returning its inode id
/// if present.
pub fn find(store: &SegmentStore, blocks: &BlockManager, dir: &RawInode, name: &str) -> Result<Option<u64>> {
    let target = name.as_bytes();
    for &block_id in dir.direct_slice() {
        let block = blocks.read(store, block_id as u64)?;
        for i in 0..DIR_ENTRIES_PER_BLOCK {
            let entry = read_entry(&block, i);
            if !entry.is_free() && entry.name_bytes() == target {
                return Ok(Some(entry.inode_num()));
            }
        }
    }
    Ok(None)
}

/// Inserts `(name, child)` into `dir`, which lives at inode id `dir_id`.
///
/// Fails with [`Error::AlreadyExists`] if `name` is already present, and
/// with [`Error::NoSpace`] if no existing entry block has a free slot and
/// `dir` has already reached [`MAX_DIRECT`] entry blocks.
pub fn add(
    store: &SegmentStore,
    blocks: &BlockManager,
    inodes: &InodeManager,
    dir_id: u64,
    dir: &mut RawInode,
    name: &str,
    child: u64,
) -> Result<()> {
    if find(store, blocks, dir, name)?.is_some() {
        return Err(Error::AlreadyExists);
    }

    let entry = DirEntry::occupied(name, child);

    for &block_id in dir.direct_slice() {
        let mut block = blocks.read(store, block_id as u64)?;
        if let Some(slot) = (0..DIR_ENTRIES_PER_BLOCK).find(|&i| read_entry(&block, i).is_free()) {
            write_entry(&mut block, slot, &entry);
            blocks.write(store, block_id as u64, &block)?;
            return Ok(());
        }
    }

    if dir.num_direct() as usize >= MAX_DIRECT {
        return Err(Error::NoSpace);
    }

    let new_block_id = blocks.allocate(store)?;
    let mut block = blank_entry_block();
    write_entry(&mut block, 0, &entry);
    blocks.write(store, new_block_id, &block)?;

    dir.push_direct(new_block_id as i32)?;
    dir.add_size(BLOCK_SIZE as u64);
    inodes.write(store, dir_id, dir)?;
    Ok(())
}

/// Marks the entry pointing at `child` as free. The owning directory-entry
/// block is not released even if every entry in it becomes free, and
/// `num_direct` is not decremented — documented simplifications carried
/// over from the original design.
pub fn remove_entry(store: &SegmentStore, blocks: &BlockManager, dir: &RawInode, child: u64) -> Result<()> {
    for &block_id in dir.direct_slice() {
        let mut block = blocks.read(store, block_id as u64)?;
        let hit = (0..DIR_ENTRIES_PER_BLOCK).find(|&i| {
            let e = read_entry(&block, i);
            !e.is_free() && e.inode_num() == child
        });
        if let Some(slot) = hit {
            write_entry(&mut block, slot, &DirEntry::free());
            blocks.write(store, block_id as u64, &block)?;
            return Ok(());
        }
    }
    Err(Error::NotFound)
}

/// Lists every occupied `(name, inode_num)` pair in `dir`, in storage
/// order. Used by `list` and `debug`.
pub fn entries(store: &SegmentStore, blocks: &BlockManager, dir: &RawInode) -> Result<Vec<(String, u64)>> {
    let mut out = Vec::new();
    for &block_id in dir.direct_slice() {
        let block = blocks.read(store, block_id as u64)?;
        for i in 0..DIR_ENTRIES_PER_BLOCK {
            let entry = read_entry(&block, i);
            if !entry.is_free() {
                let name = String::from_utf8_lossy(entry.name_bytes()).into_owned();
                out.push((name, entry.inode_num()));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentStore;
    use std::fs;
    use std::path::PathBuf;

    fn scratch_dir(tag: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!(
            "exfs2-dirent-test-{tag}-{}-{:?}",
            std::process::id(),
            std::time::Instant::now()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn add_find_remove_roundtrip() {
        let dir_path = scratch_dir("add-find-remove");
        let store = SegmentStore::new(&dir_path);
        let blocks = BlockManager::new();
        let inodes = InodeManager::new();

        let dir_id = inodes.allocate(&store).unwrap();
        let mut dir = RawInode::new_directory();

        add(&store, &blocks, &inodes, dir_id, &mut dir, "a.txt", 5).unwrap();
        assert_eq!(find(&store, &blocks, &dir, "a.txt").unwrap(), Some(5));
        assert_eq!(find(&store, &blocks, &dir, "missing").unwrap(), None);

        let err = add(&store, &blocks, &inodes, dir_id, &mut dir, "a.txt", 9).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists));

        remove_entry(&store, &blocks, &dir, 5).unwrap();
        assert_eq!(find(&store, &blocks, &dir, "a.txt").unwrap(), None);

        let _ = fs::remove_dir_all(&dir_path);
    }

    #[test]
    fn add_fills_existing_block_before_allocating_new_one() {
        let dir_path = scratch_dir("fill-before-alloc");
        let store = SegmentStore::new(&dir_path);
        let blocks = BlockManager::new();
        let inodes = InodeManager::new();

        let dir_id = inodes.allocate(&store).unwrap();
        let mut dir = RawInode::new_directory();

        for i in 0..DIR_ENTRIES_PER_BLOCK {
            add(&store, &blocks, &inodes, dir_id, &mut dir, &format!("f{i}"), i as u64 + 1).unwrap();
        }
        assert_eq!(dir.num_direct(), 1);

        add(&store, &blocks, &inodes, dir_id, &mut dir, "overflow", 999).unwrap();
        assert_eq!(dir.num_direct(), 2);

        remove_entry(&store, &blocks, &dir, 1).unwrap();
        add(&store, &blocks, &inodes, dir_id, &mut dir, "reuses-freed-slot", 1000).unwrap();
        assert_eq!(dir.num_direct(), 2, "a freed slot in the first block should be reused");

        let _ = fs::remove_dir_all(&dir_path);
    }

    #[test]
    fn add_fails_with_no_space_once_max_direct_blocks_are_full() {
        let dir_path = scratch_dir("no-space");
        let store = SegmentStore::new(&dir_path);
        let blocks = BlockManager::new();
        let inodes = InodeManager::new();

        let dir_id = inodes.allocate(&store).unwrap();
        let mut dir = RawInode::new_directory();

        let mut full_block = [0u8; BLOCK_SIZE];
        for i in 0..DIR_ENTRIES_PER_BLOCK {
            write_entry(&mut full_block, i, &DirEntry::occupied("taken", 1));
        }
        for _ in 0..MAX_DIRECT {
            let id = blocks.allocate(&store).unwrap();
            blocks.write(&store, id, &full_block).unwrap();
            dir.push_direct(id as i32).unwrap();
        }

        let err = add(&store, &blocks, &inodes, dir_id, &mut dir, "z", 1).unwrap_err();
        assert!(matches!(err, Error::NoSpace));

        let _ = fs::remove_dir_all(&dir_path);
    }
}
