//! The file block-chain engine: builds and traverses the direct /
//! single-indirect / double-indirect / triple-indirect pointer chain for a
//! file inode.
//!
//! Per the design notes, the three indirect tiers are **not** duplicated
//! three times. Tiers 1-3 are modeled as a pointer-tree of depth `1..=3`
//! over [`POINTERS_PER_BLOCK`]-ary nodes; [`FileChain::attach_recursive`],
//! [`FileChain::read_tier`], and [`FileChain::free_tier`] each walk that
//! tree once, parameterized by depth, instead of three near-identical
//! hand-unrolled copies.

use std::io::{Read, Write};

use crate::block::BlockManager;
use crate::error::{Error, Result};
use crate::inode::RawInode;
use crate::layout::{BLOCK_SIZE, MAX_DIRECT, NO_BLOCK, POINTERS_PER_BLOCK};
use crate::segment::SegmentStore;

/// Which indirection tier an out-of-direct-range data block belongs to.
enum Tier {
    Indirect,
    Double,
    Triple,
}

pub struct FileChain<'a> {
    store: &'a SegmentStore,
    blocks: &'a BlockManager,
}

impl<'a> FileChain<'a> {
    pub fn new(store: &'a SegmentStore, blocks: &'a BlockManager) -> Self {
        Self { store, blocks }
    }

    /// Streams `reader` into `inode` in `BLOCK_SIZE` chunks, building the
    /// pointer chain as it goes, zero-padding only the final short chunk.
    /// Sets `inode.size` to the total number of bytes consumed.
    pub fn write_stream(&self, inode: &mut RawInode, reader: &mut impl Read) -> Result<()> {
        let mut total = 0u64;
        let mut n = 0u64;
        loop {
            let mut buf = [0u8; BLOCK_SIZE];
            let filled = Self::fill_buf(reader, &mut buf)?;
            if filled == 0 {
                break;
            }
            let block_id = self.blocks.allocate(self.store)?;
            self.blocks.write(self.store, block_id, &buf)?;
            self.attach_block(inode, n, block_id)?;

            total += filled as u64;
            n += 1;
            if filled < BLOCK_SIZE {
                break;
            }
        }
        inode.set_size(total);
        Ok(())
    }

    /// Reads until `reader` is exhausted or `buf` is full, returning the
    /// number of bytes filled (less than `buf.len()` only at EOF).
    fn fill_buf(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        Ok(filled)
    }

    /// Emits `inode.size()` bytes to `writer`, traversing direct, then
    /// indirect, then double, then triple, stopping at the first zero
    /// entry at any indirect level (the unwritten-slot terminator).
    pub fn read_stream(&self, inode: &RawInode, writer: &mut impl Write) -> Result<()> {
        let mut remaining = inode.size();

        for &id in inode.direct_slice() {
            if remaining == 0 {
                break;
            }
            remaining = self.emit_block(id as u64, remaining, writer)?;
        }
        if remaining > 0 && inode.indirect() != NO_BLOCK {
            remaining = self.read_tier(inode.indirect() as u64, 1, remaining, writer)?;
        }
        if remaining > 0 && inode.double_indirect() != NO_BLOCK {
            remaining = self.read_tier(inode.double_indirect() as u64, 2, remaining, writer)?;
        }
        if remaining > 0 && inode.triple_indirect() != NO_BLOCK {
            self.read_tier(inode.triple_indirect() as u64, 3, remaining, writer)?;
        }
        Ok(())
    }

    fn emit_block(&self, block_id: u64, remaining: u64, writer: &mut impl Write) -> Result<u64> {
        let block = self.blocks.read(self.store, block_id)?;
        let n = remaining.min(BLOCK_SIZE as u64) as usize;
        writer.write_all(&block[..n])?;
        Ok(remaining - n as u64)
    }

    fn read_tier(&self, block_id: u64, depth: u32, mut remaining: u64, writer: &mut impl Write) -> Result<u64> {
        let ptrs = self.blocks.read_pointer_block(self.store, block_id)?;
        for &ptr in ptrs.iter() {
            if remaining == 0 || ptr == 0 {
                break;
            }
            remaining = if depth == 1 {
                self.emit_block(ptr as u64, remaining, writer)?
            } else {
                self.read_tier(ptr as u64, depth - 1, remaining, writer)?
            };
        }
        Ok(remaining)
    }

    /// Frees every block reachable from `inode`'s data chain: direct
    /// blocks, all three indirect tiers' data leaves, and every pointer
    /// block along the way. This fixes the original's leak, which freed
    /// only the single-indirect tier (see `DESIGN.md`).
    pub fn free_chain(&self, inode: &RawInode) -> Result<()> {
        for &id in inode.direct_slice() {
            self.blocks.free(self.store, id as u64)?;
        }
        if inode.indirect() != NO_BLOCK {
            self.free_tier(inode.indirect() as u64, 1)?;
        }
        if inode.double_indirect() != NO_BLOCK {
            self.free_tier(inode.double_indirect() as u64, 2)?;
        }
        if inode.triple_indirect() != NO_BLOCK {
            self.free_tier(inode.triple_indirect() as u64, 3)?;
        }
        Ok(())
    }

    fn free_tier(&self, block_id: u64, depth: u32) -> Result<()> {
        let ptrs = self.blocks.read_pointer_block(self.store, block_id)?;
        for &ptr in ptrs.iter() {
            if ptr == 0 {
                break;
            }
            if depth == 1 {
                self.blocks.free(self.store, ptr as u64)?;
            } else {
                self.free_tier(ptr as u64, depth - 1)?;
            }
        }
        self.blocks.free(self.store, block_id)
    }

    /// Attaches newly-written data block `block_id`, the `n`-th block
    /// appended to this file (0-based), to the correct tier of `inode`.
    fn attach_block(&self, inode: &mut RawInode, n: u64, block_id: u64) -> Result<()> {
        let p = POINTERS_PER_BLOCK as u64;
        let max_direct = MAX_DIRECT as u64;

        if n < max_direct {
            inode.push_direct(block_id as i32)?;
        } else if n < max_direct + p {
            self.attach_in_tier(inode, Tier::Indirect, 1, n - max_direct, block_id)?;
        } else if n < max_direct + p + p * p {
            self.attach_in_tier(inode, Tier::Double, 2, n - max_direct - p, block_id)?;
        } else if n < max_direct + p + p * p + p * p * p {
            self.attach_in_tier(inode, Tier::Triple, 3, n - max_direct - p - p * p, block_id)?;
        } else {
            return Err(Error::FileTooLarge);
        }
        Ok(())
    }

    /// Ensures `inode`'s tier-root pointer is allocated, then attaches
    /// `leaf_block_id` at the `index`-th leaf position within that tier.
    fn attach_in_tier(
        &self,
        inode: &mut RawInode,
        tier: Tier,
        depth: u32,
        index: u64,
        leaf_block_id: u64,
    ) -> Result<()> {
        let mut root = match tier {
            Tier::Indirect => inode.indirect(),
            Tier::Double => inode.double_indirect(),
            Tier::Triple => inode.triple_indirect(),
        };
        if root == NO_BLOCK {
            let id = self.blocks.allocate(self.store)?;
            self.blocks
                .write_pointer_block(self.store, id, &BlockManager::zeroed_pointer_block())?;
            root = id as i32;
            match tier {
                Tier::Indirect => inode.set_indirect(root),
                Tier::Double => inode.set_double_indirect(root),
                Tier::Triple => inode.set_triple_indirect(root),
            }
        }
        self.attach_recursive(root as u64, depth, index, leaf_block_id)
    }

    /// Descends `depth` levels of the pointer tree rooted at `block_id` to
    /// set leaf position `index` to `leaf_block_id`, allocating any
    /// missing intermediate pointer blocks along the way. Persists the
    /// innermost modified block first, then each ancestor on the way back
    /// up, matching the write order the design specifies for the
    /// double-indirect tier and generalizing it to the triple tier.
    fn attach_recursive(&self, block_id: u64, depth: u32, index: u64, leaf_block_id: u64) -> Result<()> {
        let mut ptrs = self.blocks.read_pointer_block(self.store, block_id)?;

        if depth == 1 {
            ptrs[index as usize] = leaf_block_id as i32;
            return self.blocks.write_pointer_block(self.store, block_id, &ptrs);
        }

        let p = POINTERS_PER_BLOCK as u64;
        let sub_capacity = p.pow(depth - 1);
        let slot = (index / sub_capacity) as usize;
        let sub_index = index % sub_capacity;

        let mut child_id = ptrs[slot];
        if child_id == 0 {
            let new_id = self.blocks.allocate(self.store)?;
            self.blocks
                .write_pointer_block(self.store, new_id, &BlockManager::zeroed_pointer_block())?;
            child_id = new_id as i32;
        }

        self.attach_recursive(child_id as u64, depth - 1, sub_index, leaf_block_id)?;

        ptrs[slot] = child_id;
        self.blocks.write_pointer_block(self.store, block_id, &ptrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::blocks_for_bytes;
    use std::fs;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn scratch_dir(tag: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!(
            "exfs2-chain-test-{tag}-{}-{:?}",
            std::process::id(),
            std::time::Instant::now()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn small_file_roundtrips_byte_identical() {
        let dir = scratch_dir("small-roundtrip");
        let store = SegmentStore::new(&dir);
        let blocks = BlockManager::new();
        let chain = FileChain::new(&store, &blocks);

        let content = b"hello, exfs2!";
        let mut inode = RawInode::new_file();
        chain
            .write_stream(&mut inode, &mut Cursor::new(content.to_vec()))
            .unwrap();
        assert_eq!(inode.size(), content.len() as u64);
        assert_eq!(inode.num_direct(), 1);

        let mut out = Vec::new();
        chain.read_stream(&inode, &mut out).unwrap();
        assert_eq!(out, content);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_file_has_no_blocks() {
        let dir = scratch_dir("empty");
        let store = SegmentStore::new(&dir);
        let blocks = BlockManager::new();
        let chain = FileChain::new(&store, &blocks);

        let mut inode = RawInode::new_file();
        chain.write_stream(&mut inode, &mut Cursor::new(Vec::new())).unwrap();
        assert_eq!(inode.size(), 0);
        assert_eq!(inode.num_direct(), 0);

        let mut out = Vec::new();
        chain.read_stream(&inode, &mut out).unwrap();
        assert!(out.is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn crossing_into_indirect_tier_roundtrips() {
        let dir = scratch_dir("indirect-crossing");
        let store = SegmentStore::new(&dir);
        let blocks = BlockManager::new();
        let chain = FileChain::new(&store, &blocks);

        // A few blocks past the direct capacity, to exercise the indirect tier.
        let block_count = MAX_DIRECT + 5;
        let content = vec![0x5Au8; block_count * BLOCK_SIZE - 17];
        let mut inode = RawInode::new_file();
        chain
            .write_stream(&mut inode, &mut Cursor::new(content.clone()))
            .unwrap();

        assert_eq!(inode.num_direct() as usize, MAX_DIRECT);
        assert_ne!(inode.indirect(), NO_BLOCK);
        assert_eq!(blocks_for_bytes(inode.size()) as usize, block_count);

        let mut out = Vec::new();
        chain.read_stream(&inode, &mut out).unwrap();
        assert_eq!(out, content);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn free_chain_releases_direct_and_indirect_blocks() {
        let dir = scratch_dir("free-chain");
        let store = SegmentStore::new(&dir);
        let blocks = BlockManager::new();
        let chain = FileChain::new(&store, &blocks);

        let content = vec![1u8; (MAX_DIRECT + 3) * BLOCK_SIZE];
        let mut inode = RawInode::new_file();
        chain.write_stream(&mut inode, &mut Cursor::new(content)).unwrap();
        let indirect_id = inode.indirect() as u64;
        assert!(blocks.is_allocated(&store, indirect_id).unwrap());

        chain.free_chain(&inode).unwrap();

        for &id in inode.direct_slice() {
            assert!(!blocks.is_allocated(&store, id as u64).unwrap());
        }
        assert!(!blocks.is_allocated(&store, indirect_id).unwrap());

        let _ = fs::remove_dir_all(&dir);
    }
}
