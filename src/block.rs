//! The block manager: symmetric to [`crate::inode::InodeManager`], but
//! slots are raw data bytes rather than inode records.

use crate::alloc::SlotAllocator;
use crate::error::Result;
use crate::layout::{BLOCK_SIZE, POINTERS_PER_BLOCK};
use crate::segment::{SegmentKind, SegmentStore};

/// Maps global block ids to `(segment, slot)` pairs and transfers
/// whole `BLOCK_SIZE` buffers.
pub struct BlockManager {
    alloc: SlotAllocator,
}

impl BlockManager {
    pub fn new() -> Self {
        Self {
            alloc: SlotAllocator::new(SegmentKind::Data),
        }
    }

    /// Allocates a free data block, creating a new data segment if every
    /// existing one is full. Returns the global block id.
    pub fn allocate(&self, store: &SegmentStore) -> Result<u64> {
        self.alloc.allocate(store)
    }

    /// Reads exactly `BLOCK_SIZE` bytes from block `id`.
    pub fn read(&self, store: &SegmentStore, id: u64) -> Result<[u8; BLOCK_SIZE]> {
        self.alloc.read(store, id)
    }

    /// Writes exactly `BLOCK_SIZE` bytes to block `id`.
    pub fn write(&self, store: &SegmentStore, id: u64, data: &[u8; BLOCK_SIZE]) -> Result<()> {
        self.alloc.write(store, id, data)
    }

    /// Clears the bitmap bit owning block `id`.
    pub fn free(&self, store: &SegmentStore, id: u64) -> Result<()> {
        self.alloc.free(store, id)
    }

    pub fn is_allocated(&self, store: &SegmentStore, id: u64) -> Result<bool> {
        self.alloc.is_allocated(store, id)
    }

    /// Reads block `id` and reinterprets it as an array of
    /// [`POINTERS_PER_BLOCK`] little-endian-independent (host-native) block
    /// ids — an indirect, double-indirect, or triple-indirect pointer
    /// block.
    pub fn read_pointer_block(&self, store: &SegmentStore, id: u64) -> Result<[i32; POINTERS_PER_BLOCK]> {
        let bytes = self.read(store, id)?;
        let mut out = [0i32; POINTERS_PER_BLOCK];
        for (i, chunk) in bytes.chunks_exact(4).enumerate() {
            out[i] = i32::from_ne_bytes(chunk.try_into().unwrap());
        }
        Ok(out)
    }

    /// Serializes an array of block ids and writes it to block `id`.
    pub fn write_pointer_block(
        &self,
        store: &SegmentStore,
        id: u64,
        ptrs: &[i32; POINTERS_PER_BLOCK],
    ) -> Result<()> {
        let mut bytes = [0u8; BLOCK_SIZE];
        for (chunk, ptr) in bytes.chunks_exact_mut(4).zip(ptrs.iter()) {
            chunk.copy_from_slice(&ptr.to_ne_bytes());
        }
        self.write(store, id, &bytes)
    }

    /// A pointer block with every entry zeroed (the indirect-chain
    /// terminator value), used when a new indirect/double/triple tier
    /// block is first allocated.
    pub fn zeroed_pointer_block() -> [i32; POINTERS_PER_BLOCK] {
        [0i32; POINTERS_PER_BLOCK]
    }
}

impl Default for BlockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn scratch_dir(tag: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!(
            "exfs2-block-test-{tag}-{}-{:?}",
            std::process::id(),
            std::time::Instant::now()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn pointer_block_roundtrip() {
        let dir = scratch_dir("ptr-roundtrip");
        let store = SegmentStore::new(&dir);
        let mgr = BlockManager::new();

        let id = mgr.allocate(&store).unwrap();
        let mut ptrs = BlockManager::zeroed_pointer_block();
        ptrs[0] = 10;
        ptrs[1] = 11;
        ptrs[1023] = 99;
        mgr.write_pointer_block(&store, id, &ptrs).unwrap();

        let back = mgr.read_pointer_block(&store, id).unwrap();
        assert_eq!(back[0], 10);
        assert_eq!(back[1], 11);
        assert_eq!(back[2], 0);
        assert_eq!(back[1023], 99);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn data_block_roundtrip() {
        let dir = scratch_dir("data-roundtrip");
        let store = SegmentStore::new(&dir);
        let mgr = BlockManager::new();

        let id = mgr.allocate(&store).unwrap();
        let mut data = [0u8; BLOCK_SIZE];
        data[..5].copy_from_slice(b"hello");
        mgr.write(&store, id, &data).unwrap();

        let back = mgr.read(&store, id).unwrap();
        assert_eq!(&back[..5], b"hello");

        let _ = fs::remove_dir_all(&dir);
    }
}
