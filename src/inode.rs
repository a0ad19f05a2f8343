//! Inode records and the inode manager.
//!
//! [`RawInode`] is the exact on-disk layout: a `#[repr(C)]` struct
//! transferred to and from a segment slot as raw bytes, the same technique
//! `mkfs::ext2`'s `Superblock`/`INode` types use (copy through a properly
//! aligned struct's own byte view, never cast an unaligned byte buffer to a
//! struct pointer). [`InodeManager`] adds inode-shaped (de)serialization on
//! top of the shared [`SlotAllocator`].

use std::mem::{self, size_of};
use std::slice;

use crate::alloc::SlotAllocator;
use crate::error::Result;
use crate::layout::{BLOCK_SIZE, MAX_DIRECT, NO_BLOCK};
use crate::segment::{SegmentKind, SegmentStore};

/// The tag stored in [`RawInode::type_`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InodeType {
    Free,
    File,
    Directory,
}

impl InodeType {
    fn from_raw(v: u32) -> Self {
        match v {
            1 => Self::File,
            2 => Self::Directory,
            _ => Self::Free,
        }
    }

    fn to_raw(self) -> u32 {
        match self {
            Self::Free => 0,
            Self::File => 1,
            Self::Directory => 2,
        }
    }
}

/// The exact on-disk inode record. Deliberately sized so that
/// `size_of::<RawInode>() == BLOCK_SIZE`: a `#[repr(C)]` struct keeps the
/// bytes a direct, offset-stable transfer target, while `kind()`/
/// `is_file()`/`is_directory()` give the tagged-union ergonomics the design
/// notes ask for without introducing a Rust `enum` field (which would make
/// transferring raw, possibly-garbage bytes from disk into the record
/// undefined behavior).
///
/// `size` is declared first because it is the only 8-byte-aligned field:
/// placing it after the leading `u32`s would force the compiler to insert 4
/// bytes of padding to satisfy its alignment, pushing the record to 4104
/// bytes and breaking the one-record-per-block invariant the allocator
/// relies on. With `size` first, every field falls on its natural
/// alignment with no padding anywhere, so the layout below is the exact 4
/// (type) + 8 (size) + 4 (num_direct) + 1017*4 (direct) + 4*3 (indirect
/// pointers) = 4096 bytes the rest of the crate assumes.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct RawInode {
    size: u64,
    type_: u32,
    num_direct: u32,
    direct: [i32; MAX_DIRECT],
    indirect: i32,
    double_indirect: i32,
    triple_indirect: i32,
}

impl RawInode {
    /// A record with every pointer field unpopulated, used as the starting
    /// point for both file and directory inodes.
    fn blank(type_: InodeType) -> Self {
        Self {
            type_: type_.to_raw(),
            size: 0,
            num_direct: 0,
            direct: [NO_BLOCK; MAX_DIRECT],
            indirect: NO_BLOCK,
            double_indirect: NO_BLOCK,
            triple_indirect: NO_BLOCK,
        }
    }

    pub fn new_file() -> Self {
        Self::blank(InodeType::File)
    }

    pub fn new_directory() -> Self {
        Self::blank(InodeType::Directory)
    }

    pub fn kind(&self) -> InodeType {
        InodeType::from_raw(self.type_)
    }

    pub fn is_free(&self) -> bool {
        self.kind() == InodeType::Free
    }

    pub fn is_file(&self) -> bool {
        self.kind() == InodeType::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind() == InodeType::Directory
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    pub fn add_size(&mut self, delta: u64) {
        self.size += delta;
    }

    pub fn num_direct(&self) -> u32 {
        self.num_direct
    }

    pub fn direct_slice(&self) -> &[i32] {
        &self.direct[..self.num_direct as usize]
    }

    /// All `MAX_DIRECT` slots, including unused trailing `NO_BLOCK` entries.
    /// Used by the directory module, which scans every populated slot for a
    /// free entry rather than stopping at the logical end.
    pub fn direct_all(&self) -> &[i32; MAX_DIRECT] {
        &self.direct
    }

    pub fn direct_all_mut(&mut self) -> &mut [i32; MAX_DIRECT] {
        &mut self.direct
    }

    pub fn push_direct(&mut self, block_id: i32) -> Result<()> {
        if self.num_direct as usize >= MAX_DIRECT {
            return Err(crate::error::Error::NoSpace);
        }
        self.direct[self.num_direct as usize] = block_id;
        self.num_direct += 1;
        Ok(())
    }

    pub fn indirect(&self) -> i32 {
        self.indirect
    }

    pub fn set_indirect(&mut self, id: i32) {
        self.indirect = id;
    }

    pub fn double_indirect(&self) -> i32 {
        self.double_indirect
    }

    pub fn set_double_indirect(&mut self, id: i32) {
        self.double_indirect = id;
    }

    pub fn triple_indirect(&self) -> i32 {
        self.triple_indirect
    }

    pub fn set_triple_indirect(&mut self, id: i32) {
        self.triple_indirect = id;
    }

    fn from_bytes(bytes: &[u8; BLOCK_SIZE]) -> Self {
        let mut rec: Self = unsafe { mem::zeroed() };
        let dst = unsafe {
            slice::from_raw_parts_mut(&mut rec as *mut Self as *mut u8, size_of::<Self>())
        };
        dst.copy_from_slice(bytes);
        rec
    }

    fn to_bytes(self) -> [u8; BLOCK_SIZE] {
        let mut buf = [0u8; BLOCK_SIZE];
        let src =
            unsafe { slice::from_raw_parts(&self as *const Self as *const u8, size_of::<Self>()) };
        buf.copy_from_slice(src);
        buf
    }
}

/// Maps global inode ids to `(segment, slot)` pairs and transfers
/// [`RawInode`] records.
pub struct InodeManager {
    alloc: SlotAllocator,
}

impl InodeManager {
    pub fn new() -> Self {
        Self {
            alloc: SlotAllocator::new(SegmentKind::Inode),
        }
    }

    /// Allocates a free inode slot, creating a new inode segment if every
    /// existing one is full. Returns the global inode id.
    pub fn allocate(&self, store: &SegmentStore) -> Result<u64> {
        self.alloc.allocate(store)
    }

    pub fn read(&self, store: &SegmentStore, id: u64) -> Result<RawInode> {
        let bytes = self.alloc.read(store, id)?;
        Ok(RawInode::from_bytes(&bytes))
    }

    pub fn write(&self, store: &SegmentStore, id: u64, rec: &RawInode) -> Result<()> {
        self.alloc.write(store, id, &rec.to_bytes())
    }

    /// Clears the owning segment's bitmap bit. The caller must have already
    /// freed any data/indirect blocks the inode referenced.
    pub fn free(&self, store: &SegmentStore, id: u64) -> Result<()> {
        self.alloc.free(store, id)
    }

    pub fn is_allocated(&self, store: &SegmentStore, id: u64) -> Result<bool> {
        self.alloc.is_allocated(store, id)
    }
}

impl Default for InodeManager {
    fn default() -> Self {
        Self::new()
    }
}
