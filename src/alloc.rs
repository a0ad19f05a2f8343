//! A single slot-allocation algorithm shared by the inode manager and the
//! block manager.
//!
//! Both managers scan segments in ascending order, create a fresh segment
//! when the last one is full, and address a `BLOCK_SIZE`-byte slot by
//! `(segment, index-in-segment)`. They differ only in what the slot bytes
//! mean — an inode record for one, a raw data block for the other — so
//! this type does the bookkeeping once and [`crate::inode::InodeManager`]
//! / [`crate::block::BlockManager`] add the (de)serialization on top. This
//! is the "arena + index" shape called out in the design notes.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::bitmap::Bitmap;
use crate::error::Result;
use crate::layout::{BLOCK_SIZE, SLOTS_PER_SEGMENT};
use crate::segment::{SegmentKind, SegmentStore};

/// A slot-addressed allocator over segments of one [`SegmentKind`].
pub struct SlotAllocator {
    kind: SegmentKind,
}

impl SlotAllocator {
    pub fn new(kind: SegmentKind) -> Self {
        Self { kind }
    }

    /// Splits a global slot id into `(segment number, index within segment)`.
    fn locate(id: u64) -> (u64, usize) {
        let per_seg = SLOTS_PER_SEGMENT as u64;
        (id / per_seg, (id % per_seg) as usize)
    }

    /// Byte offset of slot `index` within a segment's body.
    fn slot_offset(index: usize) -> u64 {
        (BLOCK_SIZE + index * BLOCK_SIZE) as u64
    }

    /// Scans segments in ascending order for the first clear bit, creating
    /// a new segment on demand when every existing one is full. Returns the
    /// newly-occupied global slot id.
    pub fn allocate(&self, store: &SegmentStore) -> Result<u64> {
        let mut seg_no = 0u64;
        loop {
            let mut file = if store.exists(self.kind, seg_no) {
                store.open(self.kind, seg_no)?
            } else {
                store.create(self.kind, seg_no)?
            };

            let mut header = [0u8; BLOCK_SIZE];
            file.read_exact(&mut header)?;
            let mut bitmap = Bitmap::from_bytes(header);

            if let Some(bit) = bitmap.find_first_clear(SLOTS_PER_SEGMENT) {
                bitmap.set(bit);
                file.seek(SeekFrom::Start(0))?;
                file.write_all(bitmap.as_bytes())?;
                file.flush()?;
                return Ok(seg_no * SLOTS_PER_SEGMENT as u64 + bit as u64);
            }

            seg_no += 1;
        }
    }

    /// Reads the raw bytes of slot `id`.
    pub fn read(&self, store: &SegmentStore, id: u64) -> Result<[u8; BLOCK_SIZE]> {
        let (seg_no, index) = Self::locate(id);
        let mut file = store.open(self.kind, seg_no)?;
        file.seek(SeekFrom::Start(Self::slot_offset(index)))?;
        let mut buf = [0u8; BLOCK_SIZE];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Overwrites the raw bytes of slot `id`.
    pub fn write(&self, store: &SegmentStore, id: u64, bytes: &[u8; BLOCK_SIZE]) -> Result<()> {
        let (seg_no, index) = Self::locate(id);
        let mut file = store.open(self.kind, seg_no)?;
        file.seek(SeekFrom::Start(Self::slot_offset(index)))?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(())
    }

    /// Clears the bitmap bit owning slot `id`. Slot contents are left
    /// untouched; a later `allocate` will hand the slot back without
    /// zeroing it first.
    pub fn free(&self, store: &SegmentStore, id: u64) -> Result<()> {
        let (seg_no, index) = Self::locate(id);
        let mut file = store.open(self.kind, seg_no)?;
        let mut header = [0u8; BLOCK_SIZE];
        file.read_exact(&mut header)?;
        let mut bitmap = Bitmap::from_bytes(header);
        bitmap.clear(index);
        file.seek(SeekFrom::Start(0))?;
        file.write_all(bitmap.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Tells whether slot `id`'s bitmap bit is set. Used by invariant
    /// checks and `debug` output, not by the hot allocate/free path.
    pub fn is_allocated(&self, store: &SegmentStore, id: u64) -> Result<bool> {
        let (seg_no, index) = Self::locate(id);
        if !store.exists(self.kind, seg_no) {
            return Ok(false);
        }
        let mut file = store.open(self.kind, seg_no)?;
        let mut header = [0u8; BLOCK_SIZE];
        file.read_exact(&mut header)?;
        Ok(Bitmap::from_bytes(header).is_set(index))
    }
}
