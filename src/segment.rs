//! Opens and creates the fixed-size backing files that hold all ExFS2
//! state.
//!
//! A segment is addressed purely by `(kind, seg_no)` — there is no
//! long-lived handle cache here or anywhere else in the crate (§5 of the
//! design: "open, operate, close" per primitive call).

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::layout::SEGMENT_SIZE;

/// Distinguishes the two segment families. Segments of either kind share
/// the same on-disk shape (a header bitmap block followed by
/// [`crate::layout::SLOTS_PER_SEGMENT`] slots); only the naming convention
/// and the interpretation of the slots differ.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SegmentKind {
    Inode,
    Data,
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self {
            Self::Inode => "inode_seg_",
            Self::Data => "data_seg_",
        };
        write!(f, "{prefix}")
    }
}

/// Owns the directory under which segment files are created, and knows how
/// to name, open, and create them.
pub struct SegmentStore {
    root_dir: PathBuf,
}

impl SegmentStore {
    /// Builds a store rooted at `root_dir`. The directory itself is not
    /// created here; the caller is expected to have it already (the CLI
    /// uses the process's current working directory, as specified).
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Path of segment `seg_no` of kind `kind`, following the
    /// `inode_seg_<n>` / `data_seg_<n>` naming convention.
    pub fn path(&self, kind: SegmentKind, seg_no: u64) -> PathBuf {
        self.root_dir.join(format!("{kind}{seg_no}"))
    }

    /// Tells whether segment `seg_no` of kind `kind` exists.
    pub fn exists(&self, kind: SegmentKind, seg_no: u64) -> bool {
        self.path(kind, seg_no).exists()
    }

    /// Returns the number of segments of kind `kind` that currently exist,
    /// by probing `inode_seg_0`, `inode_seg_1`, ... until one is missing.
    /// Re-derived on demand rather than persisted anywhere, as in the
    /// original implementation.
    pub fn segment_count(&self, kind: SegmentKind) -> u64 {
        let mut n = 0u64;
        while self.exists(kind, n) {
            n += 1;
        }
        n
    }

    /// Opens an existing segment for reading and writing.
    pub fn open(&self, kind: SegmentKind, seg_no: u64) -> Result<File> {
        let path = self.path(kind, seg_no);
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::NotFound
                } else {
                    Error::Io(e)
                }
            })
    }

    /// Creates a brand-new segment of `SEGMENT_SIZE` zero bytes and
    /// flushes it. Returns the open handle, positioned at the start of the
    /// file, so the caller can immediately populate the header bitmap (and,
    /// for `inode_seg_0`, the root inode).
    pub fn create(&self, kind: SegmentKind, seg_no: u64) -> Result<File> {
        let path = self.path(kind, seg_no);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.write_all(&vec![0u8; SEGMENT_SIZE])?;
        file.flush()?;
        file.seek(SeekFrom::Start(0))?;
        Ok(file)
    }

    /// Ensures the directory that will hold segment files exists.
    pub fn ensure_root_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.root_dir)?;
        Ok(())
    }

    /// The directory segments are created under.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::BLOCK_SIZE;
    use std::io::Read;

    fn scratch_dir(tag: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!(
            "exfs2-segment-test-{tag}-{}-{:?}",
            std::process::id(),
            std::time::Instant::now()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn naming_convention() {
        let store = SegmentStore::new("/tmp/whatever");
        assert_eq!(
            store.path(SegmentKind::Inode, 3),
            PathBuf::from("/tmp/whatever/inode_seg_3")
        );
        assert_eq!(
            store.path(SegmentKind::Data, 0),
            PathBuf::from("/tmp/whatever/data_seg_0")
        );
    }

    #[test]
    fn create_then_open_is_zero_filled_and_full_size() {
        let dir = scratch_dir("create-open");
        let store = SegmentStore::new(&dir);
        store.create(SegmentKind::Data, 0).unwrap();
        assert!(store.exists(SegmentKind::Data, 0));
        assert!(!store.exists(SegmentKind::Data, 1));

        let mut file = store.open(SegmentKind::Data, 0).unwrap();
        let mut header = [0u8; BLOCK_SIZE];
        file.read_exact(&mut header).unwrap();
        assert!(header.iter().all(|&b| b == 0));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn open_missing_segment_is_not_found() {
        let dir = scratch_dir("open-missing");
        let store = SegmentStore::new(&dir);
        assert!(matches!(
            store.open(SegmentKind::Inode, 0),
            Err(Error::NotFound)
        ));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn segment_count_grows_with_creation() {
        let dir = scratch_dir("count");
        let store = SegmentStore::new(&dir);
        assert_eq!(store.segment_count(SegmentKind::Inode), 0);
        store.create(SegmentKind::Inode, 0).unwrap();
        assert_eq!(store.segment_count(SegmentKind::Inode), 1);
        store.create(SegmentKind::Inode, 1).unwrap();
        assert_eq!(store.segment_count(SegmentKind::Inode), 2);
        let _ = fs::remove_dir_all(&dir);
    }
}
