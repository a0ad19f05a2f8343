//! Error type shared by every ExFS2 module.
//!
//! The teacher workspace (`mkfs`, `fdisk`, `mount`) has no `thiserror` or
//! `anyhow` dependency anywhere; it hand-rolls `io::Result` plumbing and the
//! occasional bespoke error type. ExFS2 follows the same convention: one
//! plain enum, a hand-written `Display`, and a `From<std::io::Error>` so
//! internal code can keep using `?`.

use std::fmt;
use std::io;

/// An error produced by an ExFS2 operation.
#[derive(Debug)]
pub enum Error {
    /// A host file I/O operation failed (open, read, write, seek, create).
    Io(io::Error),
    /// A path component, directory entry, or expected segment is absent.
    NotFound,
    /// `add` targeted a name that already exists in its parent directory.
    AlreadyExists,
    /// A path component was expected to be a directory but was not.
    NotADirectory,
    /// A directory cannot grow further (`num_direct` reached `MAX_DIRECT`).
    NoSpace,
    /// A file would need more data blocks than the triple-indirect tier can
    /// address.
    FileTooLarge,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::NotFound => write!(f, "not found"),
            Self::AlreadyExists => write!(f, "already exists"),
            Self::NotADirectory => write!(f, "not a directory"),
            Self::NoSpace => write!(f, "no space left"),
            Self::FileTooLarge => write!(f, "file too large"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
