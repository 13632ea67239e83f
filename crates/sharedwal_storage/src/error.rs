//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// Every variant that touches a file carries the path, so callers can
/// report the failing file alongside the OS error.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error not tied to a particular file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Opening a file failed.
    #[error("could not open file \"{}\": {source}", path.display())]
    Open {
        /// The file that could not be opened.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A positioned read failed.
    #[error("could not read from file \"{}\" at offset {offset}: {source}", path.display())]
    Read {
        /// The file being read.
        path: PathBuf,
        /// The requested read offset.
        offset: u64,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A positioned write failed.
    #[error("could not write to file \"{}\" at offset {offset}: {source}", path.display())]
    Write {
        /// The file being written.
        path: PathBuf,
        /// The requested write offset.
        offset: u64,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Flushing data to stable storage failed while releasing a handle.
    #[error("could not sync file \"{}\": {source}", path.display())]
    Sync {
        /// The file being synced.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A read returned fewer bytes than requested.
    #[error("short read from file \"{}\" at offset {offset}: expected {expected} bytes, got {actual}", path.display())]
    ShortRead {
        /// The file being read.
        path: PathBuf,
        /// The requested read offset.
        offset: u64,
        /// Bytes requested.
        expected: usize,
        /// Bytes actually returned.
        actual: usize,
    },

    /// An alignment that is neither zero nor a power of two was requested.
    #[error("invalid buffer alignment: {0}")]
    InvalidAlignment(usize),
}

impl StorageError {
    /// Returns `true` if this error means the file does not exist (yet).
    ///
    /// Segment lookup treats such failures as "try another timeline";
    /// every other open failure is a storage fault.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Open { source, .. } | Self::Io(source) => {
                source.kind() == io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}
