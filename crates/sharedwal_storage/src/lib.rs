//! # SharedWAL Storage
//!
//! Lowest-level I/O primitives for the shared-storage recovery core.
//!
//! This crate knows nothing about WAL segments, timelines, or control
//! records. It provides exactly two things:
//!
//! - [`AlignedBuf`] - a zero-filled buffer whose usable view starts on a
//!   requested alignment boundary, for block devices that reject unaligned I/O
//! - [`DeviceFile`] - a file handle that only does positioned reads and writes,
//!   so several readers never race on a shared seek cursor
//!
//! ## Example
//!
//! ```rust
//! use sharedwal_storage::{align_up, AlignedBuf};
//!
//! let mut buf = AlignedBuf::new(align_up(20, 32), 32).unwrap();
//! assert_eq!(buf.len(), 32);
//! assert!(buf.is_aligned());
//! buf.as_mut_slice()[0] = 7;
//! assert_eq!(buf.as_slice()[0], 7);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod aligned;
mod error;
mod file;

pub use aligned::{align_up, AlignedBuf};
pub use error::{StorageError, StorageResult};
pub use file::{DeviceFile, OpenMode};
