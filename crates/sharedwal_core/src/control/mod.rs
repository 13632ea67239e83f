//! Cluster control records and their dual-file store.
//!
//! ## Control File Layout
//!
//! ```text
//! page 0 .. 63   per-instance checkpoint control records
//! page 64        reform control record
//! ```
//!
//! Each page is `block_size` bytes. Only the first
//! `align_up(record_len, buffer_alignment)` bytes of a page are read or written.
//!
//! ## Record Format
//!
//! ```text
//! | body (N) | crc32c (4) |
//! ```
//!
//! The CRC32C covers every body byte. A record is never handed out before
//! its checksum has been recomputed and compared.
//!
//! ## Redundancy
//!
//! The same page lives in two files: the primary and `<primary>.backup`.
//! Writes go to the backup first, then the primary. Reads try the primary
//! first and fall back to the backup only when the primary's checksum fails.

mod record;
mod store;

pub use record::{
    encode_record, verify_record, CheckpointControl, ClusterStatus, ControlRecord,
    ReformerControl, Verification, CHECKSUM_LEN,
};
pub use store::{ControlCopy, ControlFileStore};
