//! WAL segment location and pre-read caching on shared storage.
//!
//! ## Segment Naming
//!
//! ```text
//! <dir>/<timeline:08X><log id:08X><segment in log id:08X>
//! ```
//!
//! A log id covers 4 GiB of WAL, so it holds `2^32 / segment_size` segments.
//!
//! ## Reading
//!
//! A reader owns one [`TimelineState`], at most one open segment, and one
//! [`PreReadCache`]. Pages are served from the cache; the cache refills
//! one pre-read unit at a time with a single positioned read.

mod locator;
mod preread;
mod reader;

pub use locator::{SegmentLocator, TimelineState};
pub use preread::{PreReadCache, PreReadOutcome, INVALID_PRE_READ_START};
pub use reader::{PageRead, XLogReader};

use std::fmt;

/// Byte position in the WAL stream.
pub type XLogRecPtr = u64;

/// Timeline identifier.
pub type TimeLineId = u32;

/// Segment number in the WAL stream.
pub type XLogSegNo = u64;

/// The invalid WAL position.
pub const INVALID_XLOG_REC_PTR: XLogRecPtr = 0;

/// Where a reader's WAL bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadSource {
    /// Restored from the archive.
    Archive,
    /// Read from the WAL directory.
    PgXlog,
    /// Written by the log receiver while streaming.
    Stream,
}

impl fmt::Display for ReadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Archive => "archive",
            Self::PgXlog => "pg_xlog",
            Self::Stream => "stream",
        };
        f.write_str(name)
    }
}

/// Returns the canonical segment file name.
#[must_use]
pub fn segment_file_name(tli: TimeLineId, segno: XLogSegNo, segments_per_log_id: u64) -> String {
    format!(
        "{:08X}{:08X}{:08X}",
        tli,
        segno / segments_per_log_id,
        segno % segments_per_log_id
    )
}
