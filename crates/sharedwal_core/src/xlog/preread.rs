//! Per-reader read-ahead window over one WAL segment.

use crate::context::{Context, ReplicationProgress};
use crate::error::{CoreError, CoreResult};
use crate::xlog::{ReadSource, XLogRecPtr, INVALID_XLOG_REC_PTR};
use sharedwal_storage::{AlignedBuf, DeviceFile};
use std::sync::Arc;
use tracing::trace;

/// Window start of an empty cache.
pub const INVALID_PRE_READ_START: XLogRecPtr = XLogRecPtr::MAX;

/// Result of a pre-read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreReadOutcome {
    /// The requested bytes were copied out.
    Copied(usize),
    /// The device returned less than one pre-read unit. Not fatal; the
    /// caller retries on its own schedule.
    ShortRead {
        /// Bytes requested from the device.
        expected: usize,
        /// Bytes the device returned.
        actual: usize,
    },
}

/// Read-ahead cache owned by exactly one WAL reader.
///
/// Holds one pre-read unit of a segment in an aligned buffer. Reads that
/// fall inside the window are served from memory; anything else refills
/// the window with one positioned read of exactly one unit.
///
/// # Follower Staleness
///
/// On the real-time follower another node is still appending to the
/// segment, and a window fetched moments ago can hold zeroes where a
/// record was being flushed. The follower therefore re-fetches even
/// inside the window unless the source is streaming, recovery is done,
/// and the target record lies below the last confirmed flush position.
///
/// # Thread Safety
///
/// Not shared: all access goes through `&mut self`.
#[derive(Debug)]
pub struct PreReadCache {
    buf: AlignedBuf,
    window_start: XLogRecPtr,
    confirmed_flush: XLogRecPtr,
    unit: u64,
    segment_size: u64,
    follower: bool,
    progress: Arc<ReplicationProgress>,
    fetches: u64,
}

impl PreReadCache {
    /// Allocates a cache sized and aligned per the context's config.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer cannot be allocated at the
    /// configured alignment.
    pub fn new(ctx: &Context) -> CoreResult<Self> {
        let config = ctx.config();
        let buf = AlignedBuf::new(config.pre_read_size, config.buffer_alignment)?;

        Ok(Self {
            buf,
            window_start: INVALID_PRE_READ_START,
            confirmed_flush: INVALID_XLOG_REC_PTR,
            unit: config.pre_read_size as u64,
            segment_size: config.segment_size,
            follower: config.realtime_follower,
            progress: Arc::clone(ctx.progress()),
            fetches: 0,
        })
    }

    /// Returns the pre-read unit size.
    #[must_use]
    pub fn unit_size(&self) -> usize {
        self.buf.len()
    }

    /// Returns the window start, or `None` if the cache is empty.
    #[must_use]
    pub fn window_start(&self) -> Option<XLogRecPtr> {
        (self.window_start != INVALID_PRE_READ_START).then_some(self.window_start)
    }

    /// Returns the flush position last confirmed from the log receiver.
    #[must_use]
    pub fn confirmed_flush_ptr(&self) -> XLogRecPtr {
        self.confirmed_flush
    }

    /// Returns how many device reads this cache has issued.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.fetches
    }

    /// Returns `true` if `ptr` lies inside the current window.
    #[must_use]
    pub fn in_window(&self, ptr: XLogRecPtr) -> bool {
        self.window_start != INVALID_PRE_READ_START
            && ptr >= self.window_start
            && ptr - self.window_start < self.unit
    }

    /// Empties the window. Called when the reader switches segments.
    pub fn invalidate(&mut self) {
        self.window_start = INVALID_PRE_READ_START;
    }

    /// Copies `out.len()` bytes starting at `target_page` into `out`.
    ///
    /// `target_rec` is the record the caller is decoding; only the follower
    /// staleness rule looks at it. `source` is where the open segment came
    /// from.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the request is empty or
    /// spans more than one pre-read unit, and a storage error if the
    /// device read fails outright.
    pub fn read(
        &mut self,
        file: &DeviceFile,
        source: ReadSource,
        target_page: XLogRecPtr,
        target_rec: XLogRecPtr,
        out: &mut [u8],
    ) -> CoreResult<PreReadOutcome> {
        let len = out.len();
        let unit_off = target_page % self.unit;
        if len == 0 || unit_off + len as u64 > self.unit {
            return Err(CoreError::invalid_operation(format!(
                "pre-read of {len} bytes at {target_page:X} does not fit one {} byte unit",
                self.unit
            )));
        }

        if !self.is_trusted(target_page, target_rec, source) {
            if let Some(short) = self.fetch(file, target_page)? {
                return Ok(short);
            }
        }

        let off = unit_off as usize;
        out.copy_from_slice(&self.buf.as_slice()[off..off + len]);
        Ok(PreReadOutcome::Copied(len))
    }

    fn is_trusted(&self, target_page: XLogRecPtr, target_rec: XLogRecPtr, source: ReadSource) -> bool {
        if !self.in_window(target_page) {
            return false;
        }
        if !self.follower {
            return true;
        }

        let streaming = source == ReadSource::Stream;
        let unflushed = streaming && target_rec >= self.confirmed_flush;
        let catching_up = !self.progress.is_recovery_done();

        !(unflushed || catching_up || !streaming)
    }

    /// Refills the window around `target_page`. Returns the short-read
    /// outcome if the device did not return a full unit.
    fn fetch(
        &mut self,
        file: &DeviceFile,
        target_page: XLogRecPtr,
    ) -> CoreResult<Option<PreReadOutcome>> {
        if self.follower {
            self.confirmed_flush = self.progress.receiver_write_ptr();
        }

        let seg_off = target_page % self.segment_size;
        let read_off = seg_off - seg_off % self.unit;

        self.fetches += 1;
        let actual = file
            .read_at(self.buf.as_mut_slice(), read_off)
            .map_err(|e| CoreError::from(e).report())?;

        if actual as u64 != self.unit {
            // The buffer now mixes old and new bytes.
            self.invalidate();
            return Ok(Some(PreReadOutcome::ShortRead {
                expected: self.buf.len(),
                actual,
            }));
        }

        self.window_start = target_page - seg_off % self.unit;
        trace!(window_start = self.window_start, read_off, "pre-read window refilled");
        Ok(None)
    }
}
