//! A WAL page reader over one shared WAL directory.

use crate::context::Context;
use crate::error::CoreResult;
use crate::severity::Severity;
use crate::xlog::{
    PreReadCache, PreReadOutcome, ReadSource, SegmentLocator, TimelineState, XLogRecPtr, XLogSegNo,
};
use sharedwal_storage::DeviceFile;
use std::path::PathBuf;

/// Result of reading one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRead {
    /// The page bytes were copied out.
    Read(usize),
    /// The device returned less than one pre-read unit.
    ShortRead {
        /// Bytes requested from the device.
        expected: usize,
        /// Bytes the device returned.
        actual: usize,
    },
    /// No candidate timeline holds the segment.
    NotFound,
}

#[derive(Debug)]
struct OpenSegment {
    segno: XLogSegNo,
    file: DeviceFile,
}

/// Reads WAL pages for one recovery or redo thread.
///
/// Owns its timeline bookkeeping, the open segment and its pre-read
/// cache; nothing here is shared with other readers.
#[derive(Debug)]
pub struct XLogReader {
    dir: PathBuf,
    locator: SegmentLocator,
    cache: PreReadCache,
    timeline: TimelineState,
    segment: Option<OpenSegment>,
    segment_size: u64,
}

impl XLogReader {
    /// Creates a reader over `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pre-read buffer cannot be allocated.
    pub fn new(ctx: &Context, dir: impl Into<PathBuf>, timeline: TimelineState) -> CoreResult<Self> {
        Ok(Self {
            dir: dir.into(),
            locator: SegmentLocator::new(ctx.config()),
            cache: PreReadCache::new(ctx)?,
            timeline,
            segment: None,
            segment_size: ctx.config().segment_size,
        })
    }

    /// Returns the reader's timeline bookkeeping.
    #[must_use]
    pub fn timeline(&self) -> &TimelineState {
        &self.timeline
    }

    /// Returns the pre-read cache.
    #[must_use]
    pub fn cache(&self) -> &PreReadCache {
        &self.cache
    }

    /// Returns the number of the open segment, if any.
    #[must_use]
    pub fn current_segment(&self) -> Option<XLogSegNo> {
        self.segment.as_ref().map(|s| s.segno)
    }

    /// Reads the page at `target_page` into `out`.
    ///
    /// Opens the segment holding `target_page` first if a different one
    /// (or none) is open, emptying the cache on the switch. A missing
    /// segment is reported at `severity`.
    ///
    /// # Errors
    ///
    /// Propagates fatal errors from the locator and the cache.
    pub fn read_page(
        &mut self,
        target_page: XLogRecPtr,
        target_rec: XLogRecPtr,
        out: &mut [u8],
        source: ReadSource,
        severity: Severity,
    ) -> CoreResult<PageRead> {
        let segno = target_page / self.segment_size;

        if self.current_segment() != Some(segno) {
            self.close_segment();
            let opened =
                self.locator
                    .open(&mut self.timeline, segno, severity, source, &self.dir)?;
            match opened {
                Some(file) => self.segment = Some(OpenSegment { segno, file }),
                None => return Ok(PageRead::NotFound),
            }
        }

        let Some(segment) = &self.segment else {
            return Ok(PageRead::NotFound);
        };
        let source = self.timeline.read_source.unwrap_or(source);

        let outcome = self
            .cache
            .read(&segment.file, source, target_page, target_rec, out)?;
        Ok(match outcome {
            PreReadOutcome::Copied(n) => PageRead::Read(n),
            PreReadOutcome::ShortRead { expected, actual } => {
                PageRead::ShortRead { expected, actual }
            }
        })
    }

    /// Closes the open segment and empties the cache.
    pub fn close_segment(&mut self) {
        self.segment = None;
        self.cache.invalidate();
    }
}
