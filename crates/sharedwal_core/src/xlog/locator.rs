//! Timeline-aware WAL segment lookup.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::severity::Severity;
use crate::xlog::{segment_file_name, ReadSource, TimeLineId, XLogSegNo};
use sharedwal_storage::{DeviceFile, OpenMode};
use std::path::Path;
use std::time::SystemTime;
use tracing::debug;

/// Read-source bookkeeping owned by one WAL reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineState {
    /// Candidate timelines, newest first.
    pub expected_tlis: Vec<TimeLineId>,
    /// Timeline of the currently adopted segment file.
    pub cur_file_tli: TimeLineId,
    /// Timeline recovery is heading for.
    pub recovery_target_tli: TimeLineId,
    /// Timeline this reader replays on.
    pub this_tli: TimeLineId,
    /// Source of the segment currently being read.
    pub read_source: Option<ReadSource>,
    /// Source of the last received data.
    pub receipt_source: Option<ReadSource>,
    /// When data was last received, unless the source tracks this itself.
    pub receipt_time: Option<SystemTime>,
}

impl TimelineState {
    /// Creates state for the given candidates (newest first).
    ///
    /// The recovery target and the reader's own timeline default to the
    /// newest candidate; no file timeline has been adopted yet.
    #[must_use]
    pub fn new(expected_tlis: Vec<TimeLineId>) -> Self {
        let newest = expected_tlis.first().copied().unwrap_or(0);
        Self {
            expected_tlis,
            cur_file_tli: 0,
            recovery_target_tli: newest,
            this_tli: newest,
            read_source: None,
            receipt_source: None,
            receipt_time: None,
        }
    }
}

/// Finds WAL segments across candidate timelines.
#[derive(Debug, Clone)]
pub struct SegmentLocator {
    segments_per_log_id: u64,
    dual_site_replication: bool,
}

impl SegmentLocator {
    /// Creates a locator for the configured segment size and topology.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            segments_per_log_id: config.segments_per_log_id(),
            dual_site_replication: config.dual_site_replication,
        }
    }

    /// Returns the number of segments in one log id.
    #[must_use]
    pub fn segments_per_log_id(&self) -> u64 {
        self.segments_per_log_id
    }

    /// Opens segment `segno` from `dir` on the newest usable timeline.
    ///
    /// Candidates older than the adopted file timeline are never tried.
    /// On success the candidate becomes the adopted timeline and `source`
    /// is recorded in `state`.
    ///
    /// Returns `Ok(None)` if no candidate holds the segment and `severity`
    /// is not terminal. In the dual-site topology all WAL directories share
    /// one LUN, so a failed open on the first candidate ends the search.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SegmentOpen`] if an open fails for any reason
    /// other than absence, or [`CoreError::SegmentNotFound`] if nothing
    /// was found and `severity` is terminal.
    pub fn open(
        &self,
        state: &mut TimelineState,
        segno: XLogSegNo,
        severity: Severity,
        source: ReadSource,
        dir: &Path,
    ) -> CoreResult<Option<DeviceFile>> {
        let candidates = state.expected_tlis.clone();

        for tli in candidates {
            if tli < state.cur_file_tli {
                break;
            }

            let path = dir.join(segment_file_name(tli, segno, self.segments_per_log_id));
            match DeviceFile::open(&path, OpenMode::ReadOnly) {
                Ok(file) => {
                    state.cur_file_tli = tli;
                    state.read_source = Some(source);
                    state.receipt_source = Some(source);
                    if source != ReadSource::Stream {
                        state.receipt_time = Some(SystemTime::now());
                    }
                    debug!(path = %path.display(), %source, "opened WAL segment");
                    return Ok(Some(file));
                }
                Err(_) if self.dual_site_replication => {
                    debug!(path = %path.display(), "segment absent from shared WAL directory");
                    return Ok(None);
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    return Err(CoreError::SegmentOpen {
                        path,
                        segment: self.name_on(state.this_tli, segno),
                        source: err,
                    }
                    .report());
                }
            }
        }

        let err = CoreError::SegmentNotFound {
            path: dir.join(self.name_on(state.recovery_target_tli, segno)),
            segment: self.name_on(state.this_tli, segno),
            severity,
        };
        if severity.is_terminal() {
            return Err(err.report());
        }
        severity.log(&err);
        Ok(None)
    }

    fn name_on(&self, tli: TimeLineId, segno: XLogSegNo) -> String {
        segment_file_name(tli, segno, self.segments_per_log_id)
    }
}
