//! Error types for the recovery core.

use crate::control::ControlCopy;
use crate::severity::Severity;
use sharedwal_storage::StorageError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
///
/// Every variant maps onto the [`Severity`] ladder through
/// [`CoreError::severity`]. Recoverable conditions (a missing endpoint, a
/// short pre-read) are not errors at all; they come back as ordinary
/// return values.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage I/O failed. Shared storage is assumed unreliable once this
    /// happens, so it is always process-fatal.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A control record failed checksum verification on both copies.
    #[error("incorrect checksum in {copy} control file \"{}\": expected {expected:08x}, got {actual:08x}", path.display())]
    Corruption {
        /// The copy that failed last.
        path: PathBuf,
        /// Which copy of the pair `path` is.
        copy: ControlCopy,
        /// Checksum stored in the record.
        expected: u32,
        /// Checksum computed over the record.
        actual: u32,
    },

    /// A checksum-valid record carries values this build cannot interpret.
    #[error("invalid control record format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Opening a WAL segment failed for a reason other than absence.
    #[error("could not open file \"{}\" (log segment {segment}): {source}", path.display())]
    SegmentOpen {
        /// The segment path that was tried.
        path: PathBuf,
        /// Segment file name on the reader's own timeline.
        segment: String,
        /// The underlying storage error.
        #[source]
        source: StorageError,
    },

    /// No candidate timeline held the segment, reported at a terminal severity.
    #[error("could not open file \"{}\" (log segment {segment}): not found", path.display())]
    SegmentNotFound {
        /// The path on the recovery target timeline.
        path: PathBuf,
        /// Segment file name on the reader's own timeline.
        segment: String,
        /// Severity the caller asked for.
        severity: Severity,
    },

    /// The shared-storage root could not be enumerated.
    #[error("error opening shared storage directory \"{}\": {source}", path.display())]
    DirectoryScan {
        /// The directory that was scanned.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Configuration is inconsistent.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted with the given arguments or state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns where this error sits on the severity ladder.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::Storage(_) | Self::SegmentOpen { .. } | Self::DirectoryScan { .. } => {
                Severity::Panic
            }
            Self::Corruption { .. }
            | Self::InvalidFormat { .. }
            | Self::InvalidConfig { .. }
            | Self::InvalidOperation { .. } => Severity::Fatal,
            Self::SegmentNotFound { severity, .. } => *severity,
        }
    }

    /// Logs this error at its own severity and hands it back.
    ///
    /// Used on the fatal path so the diagnostic reaches the log sink
    /// before the error unwinds to whoever terminates the process.
    #[must_use]
    pub fn report(self) -> Self {
        self.severity().log(&self);
        self
    }
}
