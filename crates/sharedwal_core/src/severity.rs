//! Fault severity ladder.

use std::fmt;

/// Severity of a reported fault, ordered from least to most severe.
///
/// `Fatal` aborts the current operation (and the thread performing it);
/// `Panic` aborts the whole process. The core never terminates anything
/// itself: it logs the report and hands the classified error back, and
/// the embedding process decides how to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Informational.
    Info,
    /// Recoverable; prior state is kept.
    Warning,
    /// Abort the current operation.
    Fatal,
    /// Abort the process.
    Panic,
}

impl Severity {
    /// Returns `true` for the two severities that terminate the caller.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Fatal | Self::Panic)
    }

    /// Emits `message` to the log sink at this severity.
    pub fn log(self, message: &dyn fmt::Display) {
        match self {
            Self::Info => tracing::info!("{message}"),
            Self::Warning => tracing::warn!("{message}"),
            Self::Fatal => tracing::error!(severity = "FATAL", "{message}"),
            Self::Panic => tracing::error!(severity = "PANIC", "{message}"),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Fatal => "FATAL",
            Self::Panic => "PANIC",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_is_ordered() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Fatal);
        assert!(Severity::Fatal < Severity::Panic);
    }

    #[test]
    fn only_top_two_terminate() {
        assert!(!Severity::Info.is_terminal());
        assert!(!Severity::Warning.is_terminal());
        assert!(Severity::Fatal.is_terminal());
        assert!(Severity::Panic.is_terminal());
    }

    #[test]
    fn display_names() {
        assert_eq!(Severity::Panic.to_string(), "PANIC");
        assert_eq!(Severity::Warning.to_string(), "WARNING");
    }
}
