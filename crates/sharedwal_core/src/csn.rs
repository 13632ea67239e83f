//! Commit sequence numbers and the boot-selected strategy that assigns them.
//!
//! Two strategies exist. [`GltDisabled`] assigns commit sequence numbers
//! from the local counter only. [`GltEnabled`] additionally lets an
//! external coordinator pin the commit and snapshot sequence numbers of a
//! session with short commands of the form
//!
//! ```text
//! SELECT <digits> AS SETCOMMITCSN
//! SELECT <digits> AS SETSNAPSHOTCSN
//! ```
//!
//! The strategy is chosen once from [`Config::enable_global_logical_time`]
//! and shared through the [`Context`](crate::Context).
//!
//! [`Config::enable_global_logical_time`]: crate::Config::enable_global_logical_time

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Commit sequence number.
pub type CommitSeqNo = u64;

/// Transaction identifier.
pub type TransactionId = u64;

/// Snapshot xmin reported while a coordinator-pinned snapshot is active.
pub const GLT_DEFAULT_XMIN: TransactionId = 2;

/// First commit sequence number handed out by a fresh clock.
pub const FIRST_NORMAL_CSN: CommitSeqNo = 3;

/// Pinning commands are rejected at this length and above.
const COMMAND_MAX_LEN: usize = 40;

const SET_SNAPSHOT_CSN: &str = "SETSNAPSHOTCSN";
const SET_COMMIT_CSN: &str = "SETCOMMITCSN";

/// The process-wide next commit sequence number.
#[derive(Debug)]
pub struct CsnClock {
    next: AtomicU64,
}

impl Default for CsnClock {
    fn default() -> Self {
        Self::new(FIRST_NORMAL_CSN)
    }
}

impl CsnClock {
    /// Creates a clock whose next commit sequence number is `next`.
    #[must_use]
    pub fn new(next: CommitSeqNo) -> Self {
        Self {
            next: AtomicU64::new(next),
        }
    }

    /// Returns the next commit sequence number.
    #[must_use]
    pub fn next(&self) -> CommitSeqNo {
        self.next.load(Ordering::Acquire)
    }

    /// Moves the next commit sequence number forward to `next`.
    pub fn advance_to(&self, next: CommitSeqNo) {
        self.next.fetch_max(next, Ordering::AcqRel);
    }
}

/// Per-session commit sequence state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CsnSession {
    /// Commit sequence number pinned by `SETCOMMITCSN`.
    pub commit_stash: Option<CommitSeqNo>,
    /// Snapshot sequence number pinned by `SETSNAPSHOTCSN`.
    pub snapshot_stash: Option<CommitSeqNo>,
    /// Commit sequence number assigned to the last commit.
    pub commit_csn: Option<CommitSeqNo>,
}

impl CsnSession {
    /// Creates a session with nothing pinned.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// How commit and snapshot sequence numbers are assigned.
pub trait CommitSequence: Send + Sync + fmt::Debug {
    /// Returns `true` for the global-logical-time strategy.
    fn is_enabled(&self) -> bool;

    /// Returns the commit sequence number to publish for an in-progress
    /// commit of `xid`, given the `csn` the caller computed.
    fn resolve_commit_csn_before_commit(
        &self,
        session: &CsnSession,
        csn: CommitSeqNo,
        xid: TransactionId,
    ) -> CommitSeqNo;

    /// Assigns the session's commit sequence number when `xid` commits.
    fn advance_local_csn_on_commit(&self, session: &mut CsnSession, xid: TransactionId);

    /// Assigns the commit sequence number when a prepared `xid` commits.
    fn advance_local_csn_on_commit_prepared(&self, session: &mut CsnSession, xid: TransactionId) {
        self.advance_local_csn_on_commit(session, xid);
    }

    /// Recognises and applies a pinning command.
    ///
    /// Returns `true` if `query` was a pinning command; the pinned value is
    /// stashed in `session`.
    fn detect_special_csn_command(&self, session: &mut CsnSession, query: &str) -> bool;

    /// Returns the sequence number a new snapshot should see.
    fn snapshot_csn(&self, session: &CsnSession) -> CommitSeqNo;

    /// Returns the xmin a new snapshot with sequence number `csn` should use.
    fn snapshot_xmin(
        &self,
        session: &CsnSession,
        csn: CommitSeqNo,
        local_xmin: TransactionId,
    ) -> TransactionId;
}

/// Builds the strategy selected by `enabled`.
#[must_use]
pub fn select_commit_sequence(enabled: bool, clock: Arc<CsnClock>) -> Arc<dyn CommitSequence> {
    if enabled {
        Arc::new(GltEnabled::new(clock))
    } else {
        Arc::new(GltDisabled::new(clock))
    }
}

/// Global logical time: sequence numbers may be pinned by a coordinator.
#[derive(Debug)]
pub struct GltEnabled {
    clock: Arc<CsnClock>,
    /// Readers resolve against the clock; commits move it.
    lock: RwLock<()>,
}

impl GltEnabled {
    /// Creates the strategy over `clock`.
    #[must_use]
    pub fn new(clock: Arc<CsnClock>) -> Self {
        Self {
            clock,
            lock: RwLock::new(()),
        }
    }

    fn latest(&self, session: &CsnSession) -> CommitSeqNo {
        session
            .commit_stash
            .unwrap_or_else(|| self.clock.next().saturating_sub(1))
    }
}

impl CommitSequence for GltEnabled {
    fn is_enabled(&self) -> bool {
        true
    }

    fn resolve_commit_csn_before_commit(
        &self,
        session: &CsnSession,
        csn: CommitSeqNo,
        _xid: TransactionId,
    ) -> CommitSeqNo {
        let _guard = self.lock.read();
        self.latest(session).max(csn)
    }

    fn advance_local_csn_on_commit(&self, session: &mut CsnSession, xid: TransactionId) {
        let _guard = self.lock.write();
        let commit_csn = self.latest(session);
        session.commit_csn = Some(commit_csn);
        if let Some(stash) = session.commit_stash {
            if stash >= self.clock.next() {
                self.clock.advance_to(stash.saturating_add(1));
            }
        }
        session.commit_stash = None;
        session.snapshot_stash = None;
        debug!(xid, commit_csn, next = self.clock.next(), "assigned commit csn");
    }

    fn detect_special_csn_command(&self, session: &mut CsnSession, query: &str) -> bool {
        let Some((kind, csn)) = parse_pin_command(query) else {
            return false;
        };
        let stash = (csn != 0).then_some(csn);
        match kind {
            PinKind::Snapshot => session.snapshot_stash = stash,
            PinKind::Commit => session.commit_stash = stash,
        }
        true
    }

    fn snapshot_csn(&self, session: &CsnSession) -> CommitSeqNo {
        session.snapshot_stash.unwrap_or_else(|| self.clock.next())
    }

    fn snapshot_xmin(
        &self,
        session: &CsnSession,
        _csn: CommitSeqNo,
        local_xmin: TransactionId,
    ) -> TransactionId {
        if session.snapshot_stash.is_some() {
            GLT_DEFAULT_XMIN
        } else {
            local_xmin
        }
    }
}

/// Local-only commit sequence numbers.
#[derive(Debug)]
pub struct GltDisabled {
    clock: Arc<CsnClock>,
}

impl GltDisabled {
    /// Creates the strategy over `clock`.
    #[must_use]
    pub fn new(clock: Arc<CsnClock>) -> Self {
        Self { clock }
    }
}

impl CommitSequence for GltDisabled {
    fn is_enabled(&self) -> bool {
        false
    }

    fn resolve_commit_csn_before_commit(
        &self,
        _session: &CsnSession,
        csn: CommitSeqNo,
        _xid: TransactionId,
    ) -> CommitSeqNo {
        self.clock.next().max(csn)
    }

    fn advance_local_csn_on_commit(&self, session: &mut CsnSession, _xid: TransactionId) {
        session.commit_csn = Some(self.clock.next());
    }

    fn detect_special_csn_command(&self, _session: &mut CsnSession, _query: &str) -> bool {
        false
    }

    fn snapshot_csn(&self, _session: &CsnSession) -> CommitSeqNo {
        self.clock.next()
    }

    fn snapshot_xmin(
        &self,
        _session: &CsnSession,
        _csn: CommitSeqNo,
        local_xmin: TransactionId,
    ) -> TransactionId {
        local_xmin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PinKind {
    Snapshot,
    Commit,
}

fn parse_pin_command(query: &str) -> Option<(PinKind, CommitSeqNo)> {
    if query.is_empty() || query.len() >= COMMAND_MAX_LEN {
        return None;
    }

    let tokens: Vec<&str> = query.split(' ').filter(|t| !t.is_empty()).collect();
    let [select, csn, as_kw, kind] = tokens.as_slice() else {
        return None;
    };
    if !select.starts_with("SELECT") || !as_kw.starts_with("AS") {
        return None;
    }

    let kind = if kind.starts_with(SET_SNAPSHOT_CSN) {
        PinKind::Snapshot
    } else if kind.starts_with(SET_COMMIT_CSN) {
        PinKind::Commit
    } else {
        return None;
    };

    parse_csn(csn).map(|csn| (kind, csn))
}

/// Parses an all-digit sequence number. Overflow wraps; the all-ones value
/// is reserved as invalid.
fn parse_csn(digits: &str) -> Option<CommitSeqNo> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let csn = digits.bytes().fold(0u64, |acc, b| {
        acc.wrapping_mul(10).wrapping_add(u64::from(b - b'0'))
    });
    (csn != CommitSeqNo::MAX).then_some(csn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled(next: CommitSeqNo) -> (Arc<CsnClock>, Arc<dyn CommitSequence>) {
        let clock = Arc::new(CsnClock::new(next));
        (Arc::clone(&clock), select_commit_sequence(true, clock))
    }

    fn disabled(next: CommitSeqNo) -> (Arc<CsnClock>, Arc<dyn CommitSequence>) {
        let clock = Arc::new(CsnClock::new(next));
        (Arc::clone(&clock), select_commit_sequence(false, clock))
    }

    #[test]
    fn selection_follows_flag() {
        assert!(enabled(10).1.is_enabled());
        assert!(!disabled(10).1.is_enabled());
    }

    #[test]
    fn detects_pin_commands() {
        let (_, glt) = enabled(10);
        let mut session = CsnSession::new();

        assert!(glt.detect_special_csn_command(&mut session, "SELECT 500 AS SETCOMMITCSN"));
        assert_eq!(session.commit_stash, Some(500));
        assert!(glt.detect_special_csn_command(&mut session, "SELECT 42 AS SETSNAPSHOTCSN"));
        assert_eq!(session.snapshot_stash, Some(42));
    }

    #[test]
    fn rejects_malformed_commands() {
        let (_, glt) = enabled(10);
        let mut session = CsnSession::new();
        for query in [
            "",
            "SELECT 5 AS",
            "SELECT 5 AS SETCOMMITCSN extra",
            "SELECT 5x AS SETCOMMITCSN",
            "UPDATE 5 AS SETCOMMITCSN",
            "SELECT 5 FROM SETCOMMITCSN",
            "SELECT 5 AS SETXMIN",
            "SELECT 18446744073709551615 AS SETCOMMITCSN",
            "SELECT 1234567890123456789 AS SETSNAPSHOTCSN",
        ] {
            assert!(!glt.detect_special_csn_command(&mut session, query), "{query:?}");
        }
        assert_eq!(session, CsnSession::new());
    }

    #[test]
    fn repeated_spaces_collapse() {
        let (_, glt) = enabled(10);
        let mut session = CsnSession::new();
        assert!(glt.detect_special_csn_command(&mut session, "SELECT  7  AS SETCOMMITCSN"));
        assert_eq!(session.commit_stash, Some(7));
    }

    #[test]
    fn enabled_before_commit_uses_stash_or_clock() {
        let (_, glt) = enabled(100);
        let mut session = CsnSession::new();

        assert_eq!(glt.resolve_commit_csn_before_commit(&session, 50, 1), 99);
        assert_eq!(glt.resolve_commit_csn_before_commit(&session, 150, 1), 150);

        glt.detect_special_csn_command(&mut session, "SELECT 300 AS SETCOMMITCSN");
        assert_eq!(glt.resolve_commit_csn_before_commit(&session, 150, 1), 300);
    }

    #[test]
    fn enabled_commit_with_stash_advances_clock() {
        let (clock, glt) = enabled(100);
        let mut session = CsnSession::new();
        glt.detect_special_csn_command(&mut session, "SELECT 300 AS SETCOMMITCSN");
        glt.detect_special_csn_command(&mut session, "SELECT 250 AS SETSNAPSHOTCSN");

        glt.advance_local_csn_on_commit(&mut session, 7);

        assert_eq!(session.commit_csn, Some(300));
        assert_eq!(clock.next(), 301);
        assert_eq!(session.commit_stash, None);
        assert_eq!(session.snapshot_stash, None);
    }

    #[test]
    fn enabled_commit_with_old_stash_keeps_clock() {
        let (clock, glt) = enabled(100);
        let mut session = CsnSession::new();
        glt.detect_special_csn_command(&mut session, "SELECT 20 AS SETCOMMITCSN");

        glt.advance_local_csn_on_commit_prepared(&mut session, 7);

        assert_eq!(session.commit_csn, Some(20));
        assert_eq!(clock.next(), 100);
    }

    #[test]
    fn enabled_commit_without_stash_uses_previous() {
        let (clock, glt) = enabled(100);
        let mut session = CsnSession::new();
        glt.advance_local_csn_on_commit(&mut session, 7);
        assert_eq!(session.commit_csn, Some(99));
        assert_eq!(clock.next(), 100);
    }

    #[test]
    fn enabled_snapshot_honours_pin() {
        let (clock, glt) = enabled(100);
        let mut session = CsnSession::new();
        assert_eq!(glt.snapshot_csn(&session), 100);
        assert_eq!(glt.snapshot_xmin(&session, 100, 55), 55);

        glt.detect_special_csn_command(&mut session, "SELECT 80 AS SETSNAPSHOTCSN");
        clock.advance_to(120);
        assert_eq!(glt.snapshot_csn(&session), 80);
        assert_eq!(glt.snapshot_xmin(&session, 80, 55), GLT_DEFAULT_XMIN);
    }

    #[test]
    fn disabled_strategy_is_local() {
        let (clock, glt) = disabled(100);
        let mut session = CsnSession::new();

        assert!(!glt.detect_special_csn_command(&mut session, "SELECT 300 AS SETCOMMITCSN"));
        assert_eq!(glt.resolve_commit_csn_before_commit(&session, 50, 1), 100);
        assert_eq!(glt.resolve_commit_csn_before_commit(&session, 150, 1), 150);

        glt.advance_local_csn_on_commit(&mut session, 1);
        assert_eq!(session.commit_csn, Some(100));
        assert_eq!(clock.next(), 100);

        assert_eq!(glt.snapshot_csn(&session), 100);
        assert_eq!(glt.snapshot_xmin(&session, 100, 55), 55);
    }

    #[test]
    fn clock_never_moves_back() {
        let clock = CsnClock::default();
        assert_eq!(clock.next(), FIRST_NORMAL_CSN);
        clock.advance_to(10);
        clock.advance_to(5);
        assert_eq!(clock.next(), 10);
    }
}
