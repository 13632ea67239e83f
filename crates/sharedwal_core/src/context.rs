//! Per-process shared state.

use crate::config::Config;
use crate::control::{ClusterStatus, ReformerControl};
use crate::csn::{select_commit_sequence, CommitSequence, CsnClock};
use crate::endpoint::ConnInfo;
use crate::error::CoreResult;
use crate::instance_dir::InstanceDirectoryList;
use crate::xlog::{XLogRecPtr, INVALID_XLOG_REC_PTR};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Progress published by the log receiver and the startup process.
///
/// Read by follower pre-read caches to decide whether cached WAL bytes
/// can be trusted.
#[derive(Debug, Default)]
pub struct ReplicationProgress {
    recovery_done: AtomicBool,
    receiver_write_ptr: AtomicU64,
}

impl ReplicationProgress {
    /// Creates progress with recovery not done and no WAL received.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once the initial catch-up has completed.
    #[must_use]
    pub fn is_recovery_done(&self) -> bool {
        self.recovery_done.load(Ordering::Acquire)
    }

    /// Marks the initial catch-up as complete (or not).
    pub fn set_recovery_done(&self, done: bool) {
        self.recovery_done.store(done, Ordering::Release);
    }

    /// Returns the log receiver's current write position.
    #[must_use]
    pub fn receiver_write_ptr(&self) -> XLogRecPtr {
        self.receiver_write_ptr.load(Ordering::Acquire)
    }

    /// Publishes a new receiver write position. The position never moves back.
    pub fn advance_receiver_write_ptr(&self, ptr: XLogRecPtr) {
        self.receiver_write_ptr.fetch_max(ptr, Ordering::AcqRel);
    }
}

/// State shared by every component of one process.
///
/// Exactly one `Context` exists per process. Components receive an
/// `Arc<Context>` at construction instead of reaching for globals.
#[derive(Debug)]
pub struct Context {
    config: Config,
    /// Serializes control-file access within this process only.
    control_lock: Mutex<()>,
    reformer: RwLock<Option<ReformerControl>>,
    ondemand_status: RwLock<Option<ClusterStatus>>,
    checkpoint_redo: AtomicU64,
    member_addresses: RwLock<Vec<String>>,
    conninfo: RwLock<Option<ConnInfo>>,
    instance_dirs: RwLock<InstanceDirectoryList>,
    progress: Arc<ReplicationProgress>,
    csn_clock: Arc<CsnClock>,
    commit_sequence: Arc<dyn CommitSequence>,
}

impl Context {
    /// Builds the process context, selecting the commit-sequence strategy once.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn new(config: Config) -> CoreResult<Self> {
        config.validate()?;

        let csn_clock = Arc::new(CsnClock::default());
        let commit_sequence =
            select_commit_sequence(config.enable_global_logical_time, Arc::clone(&csn_clock));
        let member_addresses = config.member_addresses.clone();

        Ok(Self {
            config,
            control_lock: Mutex::new(()),
            reformer: RwLock::new(None),
            ondemand_status: RwLock::new(None),
            checkpoint_redo: AtomicU64::new(INVALID_XLOG_REC_PTR),
            member_addresses: RwLock::new(member_addresses),
            conninfo: RwLock::new(None),
            instance_dirs: RwLock::new(InstanceDirectoryList::new()),
            progress: Arc::new(ReplicationProgress::new()),
            csn_clock,
            commit_sequence,
        })
    }

    /// Returns the boot configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn control_lock(&self) -> &Mutex<()> {
        &self.control_lock
    }

    /// Returns the last verified reform control record, if one was read or written.
    #[must_use]
    pub fn reformer(&self) -> Option<ReformerControl> {
        self.reformer.read().clone()
    }

    pub(crate) fn install_reformer(&self, record: ReformerControl) {
        *self.ondemand_status.write() = Some(record.cluster_status);
        *self.reformer.write() = Some(record);
    }

    /// Returns the on-demand recovery status mirrored from the control record.
    #[must_use]
    pub fn ondemand_status(&self) -> Option<ClusterStatus> {
        *self.ondemand_status.read()
    }

    /// Returns the current primary instance id, if known.
    #[must_use]
    pub fn primary_instance_id(&self) -> Option<i32> {
        self.reformer.read().as_ref().map(|r| r.primary_instance_id)
    }

    /// Returns the ids of the stable nodes, if the control record is known.
    #[must_use]
    pub fn stable_node_ids(&self) -> Vec<usize> {
        self.reformer
            .read()
            .as_ref()
            .map(ReformerControl::stable_node_ids)
            .unwrap_or_default()
    }

    /// Returns the highest checkpoint redo position seen across instances.
    #[must_use]
    pub fn checkpoint_redo(&self) -> XLogRecPtr {
        self.checkpoint_redo.load(Ordering::Acquire)
    }

    /// Moves the cluster checkpoint redo position forward to `redo`.
    ///
    /// Returns the position after the update; it never moves backwards.
    pub(crate) fn advance_checkpoint_redo(&self, redo: XLogRecPtr) -> XLogRecPtr {
        let prev = self.checkpoint_redo.fetch_max(redo, Ordering::AcqRel);
        prev.max(redo)
    }

    /// Returns the address of `instance_id`, or `None` if unknown or empty.
    #[must_use]
    pub fn member_address(&self, instance_id: i32) -> Option<String> {
        let idx = usize::try_from(instance_id).ok()?;
        self.member_addresses
            .read()
            .get(idx)
            .filter(|addr| !addr.is_empty())
            .cloned()
    }

    /// Replaces the membership address table with reform output.
    pub fn set_member_addresses(&self, addresses: Vec<String>) {
        *self.member_addresses.write() = addresses;
    }

    /// Returns the current replication connection string.
    #[must_use]
    pub fn conninfo(&self) -> Option<ConnInfo> {
        self.conninfo.read().clone()
    }

    pub(crate) fn set_conninfo(&self, conninfo: ConnInfo) {
        *self.conninfo.write() = Some(conninfo);
    }

    /// Returns the instance directories found by the last scan.
    #[must_use]
    pub fn instance_dirs(&self) -> InstanceDirectoryList {
        self.instance_dirs.read().clone()
    }

    pub(crate) fn set_instance_dirs(&self, list: InstanceDirectoryList) {
        *self.instance_dirs.write() = list;
    }

    /// Returns the receiver/startup progress shared with pre-read caches.
    #[must_use]
    pub fn progress(&self) -> &Arc<ReplicationProgress> {
        &self.progress
    }

    /// Returns the shared next-commit-sequence clock.
    #[must_use]
    pub fn csn_clock(&self) -> &Arc<CsnClock> {
        &self.csn_clock
    }

    /// Returns the commit-sequence strategy selected at boot.
    #[must_use]
    pub fn commit_sequence(&self) -> &Arc<dyn CommitSequence> {
        &self.commit_sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_is_empty() {
        let ctx = Context::new(Config::default()).unwrap();
        assert!(ctx.reformer().is_none());
        assert!(ctx.ondemand_status().is_none());
        assert!(ctx.conninfo().is_none());
        assert!(ctx.stable_node_ids().is_empty());
        assert_eq!(ctx.instance_dirs().found().count(), 0);
    }

    #[test]
    fn invalid_config_rejected() {
        let result = Context::new(Config::new().segment_size(1000));
        assert!(result.is_err());
    }

    #[test]
    fn install_reformer_mirrors_status() {
        let ctx = Context::new(Config::default()).unwrap();
        ctx.install_reformer(ReformerControl::new(0b101, 2, ClusterStatus::OndemandRedo));

        assert_eq!(ctx.primary_instance_id(), Some(2));
        assert_eq!(ctx.ondemand_status(), Some(ClusterStatus::OndemandRedo));
        assert_eq!(ctx.stable_node_ids(), vec![0, 2]);
    }

    #[test]
    fn checkpoint_redo_never_moves_back() {
        let ctx = Context::new(Config::default()).unwrap();
        assert_eq!(ctx.advance_checkpoint_redo(500), 500);
        assert_eq!(ctx.advance_checkpoint_redo(200), 500);
        assert_eq!(ctx.advance_checkpoint_redo(900), 900);
        assert_eq!(ctx.checkpoint_redo(), 900);
    }

    #[test]
    fn member_address_lookup() {
        let ctx = Context::new(
            Config::new().member_addresses(vec!["10.0.0.1".into(), String::new()]),
        )
        .unwrap();
        assert_eq!(ctx.member_address(0).as_deref(), Some("10.0.0.1"));
        assert_eq!(ctx.member_address(1), None);
        assert_eq!(ctx.member_address(7), None);
        assert_eq!(ctx.member_address(-1), None);

        ctx.set_member_addresses(vec![String::new(), "10.0.0.9".into()]);
        assert_eq!(ctx.member_address(1).as_deref(), Some("10.0.0.9"));
    }

    #[test]
    fn receiver_write_ptr_is_monotonic() {
        let progress = ReplicationProgress::new();
        progress.advance_receiver_write_ptr(100);
        progress.advance_receiver_write_ptr(50);
        assert_eq!(progress.receiver_write_ptr(), 100);
        assert!(!progress.is_recovery_done());
        progress.set_recovery_done(true);
        assert!(progress.is_recovery_done());
    }
}
