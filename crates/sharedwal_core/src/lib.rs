//! # SharedWAL Core
//!
//! Crash-recovery and shared-storage consistency for database instances
//! that run against one shared volume and change membership through an
//! external reform protocol.
//!
//! This crate provides:
//! - [`ControlFileStore`] - checksum-protected, dual-file cluster control records
//! - [`SegmentLocator`] - WAL segment lookup across candidate timelines
//! - [`PreReadCache`] - a per-reader read-ahead window with follower staleness rules
//! - [`XLogReader`] - one reader composing the locator and the cache
//! - [`InstanceDirectoryScanner`] - discovery of per-instance WAL directories
//! - [`ReplicationEndpointResolver`] - connection string rebuild after a primary change
//! - [`CommitSequence`] - the boot-selected commit-sequence strategy boundary
//!
//! All per-process state lives in one [`Context`] that every component is
//! constructed with.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod control;
mod csn;
mod endpoint;
mod error;
mod instance_dir;
mod severity;
mod xlog;

pub use config::{Config, ReplConnInfo};
pub use context::{Context, ReplicationProgress};
pub use control::{
    encode_record, verify_record, CheckpointControl, ClusterStatus, ControlCopy, ControlFileStore,
    ControlRecord, ReformerControl, Verification, CHECKSUM_LEN,
};
pub use csn::{
    select_commit_sequence, CommitSeqNo, CommitSequence, CsnClock, CsnSession, GltDisabled,
    GltEnabled, TransactionId, FIRST_NORMAL_CSN, GLT_DEFAULT_XMIN,
};
pub use endpoint::{ConnInfo, ReplicationEndpointResolver};
pub use error::{CoreError, CoreResult};
pub use instance_dir::{
    parse_instance_id, recovery_xlog_dir, InstanceDirectoryList, InstanceDirectoryScanner,
    INSTANCE_SLOT_EMPTY,
};
pub use severity::Severity;
pub use xlog::{
    segment_file_name, PageRead, PreReadCache, PreReadOutcome, ReadSource, SegmentLocator,
    TimeLineId, TimelineState, XLogReader, XLogRecPtr, XLogSegNo, INVALID_PRE_READ_START,
    INVALID_XLOG_REC_PTR,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum number of instances in one cluster.
pub const MAX_INSTANCES: usize = 64;

/// Control-file page reserved for the reform control record.
///
/// Pages `0..MAX_INSTANCES` hold the per-instance checkpoint control records.
pub const REFORM_CTRL_PAGE: u32 = MAX_INSTANCES as u32;

/// Maximum number of configured replication connection candidates.
pub const MAX_REPL_NODES: usize = 9;

/// Capacity of a replication connection string, terminator included.
pub const MAX_CONNINFO: usize = 1024;
