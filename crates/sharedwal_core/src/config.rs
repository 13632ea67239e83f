//! Shared-storage configuration.

use crate::error::{CoreError, CoreResult};
use crate::MAX_REPL_NODES;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Suffix appended to the control file path to name its backup copy.
pub const BACKUP_SUFFIX: &str = ".backup";

/// One statically configured replication connection candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplConnInfo {
    /// Address of the remote (primary) side.
    pub remotehost: String,
    /// Port of the remote side.
    pub remoteport: u16,
    /// Address of this node.
    pub localhost: String,
    /// Port of this node.
    pub localport: u16,
}

/// Configuration for one instance attached to the shared volume.
///
/// Loaded once at boot; components copy the values they need at
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the shared storage volume.
    pub shared_root: PathBuf,

    /// Primary control file. The backup copy is this path plus [`BACKUP_SUFFIX`].
    pub control_file: PathBuf,

    /// Name prefix of per-instance WAL directories under `shared_root`.
    pub wal_dir_prefix: String,

    /// Size of one WAL segment file in bytes.
    pub segment_size: u64,

    /// Size of one pre-read unit in bytes.
    pub pre_read_size: usize,

    /// Alignment for buffers handed to the storage device.
    pub buffer_alignment: usize,

    /// Control file page size.
    pub block_size: u64,

    /// Dual-site replication topology: all WAL directories live on one LUN,
    /// so a segment missing from the first timeline tried is missing everywhere.
    pub dual_site_replication: bool,

    /// This instance is the designated log-applying follower.
    pub realtime_follower: bool,

    /// This instance's id.
    pub instance_id: i32,

    /// Initial membership address table, indexed by instance id.
    pub member_addresses: Vec<String>,

    /// Replication connection candidates.
    pub replconninfo: Vec<ReplConnInfo>,

    /// Select the global-logical-time commit-sequence strategy.
    pub enable_global_logical_time: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shared_root: PathBuf::from("."),
            control_file: PathBuf::from("pg_control"),
            wal_dir_prefix: "pg_xlog".to_string(),
            segment_size: 16 * 1024 * 1024, // 16 MB
            pre_read_size: 64 * 1024,       // 64 KB
            buffer_alignment: 32,
            block_size: 8192,
            dual_site_replication: false,
            realtime_follower: false,
            instance_id: 0,
            member_addresses: Vec::new(),
            replconninfo: Vec::new(),
            enable_global_logical_time: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the shared storage root.
    #[must_use]
    pub fn shared_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.shared_root = path.into();
        self
    }

    /// Sets the primary control file path.
    #[must_use]
    pub fn control_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.control_file = path.into();
        self
    }

    /// Sets the WAL directory prefix.
    #[must_use]
    pub fn wal_dir_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.wal_dir_prefix = prefix.into();
        self
    }

    /// Sets the WAL segment size.
    #[must_use]
    pub const fn segment_size(mut self, size: u64) -> Self {
        self.segment_size = size;
        self
    }

    /// Sets the pre-read unit size.
    #[must_use]
    pub const fn pre_read_size(mut self, size: usize) -> Self {
        self.pre_read_size = size;
        self
    }

    /// Sets the buffer alignment.
    #[must_use]
    pub const fn buffer_alignment(mut self, align: usize) -> Self {
        self.buffer_alignment = align;
        self
    }

    /// Sets the control file page size.
    #[must_use]
    pub const fn block_size(mut self, size: u64) -> Self {
        self.block_size = size;
        self
    }

    /// Enables or disables the dual-site replication topology.
    #[must_use]
    pub const fn dual_site_replication(mut self, value: bool) -> Self {
        self.dual_site_replication = value;
        self
    }

    /// Marks this instance as the real-time follower.
    #[must_use]
    pub const fn realtime_follower(mut self, value: bool) -> Self {
        self.realtime_follower = value;
        self
    }

    /// Sets this instance's id.
    #[must_use]
    pub const fn instance_id(mut self, id: i32) -> Self {
        self.instance_id = id;
        self
    }

    /// Sets the initial membership address table.
    #[must_use]
    pub fn member_addresses(mut self, addresses: Vec<String>) -> Self {
        self.member_addresses = addresses;
        self
    }

    /// Adds a replication connection candidate.
    #[must_use]
    pub fn add_replconninfo(mut self, info: ReplConnInfo) -> Self {
        self.replconninfo.push(info);
        self
    }

    /// Selects the commit-sequence strategy.
    #[must_use]
    pub const fn enable_global_logical_time(mut self, value: bool) -> Self {
        self.enable_global_logical_time = value;
        self
    }

    /// Returns the backup control file path.
    #[must_use]
    pub fn backup_control_file(&self) -> PathBuf {
        let mut name = self.control_file.clone().into_os_string();
        name.push(BACKUP_SUFFIX);
        PathBuf::from(name)
    }

    /// Number of segments per 4 GiB log id.
    #[must_use]
    pub const fn segments_per_log_id(&self) -> u64 {
        0x1_0000_0000 / self.segment_size
    }

    /// Checks that the sizes fit together.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> CoreResult<()> {
        if !self.segment_size.is_power_of_two() || self.segment_size > 0x1_0000_0000 {
            return Err(CoreError::invalid_config(format!(
                "segment_size {} must be a power of two no larger than 4 GiB",
                self.segment_size
            )));
        }
        if self.pre_read_size == 0
            || !self.pre_read_size.is_power_of_two()
            || self.pre_read_size as u64 > self.segment_size
        {
            return Err(CoreError::invalid_config(format!(
                "pre_read_size {} must be a power of two no larger than segment_size",
                self.pre_read_size
            )));
        }
        if self.buffer_alignment > 1 && !self.buffer_alignment.is_power_of_two() {
            return Err(CoreError::invalid_config(format!(
                "buffer_alignment {} must be a power of two",
                self.buffer_alignment
            )));
        }
        if self.block_size == 0 {
            return Err(CoreError::invalid_config("block_size must be positive"));
        }
        if self.replconninfo.len() > MAX_REPL_NODES {
            return Err(CoreError::invalid_config(format!(
                "at most {MAX_REPL_NODES} replconninfo entries are supported, got {}",
                self.replconninfo.len()
            )));
        }
        if self.wal_dir_prefix.is_empty() {
            return Err(CoreError::invalid_config("wal_dir_prefix must not be empty"));
        }
        Ok(())
    }
}
