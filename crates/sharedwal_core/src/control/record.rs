//! Control record types and checksum framing.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of the trailing CRC32C field.
pub const CHECKSUM_LEN: usize = 4;

/// A fixed-layout record stored in one control-file page.
///
/// Implementors describe only their body; framing and checksums are
/// handled by [`encode_record`] and [`verify_record`].
pub trait ControlRecord: Sized {
    /// Human-readable record name for diagnostics.
    const KIND: &'static str;

    /// Length of the body preceding the checksum.
    const BODY_LEN: usize;

    /// Length of body plus checksum.
    const ENCODED_LEN: usize = Self::BODY_LEN + CHECKSUM_LEN;

    /// Writes the body into `body`, which is exactly `BODY_LEN` bytes.
    fn write_body(&self, body: &mut [u8]);

    /// Parses a body whose checksum has already been verified.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] if a field holds a value this
    /// build cannot interpret.
    fn read_body(body: &[u8]) -> CoreResult<Self>;
}

/// Outcome of checksum verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification<R> {
    /// The checksum matched and the body parsed.
    Valid(R),
    /// The stored checksum does not match the body.
    ChecksumMismatch {
        /// Checksum stored in the record.
        expected: u32,
        /// Checksum computed over the body.
        actual: u32,
    },
}

/// Serializes `record` with its CRC32C appended.
#[must_use]
pub fn encode_record<R: ControlRecord>(record: &R) -> Vec<u8> {
    let mut buf = vec![0u8; R::ENCODED_LEN];
    record.write_body(&mut buf[..R::BODY_LEN]);
    let crc = crc32c::crc32c(&buf[..R::BODY_LEN]);
    buf[R::BODY_LEN..].copy_from_slice(&crc.to_le_bytes());
    buf
}

/// Recomputes the checksum over the first `ENCODED_LEN` bytes of `data`.
///
/// Trailing bytes beyond the record (alignment padding) are ignored.
///
/// # Errors
///
/// Returns [`CoreError::InvalidFormat`] if `data` is too short or the
/// verified body holds an unknown value.
pub fn verify_record<R: ControlRecord>(data: &[u8]) -> CoreResult<Verification<R>> {
    if data.len() < R::ENCODED_LEN {
        return Err(CoreError::invalid_format(format!(
            "{} needs {} bytes, got {}",
            R::KIND,
            R::ENCODED_LEN,
            data.len()
        )));
    }

    let body = &data[..R::BODY_LEN];
    let expected = read_u32(data, R::BODY_LEN);
    let actual = crc32c::crc32c(body);

    if expected != actual {
        return Ok(Verification::ChecksumMismatch { expected, actual });
    }

    R::read_body(body).map(Verification::Valid)
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn read_i32(data: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn read_u64(data: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(bytes)
}

/// Cluster recovery status carried in the reform control record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ClusterStatus {
    /// Normal operation.
    Normal = 0,
    /// On-demand recovery is building its redo state.
    OndemandBuild = 1,
    /// On-demand recovery is replaying WAL.
    OndemandRedo = 2,
}

impl ClusterStatus {
    /// Converts a raw on-disk value.
    #[must_use]
    pub const fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Normal),
            1 => Some(Self::OndemandBuild),
            2 => Some(Self::OndemandRedo),
            _ => None,
        }
    }

    /// Returns the raw on-disk value.
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Normal => "normal",
            Self::OndemandBuild => "ondemand-build",
            Self::OndemandRedo => "ondemand-redo",
        };
        f.write_str(name)
    }
}

/// The cluster's view of who is primary and which nodes are stable.
///
/// ```text
/// | stable_node_bitmap (8) | primary_instance_id (4) | cluster_status (4) | crc32c (4) |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReformerControl {
    /// Bit `i` set means node `i` is part of the stable cluster.
    pub stable_node_bitmap: u64,
    /// Instance currently acting as primary.
    pub primary_instance_id: i32,
    /// Cluster recovery status.
    pub cluster_status: ClusterStatus,
}

impl ReformerControl {
    /// Creates a reform control record.
    #[must_use]
    pub const fn new(
        stable_node_bitmap: u64,
        primary_instance_id: i32,
        cluster_status: ClusterStatus,
    ) -> Self {
        Self {
            stable_node_bitmap,
            primary_instance_id,
            cluster_status,
        }
    }

    /// Returns `true` if `node` is in the stable set.
    #[must_use]
    pub const fn is_stable(&self, node: usize) -> bool {
        node < 64 && self.stable_node_bitmap & (1 << node) != 0
    }

    /// Returns the stable node ids in ascending order.
    #[must_use]
    pub fn stable_node_ids(&self) -> Vec<usize> {
        (0..64).filter(|&node| self.is_stable(node)).collect()
    }
}

impl ControlRecord for ReformerControl {
    const KIND: &'static str = "reform control record";
    const BODY_LEN: usize = 16;

    fn write_body(&self, body: &mut [u8]) {
        body[0..8].copy_from_slice(&self.stable_node_bitmap.to_le_bytes());
        body[8..12].copy_from_slice(&self.primary_instance_id.to_le_bytes());
        body[12..16].copy_from_slice(&self.cluster_status.as_raw().to_le_bytes());
    }

    fn read_body(body: &[u8]) -> CoreResult<Self> {
        let raw_status = read_i32(body, 12);
        let cluster_status = ClusterStatus::from_raw(raw_status).ok_or_else(|| {
            CoreError::invalid_format(format!("unknown cluster status {raw_status}"))
        })?;

        Ok(Self {
            stable_node_bitmap: read_u64(body, 0),
            primary_instance_id: read_i32(body, 8),
            cluster_status,
        })
    }
}

/// Per-instance database control page.
///
/// ```text
/// | system_identifier (8) | checkpoint_redo (8) | timeline (4) | crc32c (4) |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointControl {
    /// Database system identifier.
    pub system_identifier: u64,
    /// Redo start position of the last checkpoint.
    pub checkpoint_redo: u64,
    /// Timeline of the last checkpoint.
    pub timeline: u32,
}

impl ControlRecord for CheckpointControl {
    const KIND: &'static str = "checkpoint control record";
    const BODY_LEN: usize = 20;

    fn write_body(&self, body: &mut [u8]) {
        body[0..8].copy_from_slice(&self.system_identifier.to_le_bytes());
        body[8..16].copy_from_slice(&self.checkpoint_redo.to_le_bytes());
        body[16..20].copy_from_slice(&self.timeline.to_le_bytes());
    }

    fn read_body(body: &[u8]) -> CoreResult<Self> {
        Ok(Self {
            system_identifier: read_u64(body, 0),
            checkpoint_redo: read_u64(body, 8),
            timeline: read_u32(body, 16),
        })
    }
}
