//! Rebuilding the replication connection string after a primary change.

use crate::config::ReplConnInfo;
use crate::context::Context;
use crate::MAX_CONNINFO;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A replication connection string of bounded length.
///
/// Holds at most `MAX_CONNINFO - 1` bytes; longer input is cut at the last
/// character boundary that fits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnInfo(String);

impl ConnInfo {
    /// Wraps `value`, truncating it to the connection string capacity.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        let mut value = value.into();
        let limit = MAX_CONNINFO - 1;
        if value.len() > limit {
            let mut end = limit;
            while !value.is_char_boundary(end) {
                end -= 1;
            }
            value.truncate(end);
        }
        Self(value)
    }

    /// Formats the connection string for one configured candidate.
    #[must_use]
    pub fn from_candidate(candidate: &ReplConnInfo) -> Self {
        Self::new(format!(
            "host={} port={} localhost={} localport={}",
            candidate.remotehost, candidate.remoteport, candidate.localhost, candidate.localport
        ))
    }

    /// Returns the connection string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the connection string is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ConnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Points a standby's log receiver at the current primary.
#[derive(Debug, Clone)]
pub struct ReplicationEndpointResolver {
    ctx: Arc<Context>,
}

impl ReplicationEndpointResolver {
    /// Creates a resolver over the context's membership table and candidates.
    #[must_use]
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Rebuilds the connection string for `primary_instance_id`.
    ///
    /// Returns `None` and leaves the context untouched if the primary has no
    /// known address or no configured candidate targets that address.
    pub fn resolve(&self, primary_instance_id: i32) -> Option<ConnInfo> {
        let Some(address) = self.ctx.member_address(primary_instance_id) else {
            warn!(
                primary = primary_instance_id,
                "failed to get ip of primary node, keeping previous conninfo"
            );
            return None;
        };

        let candidate = self
            .ctx
            .config()
            .replconninfo
            .iter()
            .filter(|c| !c.remotehost.is_empty())
            .find(|c| c.remotehost == address);
        let Some(candidate) = candidate else {
            warn!(
                primary = primary_instance_id,
                %address,
                "no replconninfo candidate matches primary address, keeping previous conninfo"
            );
            return None;
        };

        let conninfo = ConnInfo::from_candidate(candidate);
        debug!(primary = primary_instance_id, %conninfo, "replication conninfo updated");
        self.ctx.set_conninfo(conninfo.clone());
        Some(conninfo)
    }

    /// Resolves for the primary named by the last reform control record.
    ///
    /// Returns `None` if no reform control record is known yet.
    pub fn resolve_current(&self) -> Option<ConnInfo> {
        let primary = self.ctx.primary_instance_id()?;
        self.resolve(primary)
    }
}
