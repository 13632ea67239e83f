//! Discovery of per-instance WAL directories on the shared volume.
//!
//! ```text
//! <shared_root>/
//! ├─ pg_xlog0/         # WAL of instance 0
//! ├─ pg_xlog1/         # WAL of instance 1
//! └─ ...
//! ```

use crate::context::Context;
use crate::error::{CoreError, CoreResult};
use crate::MAX_INSTANCES;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Value of an unused slot.
pub const INSTANCE_SLOT_EMPTY: i32 = -1;

/// Fixed-capacity list of instance ids found on the shared volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDirectoryList {
    slots: [i32; MAX_INSTANCES],
    len: usize,
}

impl Default for InstanceDirectoryList {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceDirectoryList {
    /// Creates a list with every slot empty.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [INSTANCE_SLOT_EMPTY; MAX_INSTANCES],
            len: 0,
        }
    }

    /// Returns all slots, empty ones included.
    #[must_use]
    pub fn slots(&self) -> &[i32; MAX_INSTANCES] {
        &self.slots
    }

    /// Iterates over the filled slots in slot order.
    pub fn found(&self) -> impl Iterator<Item = i32> + '_ {
        self.slots[..self.len].iter().copied()
    }

    /// Returns `true` if some slot holds `instance_id`.
    #[must_use]
    pub fn contains(&self, instance_id: i32) -> bool {
        self.found().any(|id| id == instance_id)
    }

    /// Returns `true` if every slot is filled.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == MAX_INSTANCES
    }

    fn push(&mut self, instance_id: i32) -> bool {
        if self.is_full() {
            return false;
        }
        self.slots[self.len] = instance_id;
        self.len += 1;
        true
    }
}

/// Parses a directory suffix the way C `atoi` does.
///
/// Leading whitespace and one sign are accepted, then digits are consumed
/// up to the first non-digit. A suffix with no leading digits is `0`.
/// Overflow wraps.
#[must_use]
pub fn parse_instance_id(suffix: &str) -> i32 {
    let s = suffix.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let value = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i32, |acc, b| {
            acc.wrapping_mul(10).wrapping_add(i32::from(b - b'0'))
        });

    if negative {
        value.wrapping_neg()
    } else {
        value
    }
}

/// Returns the WAL directory of `instance_id` under `root`.
#[must_use]
pub fn recovery_xlog_dir(root: &Path, prefix: &str, instance_id: i32) -> PathBuf {
    root.join(format!("{prefix}{instance_id}"))
}

/// Enumerates instance WAL directories under the shared root.
#[derive(Debug, Clone)]
pub struct InstanceDirectoryScanner {
    ctx: Arc<Context>,
}

impl InstanceDirectoryScanner {
    /// Creates a scanner using the context's WAL directory prefix.
    #[must_use]
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Scans `root`, rebuilding the list from scratch.
    ///
    /// Entries are visited in name order. An entry named exactly as the
    /// prefix is skipped; any longer entry starting with it yields
    /// [`parse_instance_id`] of the rest.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DirectoryScan`] if `root` cannot be listed.
    /// Without the shared root the instance cannot run in shared mode.
    pub fn scan(&self, root: &Path) -> CoreResult<InstanceDirectoryList> {
        let prefix = self.ctx.config().wal_dir_prefix.as_str();
        let scan_error = |source| {
            CoreError::DirectoryScan {
                path: root.to_path_buf(),
                source,
            }
            .report()
        };

        let mut names = Vec::new();
        for entry in fs::read_dir(root).map_err(scan_error)? {
            let entry = entry.map_err(scan_error)?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_owned());
            }
        }
        names.sort();

        let mut list = InstanceDirectoryList::new();
        for name in &names {
            let Some(suffix) = name.strip_prefix(prefix) else {
                continue;
            };
            if suffix.is_empty() {
                continue;
            }
            if !list.push(parse_instance_id(suffix)) {
                warn!(entry = %name, "instance directory list full, ignoring entry");
            }
        }

        Ok(list)
    }

    /// Scans the configured shared root and publishes the list in the context.
    ///
    /// # Errors
    ///
    /// See [`InstanceDirectoryScanner::scan`].
    pub fn scan_shared_root(&self) -> CoreResult<InstanceDirectoryList> {
        let list = self.scan(&self.ctx.config().shared_root)?;
        self.ctx.set_instance_dirs(list.clone());
        Ok(list)
    }
}
