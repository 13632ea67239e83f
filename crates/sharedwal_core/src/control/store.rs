//! Dual-file control record store.

use crate::context::Context;
use crate::control::record::{
    encode_record, verify_record, CheckpointControl, ControlRecord, ReformerControl, Verification,
};
use crate::error::{CoreError, CoreResult};
use crate::REFORM_CTRL_PAGE;
use sharedwal_storage::{align_up, AlignedBuf, DeviceFile, OpenMode};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// One of the two physical copies of the control file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCopy {
    /// The primary control file.
    Primary,
    /// The `.backup` companion.
    Backup,
}

impl fmt::Display for ControlCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Backup => f.write_str("backup"),
        }
    }
}

/// Reads and writes checksum-protected records in the control file pair.
///
/// # Thread Safety
///
/// Every read and write runs under the context's control-file lock, so
/// threads of one process never observe a half-chosen copy. The lock does
/// not reach other nodes: cross-node exclusion is the reform protocol's
/// job, which must let only the current reform leader write.
///
/// # Failure Semantics
///
/// A checksum mismatch on the primary is retried once against the backup.
/// Everything else (open, read, short read, sync, a second mismatch) is
/// returned as a terminal error after being logged.
#[derive(Debug, Clone)]
pub struct ControlFileStore {
    ctx: Arc<Context>,
    primary: PathBuf,
    backup: PathBuf,
    block_size: u64,
    align: usize,
}

impl ControlFileStore {
    /// Creates a store over the control files named in the context's config.
    #[must_use]
    pub fn new(ctx: Arc<Context>) -> Self {
        let config = ctx.config();
        let primary = config.control_file.clone();
        let backup = config.backup_control_file();
        let block_size = config.block_size;
        let align = config.buffer_alignment;

        Self {
            ctx,
            primary,
            backup,
            block_size,
            align,
        }
    }

    /// Returns the primary control file path.
    #[must_use]
    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    /// Returns the backup control file path.
    #[must_use]
    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    /// Reads and verifies the record stored at `page`.
    ///
    /// Tries the primary copy, then the backup if the primary's checksum
    /// fails. At most two attempts are made. The caller holds the control
    /// lock.
    fn read_page<R: ControlRecord>(&self, page: u32) -> CoreResult<R> {
        let mut failure = None;

        for copy in [ControlCopy::Primary, ControlCopy::Backup] {
            let path = self.path_of(copy);
            match self.read_copy::<R>(path, page)? {
                Verification::Valid(record) => return Ok(record),
                Verification::ChecksumMismatch { expected, actual } => {
                    if copy == ControlCopy::Primary {
                        warn!(
                            path = %path.display(),
                            "control file contains incorrect checksum, try backup file"
                        );
                    }
                    failure = Some(CoreError::Corruption {
                        path: path.to_path_buf(),
                        copy,
                        expected,
                        actual,
                    });
                }
            }
        }

        Err(failure
            .unwrap_or_else(|| CoreError::invalid_operation("no control file copy was read"))
            .report())
    }

    /// Writes `record` to `page` in the backup copy, then the primary copy.
    ///
    /// The backup is created if absent; the primary must already exist.
    /// The caller holds the control lock.
    fn write_page<R: ControlRecord>(&self, page: u32, record: &R) -> CoreResult<()> {
        let mut buf = AlignedBuf::new(align_up(R::ENCODED_LEN, self.align), self.align)
            .map_err(fatal)?;
        buf.as_mut_slice()[..R::ENCODED_LEN].copy_from_slice(&encode_record(record));

        for (copy, mode) in [
            (ControlCopy::Backup, OpenMode::CreateReadWrite),
            (ControlCopy::Primary, OpenMode::ReadWrite),
        ] {
            let file = DeviceFile::open(self.path_of(copy), mode).map_err(fatal)?;
            file.write_all_at(buf.as_slice(), self.page_offset(page))
                .map_err(fatal)?;
            file.close().map_err(fatal)?;
        }

        debug!(kind = R::KIND, page, "control record written");
        Ok(())
    }

    /// Reads the reform control record and installs it in the context.
    ///
    /// The record is installed before the control lock is released, so the
    /// context always mirrors the last record read or written.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Corruption`] if both copies fail verification,
    /// or a storage error if any file operation fails.
    pub fn read_reformer(&self) -> CoreResult<ReformerControl> {
        let _guard = self.ctx.control_lock().lock();
        let record = self.read_page::<ReformerControl>(REFORM_CTRL_PAGE)?;
        self.ctx.install_reformer(record);
        Ok(record)
    }

    /// Persists the reform control record and installs it in the context.
    ///
    /// # Errors
    ///
    /// Returns a storage error if either copy cannot be opened, written or
    /// synced. A failure on the primary leaves the backup already updated.
    pub fn write_reformer(&self, record: &ReformerControl) -> CoreResult<()> {
        let _guard = self.ctx.control_lock().lock();
        self.write_page(REFORM_CTRL_PAGE, record)?;
        self.ctx.install_reformer(*record);
        Ok(())
    }

    /// Reads `instance`'s checkpoint control page.
    ///
    /// The context's cluster checkpoint redo position moves forward to the
    /// record's redo position if that is later.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if `instance` names the
    /// reserved reform page, or the errors of [`ControlFileStore::read_reformer`].
    pub fn read_checkpoint(&self, instance: u32) -> CoreResult<CheckpointControl> {
        check_instance_page(instance)?;
        let _guard = self.ctx.control_lock().lock();
        let record = self.read_page::<CheckpointControl>(instance)?;
        self.ctx.advance_checkpoint_redo(record.checkpoint_redo);
        Ok(record)
    }

    /// Persists `instance`'s checkpoint control page.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if `instance` names the
    /// reserved reform page, or the errors of [`ControlFileStore::write_reformer`].
    pub fn write_checkpoint(&self, instance: u32, record: &CheckpointControl) -> CoreResult<()> {
        check_instance_page(instance)?;
        let _guard = self.ctx.control_lock().lock();
        self.write_page(instance, record)
    }

    fn read_copy<R: ControlRecord>(&self, path: &Path, page: u32) -> CoreResult<Verification<R>> {
        let file = DeviceFile::open(path, OpenMode::ReadOnly).map_err(fatal)?;

        let mut buf = AlignedBuf::new(align_up(R::ENCODED_LEN, self.align), self.align)
            .map_err(fatal)?;
        file.read_exact_at(buf.as_mut_slice(), self.page_offset(page))
            .map_err(fatal)?;
        file.close().map_err(fatal)?;

        verify_record::<R>(buf.as_slice()).map_err(CoreError::report)
    }

    fn path_of(&self, copy: ControlCopy) -> &Path {
        match copy {
            ControlCopy::Primary => &self.primary,
            ControlCopy::Backup => &self.backup,
        }
    }

    fn page_offset(&self, page: u32) -> u64 {
        self.block_size * u64::from(page)
    }
}

fn check_instance_page(instance: u32) -> CoreResult<()> {
    if instance >= REFORM_CTRL_PAGE {
        return Err(CoreError::invalid_operation(format!(
            "instance {instance} is outside the checkpoint pages 0..{REFORM_CTRL_PAGE}"
        )));
    }
    Ok(())
}

fn fatal(err: impl Into<CoreError>) -> CoreError {
    err.into().report()
}
