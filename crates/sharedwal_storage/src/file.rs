//! Positioned file I/O over shared storage.

use crate::error::{StorageError, StorageResult};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(windows)]
use std::os::windows::fs::FileExt;

/// How a [`DeviceFile`] is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only; the file must exist.
    ReadOnly,
    /// Read-write; the file must exist.
    ReadWrite,
    /// Read-write; the file is created if absent and never truncated.
    CreateReadWrite,
}

/// A file handle that performs only positioned I/O.
///
/// Other nodes may append to the same file on the shared volume, so the
/// handle never caches the file size and never moves a seek cursor.
/// Each read or write names its own offset.
///
/// # Durability
///
/// [`DeviceFile::close`] syncs a writable handle before releasing it and
/// reports any failure. Dropping the handle without `close` discards
/// that report.
///
/// # Example
///
/// ```no_run
/// use sharedwal_storage::{DeviceFile, OpenMode};
/// use std::path::Path;
///
/// let file = DeviceFile::open(Path::new("pg_control"), OpenMode::ReadOnly).unwrap();
/// let mut block = [0u8; 32];
/// file.read_exact_at(&mut block, 8192 * 64).unwrap();
/// file.close().unwrap();
/// ```
#[derive(Debug)]
pub struct DeviceFile {
    path: PathBuf,
    file: File,
    mode: OpenMode,
}

impl DeviceFile {
    /// Opens a file in the given mode.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] carrying the path and OS error. Use
    /// [`StorageError::is_not_found`] to tell a missing file from a fault.
    pub fn open(path: &Path, mode: OpenMode) -> StorageResult<Self> {
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::ReadOnly => {
                options.read(true);
            }
            OpenMode::ReadWrite => {
                options.read(true).write(true);
            }
            OpenMode::CreateReadWrite => {
                options.read(true).write(true).create(true).truncate(false);
            }
        }

        let file = options.open(path).map_err(|source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            mode,
        })
    }

    /// Returns the path this handle was opened with.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Issues one positioned read into `buf` and returns the byte count.
    ///
    /// A single call may return fewer bytes than requested, for example
    /// at the current end of a segment another node is still filling.
    ///
    /// An interrupted read is retried.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the OS read fails.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> StorageResult<usize> {
        retry_interrupted(|| self.pread(buf, offset)).map_err(|source| StorageError::Read {
            path: self.path.clone(),
            offset,
            source,
        })
    }

    /// Issues one positioned read and requires it to fill `buf` exactly.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ShortRead`] if fewer bytes came back, or
    /// [`StorageError::Read`] if the OS read fails.
    pub fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> StorageResult<()> {
        let actual = self.read_at(buf, offset)?;
        if actual != buf.len() {
            return Err(StorageError::ShortRead {
                path: self.path.clone(),
                offset,
                expected: buf.len(),
                actual,
            });
        }
        Ok(())
    }

    /// Writes all of `data` at `offset`, retrying interrupted writes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the OS write fails.
    pub fn write_all_at(&self, data: &[u8], offset: u64) -> StorageResult<()> {
        let mut written = 0usize;
        while written < data.len() {
            let pos = offset + written as u64;
            let n = retry_interrupted(|| self.pwrite(&data[written..], pos))
                .map_err(|source| StorageError::Write {
                    path: self.path.clone(),
                    offset: pos,
                    source,
                })?;
            if n == 0 {
                return Err(StorageError::Write {
                    path: self.path.clone(),
                    offset: pos,
                    source: io::Error::from(io::ErrorKind::WriteZero),
                });
            }
            written += n;
        }
        Ok(())
    }

    /// Syncs data and metadata to stable storage.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sync`] if the sync fails.
    pub fn sync(&self) -> StorageResult<()> {
        self.file.sync_all().map_err(|source| StorageError::Sync {
            path: self.path.clone(),
            source,
        })
    }

    /// Releases the handle, syncing first if it was opened for writing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sync`] if the final sync fails.
    pub fn close(self) -> StorageResult<()> {
        if self.mode != OpenMode::ReadOnly {
            self.sync()?;
        }
        drop(self.file);
        Ok(())
    }

    #[cfg(unix)]
    fn pread(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.file.read_at(buf, offset)
    }

    #[cfg(windows)]
    fn pread(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.file.seek_read(buf, offset)
    }

    #[cfg(unix)]
    fn pwrite(&self, data: &[u8], offset: u64) -> io::Result<usize> {
        self.file.write_at(data, offset)
    }

    #[cfg(windows)]
    fn pwrite(&self, data: &[u8], offset: u64) -> io::Result<usize> {
        self.file.seek_write(data, offset)
    }
}

/// Repeats `op` while it fails with [`io::ErrorKind::Interrupted`].
fn retry_interrupted<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match op() {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            result => return result,
        }
    }
}
