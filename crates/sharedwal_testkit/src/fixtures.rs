//! Shared volume fixtures.
//!
//! Provides a temporary directory laid out like the shared storage volume
//! of a cluster, with a [`Context`] already pointing at it.

use sharedwal_core::{
    recovery_xlog_dir, segment_file_name, Config, Context, ControlFileStore,
    InstanceDirectoryScanner, TimeLineId, XLogReader, XLogSegNo, TimelineState,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Segment size used by [`SharedVolume::new`].
pub const TEST_SEGMENT_SIZE: u64 = 64 * 1024;

/// Pre-read unit used by [`SharedVolume::new`].
pub const TEST_PRE_READ_SIZE: usize = 8 * 1024;

/// A temporary shared volume with automatic cleanup.
pub struct SharedVolume {
    ctx: Arc<Context>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl SharedVolume {
    /// Creates a volume with small segments and pre-read units.
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Creates a volume, letting `configure` adjust the defaults.
    ///
    /// The shared root and control file always point into the volume.
    pub fn with_config(configure: impl FnOnce(Config) -> Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = Config::new()
            .segment_size(TEST_SEGMENT_SIZE)
            .pre_read_size(TEST_PRE_READ_SIZE);
        let config = configure(base)
            .shared_root(temp_dir.path())
            .control_file(temp_dir.path().join("pg_control"));
        let ctx = Context::new(config).expect("Failed to build context");

        Self {
            ctx: Arc::new(ctx),
            temp_dir,
        }
    }

    /// Returns the volume root.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Returns the process context.
    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Returns a control store over the volume's control file pair.
    pub fn control_store(&self) -> ControlFileStore {
        ControlFileStore::new(Arc::clone(&self.ctx))
    }

    /// Returns a scanner over the volume root.
    pub fn scanner(&self) -> InstanceDirectoryScanner {
        InstanceDirectoryScanner::new(Arc::clone(&self.ctx))
    }

    /// Creates the WAL directory of `instance_id` and returns its path.
    pub fn add_instance(&self, instance_id: i32) -> PathBuf {
        let config = self.ctx.config();
        let dir = recovery_xlog_dir(self.root(), &config.wal_dir_prefix, instance_id);
        fs::create_dir_all(&dir).expect("Failed to create WAL directory");
        dir
    }

    /// Writes a full segment whose every byte is `fill`.
    pub fn write_segment(&self, dir: &Path, tli: TimeLineId, segno: XLogSegNo, fill: u8) -> PathBuf {
        let config = self.ctx.config();
        let data = vec![fill; config.segment_size as usize];
        self.write_segment_bytes(dir, tli, segno, &data)
    }

    /// Writes `data` as a segment file, which may be shorter than a segment.
    pub fn write_segment_bytes(
        &self,
        dir: &Path,
        tli: TimeLineId,
        segno: XLogSegNo,
        data: &[u8],
    ) -> PathBuf {
        let name = segment_file_name(tli, segno, self.ctx.config().segments_per_log_id());
        let path = dir.join(name);
        fs::write(&path, data).expect("Failed to write segment");
        path
    }

    /// Returns a reader over `dir` with the given candidate timelines.
    pub fn reader(&self, dir: &Path, expected_tlis: Vec<TimeLineId>) -> XLogReader {
        XLogReader::new(&self.ctx, dir, TimelineState::new(expected_tlis))
            .expect("Failed to create reader")
    }
}

impl Default for SharedVolume {
    fn default() -> Self {
        Self::new()
    }
}
