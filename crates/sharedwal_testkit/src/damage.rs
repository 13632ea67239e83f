//! Simulated control file damage.
//!
//! A crash between the backup and primary writes, a torn page, or a bad
//! sector all leave the control file pair in states the store must cope
//! with. These helpers produce those states directly on disk.

use sharedwal_core::{ControlCopy, ControlFileStore};
use std::fs::{self, OpenOptions};
use std::path::Path;

fn copy_path(store: &ControlFileStore, copy: ControlCopy) -> &Path {
    match copy {
        ControlCopy::Primary => store.primary_path(),
        ControlCopy::Backup => store.backup_path(),
    }
}

/// Flips every bit of one byte at `offset` in the given copy.
pub fn flip_byte(store: &ControlFileStore, copy: ControlCopy, offset: u64) {
    let path = copy_path(store, copy);
    let mut data = fs::read(path).expect("Failed to read control file copy");
    let idx = usize::try_from(offset).expect("offset fits in memory");
    data[idx] ^= 0xFF;
    fs::write(path, data).expect("Failed to write control file copy");
}

/// Corrupts the record stored at `page` in the given copy.
pub fn corrupt_page(store: &ControlFileStore, copy: ControlCopy, page: u32, block_size: u64) {
    flip_byte(store, copy, u64::from(page) * block_size);
}

/// Truncates the given copy to `len` bytes.
pub fn truncate_copy(store: &ControlFileStore, copy: ControlCopy, len: u64) {
    let file = OpenOptions::new()
        .write(true)
        .open(copy_path(store, copy))
        .expect("Failed to open control file copy");
    file.set_len(len).expect("Failed to truncate control file copy");
}

/// Removes the given copy.
pub fn remove_copy(store: &ControlFileStore, copy: ControlCopy) {
    fs::remove_file(copy_path(store, copy)).expect("Failed to remove control file copy");
}

/// Replaces the primary with the current backup, as if a write had
/// completed on the backup and crashed before reaching the primary.
pub fn copy_backup_over_primary(store: &ControlFileStore) {
    fs::copy(store.backup_path(), store.primary_path())
        .expect("Failed to copy backup over primary");
}
