//! Scan command implementation.

use super::{open_context, CliError};
use serde::Serialize;
use sharedwal_core::{recovery_xlog_dir, Config, InstanceDirectoryScanner};
use std::sync::Arc;

/// One instance WAL directory found on the shared root.
#[derive(Debug, Serialize)]
pub struct InstanceEntry {
    /// Slot in the instance list.
    pub slot: usize,
    /// Parsed instance id.
    pub instance_id: i32,
    /// Directory the id maps back to.
    pub dir: String,
}

/// Runs the scan command.
pub fn run(config: Config, format: &str) -> Result<(), CliError> {
    let ctx = open_context(config)?;
    let list = InstanceDirectoryScanner::new(Arc::clone(&ctx)).scan_shared_root()?;

    let root = &ctx.config().shared_root;
    let prefix = &ctx.config().wal_dir_prefix;
    let entries: Vec<InstanceEntry> = list
        .found()
        .enumerate()
        .map(|(slot, instance_id)| InstanceEntry {
            slot,
            instance_id,
            dir: recovery_xlog_dir(root, prefix, instance_id)
                .display()
                .to_string(),
        })
        .collect();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        _ => {
            println!("Shared Root: {}", root.display());
            if entries.is_empty() {
                println!("  (no instance directories)");
            }
            for entry in &entries {
                println!("  [{:>2}] instance {:<3} {}", entry.slot, entry.instance_id, entry.dir);
            }
        }
    }
    Ok(())
}
