//! Control command implementation.

use super::{open_context, stable_bitmap, CliError};
use serde::Serialize;
use sharedwal_core::{
    CheckpointControl, ClusterStatus, Config, ControlFileStore, CoreError, ReformerControl,
};
use sharedwal_storage::{DeviceFile, OpenMode};
use tracing::info;

/// Reform control record as shown to the user.
#[derive(Debug, Serialize)]
pub struct ControlReport {
    /// Primary control file path.
    pub path: String,
    /// Primary instance id.
    pub primary_instance_id: i32,
    /// Stable node ids.
    pub stable_nodes: Vec<usize>,
    /// Cluster status.
    pub cluster_status: ClusterStatus,
    /// Checkpoint records (if requested).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub checkpoints: Vec<CheckpointReport>,
}

/// One instance's checkpoint record.
#[derive(Debug, Serialize)]
pub struct CheckpointReport {
    /// Instance id.
    pub instance: u32,
    /// The record.
    #[serde(flatten)]
    pub record: CheckpointControl,
}

/// Runs `control show`.
pub fn show(config: Config, instances: &[u32], format: &str) -> Result<(), CliError> {
    let ctx = open_context(config)?;
    let store = ControlFileStore::new(ctx);
    let record = store.read_reformer()?;

    let checkpoints = instances
        .iter()
        .map(|&instance| {
            store
                .read_checkpoint(instance)
                .map(|record| CheckpointReport { instance, record })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let report = ControlReport {
        path: store.primary_path().display().to_string(),
        primary_instance_id: record.primary_instance_id,
        stable_nodes: record.stable_node_ids(),
        cluster_status: record.cluster_status,
        checkpoints,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text_output(&report),
    }
    Ok(())
}

/// Runs `control init`: creates the primary copy if needed and writes the
/// first reform record to both copies.
pub fn init(config: Config, primary: i32, stable: &[u32]) -> Result<(), CliError> {
    info!("Initializing control file {:?}", config.control_file);
    let ctx = open_context(config)?;
    let store = ControlFileStore::new(ctx);

    DeviceFile::open(store.primary_path(), OpenMode::CreateReadWrite)
        .and_then(DeviceFile::close)
        .map_err(CoreError::from)?;

    let record = ReformerControl::new(stable_bitmap(stable)?, primary, ClusterStatus::Normal);
    store.write_reformer(&record)?;
    info!(
        path = %store.primary_path().display(),
        primary,
        stable = ?record.stable_node_ids(),
        "control file initialized"
    );
    Ok(())
}

/// Runs `control set`: read-modify-write of the reform record.
pub fn set(
    config: Config,
    primary: Option<i32>,
    stable: Option<&[u32]>,
    status: Option<ClusterStatus>,
) -> Result<(), CliError> {
    info!("Updating reform record in {:?}", config.control_file);
    let ctx = open_context(config)?;
    let store = ControlFileStore::new(ctx);
    let mut record = store.read_reformer()?;

    if let Some(primary) = primary {
        record.primary_instance_id = primary;
    }
    if let Some(stable) = stable {
        record.stable_node_bitmap = stable_bitmap(stable)?;
    }
    if let Some(status) = status {
        record.cluster_status = status;
    }

    store.write_reformer(&record)?;
    info!(
        primary = record.primary_instance_id,
        stable = ?record.stable_node_ids(),
        status = %record.cluster_status,
        "reform record updated"
    );
    Ok(())
}

fn print_text_output(report: &ControlReport) {
    println!("Control File: {}", report.path);
    println!("  Primary Instance: {}", report.primary_instance_id);
    println!("  Stable Nodes:     {:?}", report.stable_nodes);
    println!("  Cluster Status:   {}", report.cluster_status);
    for cp in &report.checkpoints {
        println!(
            "  Instance {:>2}: system={} redo={:X} timeline={}",
            cp.instance, cp.record.system_identifier, cp.record.checkpoint_redo, cp.record.timeline
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn config(root: &std::path::Path) -> Config {
        Config::new()
            .shared_root(root)
            .control_file(root.join("pg_control"))
    }

    #[test]
    fn test_init_then_set() {
        let dir = tempdir().unwrap();
        init(config(dir.path()), 1, &[0, 1]).unwrap();
        set(config(dir.path()), Some(0), None, Some(ClusterStatus::OndemandRedo)).unwrap();

        let ctx = open_context(config(dir.path())).unwrap();
        let record = ControlFileStore::new(ctx).read_reformer().unwrap();
        assert_eq!(record.primary_instance_id, 0);
        assert_eq!(record.stable_node_ids(), vec![0, 1]);
        assert_eq!(record.cluster_status, ClusterStatus::OndemandRedo);
        assert!(dir.path().join("pg_control.backup").exists());
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_mutations_are_logged() {
        let dir = tempdir().unwrap();
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            init(config(dir.path()), 2, &[1, 2]).unwrap();
            set(config(dir.path()), None, None, Some(ClusterStatus::Normal)).unwrap();
        });

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("control file initialized"));
        assert!(output.contains("primary=2"));
        assert!(output.contains("reform record updated"));
        assert!(output.contains("stable=[1, 2]"));
    }

    #[test]
    fn test_show_without_control_file_fails() {
        let dir = tempdir().unwrap();
        assert!(show(config(dir.path()), &[], "text").is_err());
    }
}
