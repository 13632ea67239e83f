//! CLI command implementations.

pub mod conninfo;
pub mod control;
pub mod scan;
pub mod segment;

use sharedwal_core::{Config, Context, CoreError};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by the CLI before the core is involved.
#[derive(Debug, Error)]
pub enum CliError {
    /// The configuration file could not be read.
    #[error("cannot read config {path}: {source}")]
    ConfigRead {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`Config`].
    #[error("cannot parse config {path}: {source}")]
    ConfigParse {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// Output could not be serialized.
    #[error("cannot format output: {0}")]
    Output(#[from] serde_json::Error),

    /// A command-line value is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The core reported an error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Loads the configuration, applying the `--root` override.
///
/// A relative control file path is taken relative to the shared root.
pub fn load_config(path: Option<&Path>, root: Option<PathBuf>) -> Result<Config, CliError> {
    let mut config = match path {
        Some(path) => {
            let file = File::open(path).map_err(|source| CliError::ConfigRead {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_reader(BufReader::new(file)).map_err(|source| {
                CliError::ConfigParse {
                    path: path.to_path_buf(),
                    source,
                }
            })?
        }
        None => Config::default(),
    };

    if let Some(root) = root {
        config.shared_root = root;
    }
    if config.control_file.is_relative() {
        config.control_file = config.shared_root.join(&config.control_file);
    }
    Ok(config)
}

/// Builds the process context for one command.
pub fn open_context(config: Config) -> Result<Arc<Context>, CliError> {
    Ok(Arc::new(Context::new(config)?))
}

/// Turns a list of node ids into a stable-node bitmap.
pub fn stable_bitmap(nodes: &[u32]) -> Result<u64, CliError> {
    nodes.iter().try_fold(0u64, |bitmap, &node| {
        if node >= 64 {
            return Err(CliError::InvalidArgument(format!(
                "stable node id {node} is outside 0..64"
            )));
        }
        Ok(bitmap | (1 << node))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"shared_root": "/vol", "dual_site_replication": true}}"#).unwrap();

        let config = load_config(Some(file.path()), None).unwrap();
        assert_eq!(config.shared_root, PathBuf::from("/vol"));
        assert_eq!(config.control_file, PathBuf::from("/vol/pg_control"));
        assert!(config.dual_site_replication);
    }

    #[test]
    fn test_root_override() {
        let config = load_config(None, Some(PathBuf::from("/mnt/shared"))).unwrap();
        assert_eq!(config.shared_root, PathBuf::from("/mnt/shared"));
        assert_eq!(config.control_file, PathBuf::from("/mnt/shared/pg_control"));
    }

    #[test]
    fn test_bad_json_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            load_config(Some(file.path()), None),
            Err(CliError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_stable_bitmap() {
        assert_eq!(stable_bitmap(&[0, 2, 63]).unwrap(), 0b101 | (1 << 63));
        assert!(stable_bitmap(&[64]).is_err());
    }
}
