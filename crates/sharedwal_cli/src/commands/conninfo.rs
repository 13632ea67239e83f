//! Conninfo command implementation.

use super::{open_context, CliError};
use serde::Serialize;
use sharedwal_core::{Config, ControlFileStore, ReplicationEndpointResolver};
use std::sync::Arc;

/// Result of resolving the replication endpoint.
#[derive(Debug, Serialize)]
pub struct ConninfoResult {
    /// Primary instance id used for the lookup.
    pub primary: i32,
    /// The connection string, if a candidate matched.
    pub conninfo: Option<String>,
}

/// Runs the conninfo command.
///
/// Without `--primary` the primary is taken from the control file.
pub fn run(config: Config, primary: Option<i32>, format: &str) -> Result<(), CliError> {
    let ctx = open_context(config)?;
    let primary = match primary {
        Some(primary) => primary,
        None => {
            ControlFileStore::new(Arc::clone(&ctx))
                .read_reformer()?
                .primary_instance_id
        }
    };

    let resolved = ReplicationEndpointResolver::new(ctx).resolve(primary);
    let result = ConninfoResult {
        primary,
        conninfo: resolved.map(|c| c.to_string()),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => match &result.conninfo {
            Some(conninfo) => println!("{conninfo}"),
            None => println!("No replication candidate for primary {}", result.primary),
        },
    }
    Ok(())
}
