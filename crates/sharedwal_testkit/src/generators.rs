//! Property-based test generators using proptest.
//!
//! Provides strategies for generating control records, instance directory
//! names and commit-sequence commands.

use proptest::prelude::*;
use sharedwal_core::{CheckpointControl, ClusterStatus, CommitSeqNo, ReformerControl};

/// Strategy for generating cluster status values.
pub fn cluster_status_strategy() -> impl Strategy<Value = ClusterStatus> {
    prop_oneof![
        Just(ClusterStatus::Normal),
        Just(ClusterStatus::OndemandBuild),
        Just(ClusterStatus::OndemandRedo),
    ]
}

/// Strategy for generating reform control records.
pub fn reformer_control_strategy() -> impl Strategy<Value = ReformerControl> {
    (any::<u64>(), 0i32..64, cluster_status_strategy()).prop_map(|(bitmap, primary, status)| {
        ReformerControl::new(bitmap, primary, status)
    })
}

/// Strategy for generating checkpoint control records.
pub fn checkpoint_control_strategy() -> impl Strategy<Value = CheckpointControl> {
    (any::<u64>(), any::<u64>(), 1u32..16).prop_map(|(system_identifier, checkpoint_redo, timeline)| {
        CheckpointControl {
            system_identifier,
            checkpoint_redo,
            timeline,
        }
    })
}

/// Strategy for generating entries of a shared root directory.
///
/// Mixes well-formed instance directories with names that only share the
/// prefix and unrelated names.
pub fn shared_root_entry_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u32..64).prop_map(|id| format!("pg_xlog{id}")),
        prop::string::string_regex("pg_xlog[A-Za-z_]{1,4}").expect("Invalid regex"),
        prop::string::string_regex("[a-z_]{1,10}").expect("Invalid regex"),
    ]
}

/// Strategy for generating well-formed commit-sequence pinning commands.
pub fn pin_command_strategy() -> impl Strategy<Value = (String, CommitSeqNo)> {
    (1u64..1_000_000_000, prop::bool::ANY).prop_map(|(csn, commit)| {
        let kind = if commit { "SETCOMMITCSN" } else { "SETSNAPSHOTCSN" };
        (format!("SELECT {csn} AS {kind}"), csn)
    })
}
