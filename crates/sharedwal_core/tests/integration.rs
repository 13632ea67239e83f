//! Integration tests for control files, WAL reading and cluster reform.

use proptest::prelude::*;
use sharedwal_core::{
    encode_record, verify_record, CheckpointControl, ClusterStatus, ControlCopy, CoreError,
    CsnSession, PageRead, ReadSource, ReformerControl, ReplConnInfo, ReplicationEndpointResolver,
    Severity, Verification, CHECKSUM_LEN, REFORM_CTRL_PAGE,
};
use sharedwal_testkit::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;

fn block_size(volume: &SharedVolume) -> u64 {
    volume.context().config().block_size
}

// ============================================================================
// Control files
// ============================================================================

#[test]
fn reform_record_survives_restart() {
    let volume = SharedVolume::new();
    let record = ReformerControl::new(0b1011, 3, ClusterStatus::OndemandBuild);
    volume.control_store().write_reformer(&record).unwrap();

    // A fresh store sees only what is on disk.
    let reread = volume.control_store().read_reformer().unwrap();
    assert_eq!(reread, record);
    assert_eq!(volume.context().primary_instance_id(), Some(3));
    assert_eq!(volume.context().stable_node_ids(), vec![0, 1, 3]);
}

#[test]
fn corrupt_primary_falls_back_to_backup() {
    let volume = SharedVolume::new();
    let store = volume.control_store();
    let record = ReformerControl::new(0b11, 1, ClusterStatus::Normal);
    store.write_reformer(&record).unwrap();

    corrupt_page(&store, ControlCopy::Primary, REFORM_CTRL_PAGE, block_size(&volume));

    assert_eq!(store.read_reformer().unwrap(), record);
}

#[test]
fn both_copies_corrupt_is_fatal() {
    let volume = SharedVolume::new();
    let store = volume.control_store();
    store
        .write_reformer(&ReformerControl::new(0b1, 0, ClusterStatus::Normal))
        .unwrap();

    corrupt_page(&store, ControlCopy::Primary, REFORM_CTRL_PAGE, block_size(&volume));
    corrupt_page(&store, ControlCopy::Backup, REFORM_CTRL_PAGE, block_size(&volume));

    let err = store.read_reformer().unwrap_err();
    assert!(matches!(
        err,
        CoreError::Corruption {
            copy: ControlCopy::Backup,
            ..
        }
    ));
    assert!(err.severity().is_terminal());
}

#[test]
fn crash_after_backup_write_keeps_old_primary() {
    let volume = SharedVolume::new();
    let store = volume.control_store();
    let old = ReformerControl::new(0b1, 0, ClusterStatus::Normal);
    let new = ReformerControl::new(0b11, 1, ClusterStatus::Normal);
    store.write_reformer(&old).unwrap();
    let stale_primary = fs::read(store.primary_path()).unwrap();

    store.write_reformer(&new).unwrap();
    // Undo the primary half of the second write.
    fs::write(store.primary_path(), stale_primary).unwrap();

    assert_eq!(store.read_reformer().unwrap(), old);

    copy_backup_over_primary(&store);
    assert_eq!(store.read_reformer().unwrap(), new);
}

#[test]
fn missing_backup_is_recreated_on_write() {
    let volume = SharedVolume::new();
    let store = volume.control_store();
    let record = ReformerControl::new(0b1, 0, ClusterStatus::Normal);
    store.write_reformer(&record).unwrap();
    remove_copy(&store, ControlCopy::Backup);

    store.write_reformer(&record).unwrap();
    assert_eq!(
        fs::read(store.primary_path()).unwrap(),
        fs::read(store.backup_path()).unwrap()
    );
}

#[test]
fn truncated_primary_is_an_io_failure() {
    let volume = SharedVolume::new();
    let store = volume.control_store();
    store
        .write_reformer(&ReformerControl::new(0b1, 0, ClusterStatus::Normal))
        .unwrap();
    truncate_copy(&store, ControlCopy::Primary, 16);

    let err = store.read_reformer().unwrap_err();
    assert_eq!(err.severity(), Severity::Panic);
}

#[test]
fn checkpoint_pages_are_independent_of_reform_page() {
    let volume = SharedVolume::new();
    let store = volume.control_store();
    let reform = ReformerControl::new(0b101, 2, ClusterStatus::Normal);
    store.write_reformer(&reform).unwrap();

    for instance in [0u32, 2] {
        let record = CheckpointControl {
            system_identifier: 7,
            checkpoint_redo: 0x1000 * u64::from(instance + 1),
            timeline: 1,
        };
        store.write_checkpoint(instance, &record).unwrap();
    }

    assert_eq!(store.read_checkpoint(0).unwrap().checkpoint_redo, 0x1000);
    assert_eq!(store.read_checkpoint(2).unwrap().checkpoint_redo, 0x3000);
    assert_eq!(volume.context().checkpoint_redo(), 0x3000);
    assert_eq!(store.read_reformer().unwrap(), reform);
}

proptest! {
    #[test]
    fn any_body_flip_is_detected(record in reformer_control_strategy(), idx in 0usize..16) {
        let mut bytes = encode_record(&record);
        prop_assert_eq!(bytes.len(), 16 + CHECKSUM_LEN);
        bytes[idx] ^= 0x01;
        let verified = verify_record::<ReformerControl>(&bytes).unwrap();
        let is_mismatch = matches!(verified, Verification::ChecksumMismatch { .. });
        prop_assert!(is_mismatch);
    }

    #[test]
    fn checkpoint_records_verify(record in checkpoint_control_strategy()) {
        let bytes = encode_record(&record);
        prop_assert_eq!(
            verify_record::<CheckpointControl>(&bytes).unwrap(),
            Verification::Valid(record)
        );
    }
}

// ============================================================================
// Instance directories
// ============================================================================

#[test]
fn scan_finds_instance_dirs() {
    let volume = SharedVolume::new();
    for name in ["pg_xlog0", "pg_xlog3", "pg_xlogAB"] {
        fs::create_dir(volume.root().join(name)).unwrap();
    }

    let list = volume.scanner().scan_shared_root().unwrap();
    let found: HashSet<i32> = list.found().collect();

    assert_eq!(found, HashSet::from([0, 3]));
    assert_eq!(list.found().count(), 3);
    assert_eq!(volume.context().instance_dirs(), list);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn scan_counts_every_prefixed_entry(
        names in prop::collection::hash_set(shared_root_entry_strategy(), 0..20)
    ) {
        let volume = SharedVolume::new();
        for name in &names {
            fs::create_dir(volume.root().join(name)).unwrap();
        }

        let list = volume.scanner().scan(volume.root()).unwrap();
        let expected = names
            .iter()
            .filter(|n| n.len() > "pg_xlog".len() && n.starts_with("pg_xlog"))
            .count();
        prop_assert_eq!(list.found().count(), expected);
    }
}

// ============================================================================
// WAL reading
// ============================================================================

#[test]
fn page_inside_window_matches_direct_read() {
    let volume = SharedVolume::with_config(|c| c.segment_size(1 << 20).pre_read_size(64 * 1024));
    let dir = volume.add_instance(0);
    let data: Vec<u8> = (0..1u32 << 20).map(|i| (i % 251) as u8).collect();
    volume.write_segment_bytes(&dir, 1, 0, &data);

    let mut reader = volume.reader(&dir, vec![1]);
    let mut page = vec![0u8; 8192];
    reader
        .read_page(0, 0, &mut page, ReadSource::PgXlog, Severity::Fatal)
        .unwrap();
    let fetches = reader.cache().fetch_count();

    let result = reader
        .read_page(4096, 4096, &mut page[..4096], ReadSource::PgXlog, Severity::Fatal)
        .unwrap();

    assert_eq!(result, PageRead::Read(4096));
    assert_eq!(&page[..4096], &data[4096..8192]);
    assert_eq!(reader.cache().fetch_count(), fetches);
}

#[test]
fn timeline_search_stops_at_current_file_timeline() {
    let volume = SharedVolume::new();
    let dir = volume.add_instance(0);
    volume.write_segment(&dir, 3, 0, 0x30);
    volume.write_segment(&dir, 1, 1, 0x10);

    let mut reader = volume.reader(&dir, vec![5, 3, 1]);
    let mut page = vec![0u8; 128];
    reader
        .read_page(0, 0, &mut page, ReadSource::PgXlog, Severity::Warning)
        .unwrap();
    assert_eq!(reader.timeline().cur_file_tli, 3);

    let next = reader
        .read_page(TEST_SEGMENT_SIZE, 0, &mut page, ReadSource::PgXlog, Severity::Warning)
        .unwrap();
    assert_eq!(next, PageRead::NotFound);
}

#[test]
fn dual_site_does_not_fall_back_to_older_timeline() {
    let volume = SharedVolume::with_config(|c| c.dual_site_replication(true));
    let dir = volume.add_instance(0);
    volume.write_segment(&dir, 1, 0, 0x10);

    let mut reader = volume.reader(&dir, vec![2, 1]);
    let mut page = vec![0u8; 128];
    let result = reader
        .read_page(0, 0, &mut page, ReadSource::PgXlog, Severity::Panic)
        .unwrap();
    assert_eq!(result, PageRead::NotFound);
}

#[test]
fn missing_segment_at_panic_severity_is_an_error() {
    let volume = SharedVolume::new();
    let dir = volume.add_instance(0);

    let mut reader = volume.reader(&dir, vec![1]);
    let mut page = vec![0u8; 128];
    let err = reader
        .read_page(0, 0, &mut page, ReadSource::Archive, Severity::Panic)
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::SegmentNotFound {
            severity: Severity::Panic,
            ..
        }
    ));
}

#[test]
fn partial_segment_is_a_short_read() {
    let volume = SharedVolume::new();
    let dir = volume.add_instance(0);
    volume.write_segment_bytes(&dir, 1, 0, &[0xEE; 1000]);

    let mut reader = volume.reader(&dir, vec![1]);
    let mut page = vec![0u8; 512];
    let result = reader
        .read_page(0, 0, &mut page, ReadSource::PgXlog, Severity::Warning)
        .unwrap();

    assert_eq!(
        result,
        PageRead::ShortRead {
            expected: TEST_PRE_READ_SIZE,
            actual: 1000,
        }
    );
    assert_eq!(reader.cache().window_start(), None);
}

#[test]
fn follower_sees_bytes_written_after_flush_advances() {
    let volume = SharedVolume::with_config(|c| c.realtime_follower(true));
    let dir = volume.add_instance(0);
    let path = volume.write_segment(&dir, 1, 0, 0x00);
    let progress = Arc::clone(volume.context().progress());
    progress.set_recovery_done(true);
    progress.advance_receiver_write_ptr(1024);

    let mut reader = volume.reader(&dir, vec![1]);
    let mut page = vec![0u8; 256];
    reader
        .read_page(0, 0, &mut page, ReadSource::Stream, Severity::Warning)
        .unwrap();
    assert_eq!(reader.cache().confirmed_flush_ptr(), 1024);

    // The receiver appends beyond the old flush point.
    let mut data = fs::read(&path).unwrap();
    data[2048..2304].fill(0x5A);
    fs::write(&path, data).unwrap();
    progress.advance_receiver_write_ptr(4096);

    reader
        .read_page(2048, 2048, &mut page, ReadSource::Stream, Severity::Warning)
        .unwrap();
    assert_eq!(page, vec![0x5A; 256]);
    assert_eq!(reader.cache().confirmed_flush_ptr(), 4096);
    assert_eq!(reader.cache().fetch_count(), 2);
}

// ============================================================================
// Cluster reform
// ============================================================================

#[test]
fn reform_then_resolve_conninfo() {
    let volume = SharedVolume::with_config(|c| {
        c.member_addresses(vec!["10.0.0.1".into(), "10.0.0.2".into()])
            .add_replconninfo(ReplConnInfo {
                remotehost: "10.0.0.2".into(),
                remoteport: 5432,
                localhost: "10.0.0.1".into(),
                localport: 5433,
            })
    });
    volume
        .control_store()
        .write_reformer(&ReformerControl::new(0b11, 1, ClusterStatus::Normal))
        .unwrap();

    let resolver = ReplicationEndpointResolver::new(Arc::clone(volume.context()));
    let conninfo = resolver.resolve_current().unwrap();

    assert_eq!(
        conninfo.as_str(),
        "host=10.0.0.2 port=5432 localhost=10.0.0.1 localport=5433"
    );
    assert_eq!(volume.context().conninfo(), Some(conninfo));
}

#[test]
fn commit_sequence_follows_config() {
    let volume = SharedVolume::with_config(|c| c.enable_global_logical_time(true));
    let glt = volume.context().commit_sequence();
    let mut session = CsnSession::new();

    assert!(glt.is_enabled());
    assert!(glt.detect_special_csn_command(&mut session, "SELECT 900 AS SETCOMMITCSN"));
    glt.advance_local_csn_on_commit(&mut session, 1);

    assert_eq!(session.commit_csn, Some(900));
    assert_eq!(volume.context().csn_clock().next(), 901);
}

proptest! {
    #[test]
    fn pin_commands_are_detected((query, csn) in pin_command_strategy()) {
        let volume = SharedVolume::with_config(|c| c.enable_global_logical_time(true));
        let mut session = CsnSession::new();
        prop_assert!(volume
            .context()
            .commit_sequence()
            .detect_special_csn_command(&mut session, &query));
        let stashed = session.commit_stash.or(session.snapshot_stash);
        prop_assert_eq!(stashed, Some(csn));
    }
}
