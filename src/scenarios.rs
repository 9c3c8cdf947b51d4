//! End-to-end scenarios driving [`crate::Store`] as a whole, one test per
//! numbered scenario. Component-level unit tests already cover each stage
//! in isolation; these exercise the same behaviour the way a caller
//! actually would, through the public facade.

use tempfile::tempdir;
use vbstore_core::{Cas, Datatype, HlcEpochSeqno, PartitionId, SeqNo};
use vbstore_format::{DocInfo, VBucketStateDoc};

use crate::compaction::CompactionContext;
use crate::config::Config;
use crate::rollback::RollbackOutcome;
use crate::scan::{CacheLookup, ItemResult, ValueFilter};
use crate::store::Store;
use crate::write_path::{MutationOutcome, MutationStatus, Transaction};

fn doc(key: &[u8], seq: u64, deleted: bool, expiry: u32) -> DocInfo {
    DocInfo {
        key: key.to_vec(),
        cas: Cas(1),
        rev_seqno: 1,
        by_seqno: SeqNo(seq),
        expiry,
        flags: 0,
        datatype: Datatype::default(),
        hlc_cas_epoch_seqno: HlcEpochSeqno::UNSET,
        might_contain_xattrs: false,
        deleted,
    }
}

fn store(dir: &std::path::Path) -> Store {
    Store::open(Config { db_dir: dir.to_path_buf(), ..Default::default() }).unwrap()
}

/// Scenario 1: basic round-trip.
#[test]
fn scenario_1_basic_round_trip() {
    let dir = tempdir().unwrap();
    let store = store(dir.path());

    let outcomes = std::sync::Arc::new(std::sync::Mutex::new(Vec::<MutationOutcome>::new()));
    let mut txn = Transaction::begin();
    for key in [b"a".as_slice(), b"b".as_slice()] {
        let outcomes = std::sync::Arc::clone(&outcomes);
        let seq = if key == b"a" { 1 } else { 2 };
        let value = if key == b"a" { "1" } else { "2" };
        txn.set(doc(key, seq, false, 0), value.as_bytes().to_vec(), move |o| outcomes.lock().unwrap().push(o));
    }
    let info = store.commit(PartitionId(0), txn, &VBucketStateDoc::default(), None, false).unwrap();

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.status == MutationStatus::Success && o.was_insert));

    assert_eq!(store.get(PartitionId(0), b"a", false).unwrap().body, Some(b"1".to_vec()));
    assert_eq!(store.get(PartitionId(0), b"b", false).unwrap().body, Some(b"2".to_vec()));
    assert_eq!(info.doc_count, 2);
}

/// Scenario 2: delete then compact with `drop_deletes` drops the tombstone.
#[test]
fn scenario_2_delete_and_compact_drops_tombstone() {
    let dir = tempdir().unwrap();
    let store = store(dir.path());

    let mut txn = Transaction::begin();
    txn.set(doc(b"x", 1, false, 0), b"v".to_vec(), |_| {});
    store.commit(PartitionId(0), txn, &VBucketStateDoc::default(), None, false).unwrap();

    let mut txn = Transaction::begin();
    txn.delete(doc(b"x", 2, true, 0), Vec::new(), |_| {});
    store.commit(PartitionId(0), txn, &VBucketStateDoc::default(), None, false).unwrap();

    let ctx = CompactionContext {
        partition: PartitionId(0),
        purge_before_seq: SeqNo(0),
        purge_before_ts: 0,
        drop_deletes: true,
        now: 0,
        collections_eraser: None,
        expiry_callback: None,
        bloom_filter_callback: None,
    };
    let info = store.compact(ctx).unwrap();

    assert!(store.get(PartitionId(0), b"x", false).is_err());
    assert_eq!(info.deleted_count, 0);
    assert!(info.purge_seq >= SeqNo(2));
}

/// Scenario 3: TTL expiry during compaction notifies the expiry callback
/// and drops the expired document.
#[test]
fn scenario_3_ttl_expiry_during_compaction() {
    let dir = tempdir().unwrap();
    let store = store(dir.path());
    let t0 = 1_000u32;

    let mut txn = Transaction::begin();
    txn.set(doc(b"y", 1, false, t0), b"v".to_vec(), |_| {});
    store.commit(PartitionId(0), txn, &VBucketStateDoc::default(), None, false).unwrap();

    let mut notified = Vec::new();
    let ctx = CompactionContext {
        partition: PartitionId(0),
        purge_before_seq: SeqNo(0),
        purge_before_ts: 0,
        drop_deletes: false,
        now: t0 + 1,
        collections_eraser: None,
        expiry_callback: Some(Box::new(|info, _body| notified.push(info.key.clone()))),
        bloom_filter_callback: None,
    };
    store.compact(ctx).unwrap();

    assert_eq!(notified, vec![b"y".to_vec()]);
    assert!(store.get(PartitionId(0), b"y", false).is_err());
}

/// Scenario 4: rollback to an earlier header replays the discarded range
/// and leaves the earlier commit's data intact. Batch sizes are chosen to
/// discard under half the file's history — see `rollback.rs` for why a
/// rollback discarding half or more resets instead of succeeding.
#[test]
fn scenario_4_rollback_to_earlier_header() {
    let dir = tempdir().unwrap();
    let store = store(dir.path());

    let mut txn = Transaction::begin();
    for i in 1..=6u64 {
        txn.set(doc(format!("c1-{i}").as_bytes(), i, false, 0), b"v".to_vec(), |_| {});
    }
    store.commit(PartitionId(0), txn, &VBucketStateDoc::default(), None, false).unwrap();
    let target_high_seqno = store.get(PartitionId(0), b"c1-6", true).unwrap().info.by_seqno;

    let mut txn = Transaction::begin();
    txn.set(doc(b"c2-1", 7, false, 0), b"v".to_vec(), |_| {});
    txn.set(doc(b"c2-2", 8, false, 0), b"v".to_vec(), |_| {});
    store.commit(PartitionId(0), txn, &VBucketStateDoc::default(), None, false).unwrap();

    let mut txn = Transaction::begin();
    txn.set(doc(b"c3-1", 9, false, 0), b"v".to_vec(), |_| {});
    store.commit(PartitionId(0), txn, &VBucketStateDoc::default(), None, false).unwrap();

    let mut discarded = Vec::new();
    let outcome = store.rollback(PartitionId(0), target_high_seqno, |key| discarded.push(String::from_utf8(key.to_vec()).unwrap())).unwrap();
    match outcome {
        RollbackOutcome::Success { high_seqno, .. } => assert_eq!(high_seqno, target_high_seqno),
        RollbackOutcome::Reset => panic!("expected success"),
    }
    discarded.sort();
    assert_eq!(discarded, vec!["c2-1", "c2-2", "c3-1"]);

    for i in 1..=6u64 {
        assert!(store.get(PartitionId(0), format!("c1-{i}").as_bytes(), false).is_ok());
    }
}

/// Scenario 5: a scan cancelled by the value callback resumes from
/// `last_read_seq` on the next call.
#[test]
fn scenario_5_scan_cancellation_and_resume() {
    let dir = tempdir().unwrap();
    let store = store(dir.path());

    let mut txn = Transaction::begin();
    for i in 1..=1000u64 {
        txn.set(doc(format!("k{i}").as_bytes(), i, false, 0), b"v".to_vec(), |_| {});
    }
    store.commit(PartitionId(0), txn, &VBucketStateDoc::default(), None, false).unwrap();

    let mut ctx = store.init_scan_context(PartitionId(0), SeqNo(0), ValueFilter::KeysOnly).unwrap();
    let mut count = 0usize;
    let outcome = store
        .scan(&mut ctx, |_| true, |_| CacheLookup::NotPresent, |_| {
            count += 1;
            if count == 10 {
                ItemResult::OutOfMemory
            } else {
                ItemResult::Ok
            }
        })
        .unwrap();
    assert_eq!(outcome, vbstore_core::ScanOutcome::Again);
    assert_eq!(ctx.last_read_seq(), Some(SeqNo(10)));

    let mut resumed_from = None;
    let outcome = store
        .scan(&mut ctx, |_| true, |_| CacheLookup::NotPresent, |item| {
            resumed_from.get_or_insert(item.info.by_seqno);
            ItemResult::Ok
        })
        .unwrap();
    assert_eq!(outcome, vbstore_core::ScanOutcome::Success);
    assert_eq!(resumed_from, Some(SeqNo(11)));
    store.destroy_scan_context(ctx);
}

/// Scenario 6: events enqueued while the consumer is stalled past queue
/// capacity are dropped and counted exactly, with the rest retained for
/// delivery once the consumer resumes draining.
///
/// Exercised directly against `vbstore_audit`'s queue rather than the full
/// pipeline: the pipeline's consumer thread drains continuously, so
/// "stall the consumer" is naturally modeled as simply not calling
/// `wait_and_swap` yet, without needing a test-only blocking hook.
#[test]
fn scenario_6_audit_events_dropped_on_overflow_are_counted_exactly() {
    use vbstore_audit::{AuditEvent, EventQueue, Identity, QueuedItem};

    let capacity = 16;
    let queue = EventQueue::new(capacity);
    let identity = Identity { domain: "local".to_string(), user: "tester".to_string() };

    for i in 0..capacity + 5 {
        queue.enqueue(QueuedItem::Record(AuditEvent::new(1, identity.clone(), serde_json::json!({"i": i}))));
    }

    assert_eq!(queue.dropped_count(), 5);
    // The queue isn't empty, so this returns immediately without waiting.
    let drained = queue.wait_and_swap(std::time::Duration::from_millis(0));
    assert_eq!(drained.items.len(), capacity);
}
