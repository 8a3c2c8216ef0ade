use std::collections::HashSet;
use std::sync::Arc;

use dlock_harness::{MemLockSys, RecordLockRequest, RecordingSink, RecordingWaitSink};
use dlock_inspect::{
    DataLockInspector, DataLockWaitIterator, InspectTable, ScanConfig, ScanEventLog, ScanPass,
};
use dlock_types::{LockHandle, LockMode, LockStatus, RecordLockFlags, TrxHandle, TrxId};

fn drain(iter: &mut DataLockWaitIterator<MemLockSys>, sink: &mut RecordingWaitSink) {
    for _ in 0..10_000 {
        if iter.scan(sink) {
            return;
        }
    }
    panic!("wait scan did not finish");
}

fn edges_of(engine: &Arc<MemLockSys>) -> Vec<(String, String)> {
    let mut iter = DataLockWaitIterator::new(Arc::clone(engine));
    let mut sink = RecordingWaitSink::new();
    drain(&mut iter, &mut sink);
    sink.edges()
        .into_iter()
        .map(|(r, b)| (r.to_owned(), b.to_owned()))
        .collect()
}

fn rec(
    engine: &MemLockSys,
    trx: TrxHandle,
    mode: LockMode,
    flags: RecordLockFlags,
    heaps: &[u32],
) -> LockHandle {
    engine
        .add_record_lock(
            trx,
            RecordLockRequest::new(9, "app/accounts", 5, 4, mode, heaps).flags(flags),
        )
        .unwrap()
}

/// Holder 10, then a waiting exclusive request by 20, then a waiting shared
/// request by 30, all on slot 3.
fn contended() -> Arc<MemLockSys> {
    let engine = Arc::new(MemLockSys::new());
    let next_key = RecordLockFlags::next_key();
    let a = engine.begin_rw(10, 1).unwrap();
    let b = engine.begin_rw(20, 2).unwrap();
    let c = engine.begin_rw(30, 3).unwrap();
    rec(&engine, a, LockMode::Exclusive, next_key, &[3]);
    let b_wait = rec(&engine, b, LockMode::Exclusive, next_key, &[3]);
    let c_wait = rec(&engine, c, LockMode::Shared, next_key, &[3]);
    engine.set_wait(b, b_wait).unwrap();
    engine.set_wait(c, c_wait).unwrap();
    engine
}

fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
    expected
        .iter()
        .map(|(r, b)| ((*r).to_owned(), (*b).to_owned()))
        .collect()
}

#[test]
fn one_edge_per_conflicting_lock_ahead() {
    let engine = contended();
    assert_eq!(
        edges_of(&engine),
        pairs(&[
            ("20:5:4:3", "10:5:4:3"),
            ("30:5:4:3", "20:5:4:3"),
            ("30:5:4:3", "10:5:4:3"),
        ])
    );
}

#[test]
fn nothing_without_waiters() {
    let engine = Arc::new(MemLockSys::new());
    let a = engine.begin_rw(1, 1).unwrap();
    let b = engine.begin_rw(2, 2).unwrap();
    let next_key = RecordLockFlags::next_key();
    rec(&engine, a, LockMode::Exclusive, next_key, &[3]);
    let queued = rec(&engine, b, LockMode::Exclusive, next_key, &[3]);
    assert!(edges_of(&engine).is_empty());

    engine.set_wait(b, queued).unwrap();
    assert_eq!(edges_of(&engine), pairs(&[("2:5:4:3", "1:5:4:3")]));
    engine.clear_wait(b).unwrap();
    assert!(edges_of(&engine).is_empty());
}

#[test]
fn gap_rules_decide_edges() {
    let engine = Arc::new(MemLockSys::new());
    let next_key = RecordLockFlags::next_key();
    let holder = engine.begin_rw(1, 1).unwrap();
    rec(&engine, holder, LockMode::Exclusive, next_key, &[1, 3]);

    let gap = engine.begin_rw(2, 2).unwrap();
    let gap_wait = rec(&engine, gap, LockMode::Exclusive, next_key.with_gap(), &[3]);
    engine.set_wait(gap, gap_wait).unwrap();

    let insert = engine.begin_rw(3, 3).unwrap();
    let insert_wait = rec(
        &engine,
        insert,
        LockMode::Exclusive,
        next_key.with_gap().with_insert_intention(),
        &[3],
    );
    engine.set_wait(insert, insert_wait).unwrap();

    let supremum = engine.begin_rw(4, 4).unwrap();
    let supremum_wait = rec(&engine, supremum, LockMode::Exclusive, next_key, &[1]);
    engine.set_wait(supremum, supremum_wait).unwrap();

    // only the insert intention waits: on the gap request ahead of it and on
    // the next-key holder
    assert_eq!(
        edges_of(&engine),
        pairs(&[("3:5:4:3", "2:5:4:3"), ("3:5:4:3", "1:5:4:3")])
    );
}

#[test]
fn blocking_id_names_the_contended_slot() {
    let engine = Arc::new(MemLockSys::new());
    let next_key = RecordLockFlags::next_key();
    let holder = engine.begin_rw(1, 1).unwrap();
    rec(&engine, holder, LockMode::Exclusive, next_key, &[2, 3, 4]);
    let waiter = engine.begin_rw(2, 2).unwrap();
    let wait = rec(&engine, waiter, LockMode::Exclusive, next_key, &[3]);
    engine.set_wait(waiter, wait).unwrap();

    assert_eq!(edges_of(&engine), pairs(&[("2:5:4:3", "1:5:4:3")]));
}

#[test]
fn table_lock_waits() {
    let engine = Arc::new(MemLockSys::new());
    let a = engine.begin_rw(1, 1).unwrap();
    let b = engine.begin_rw(2, 2).unwrap();
    engine
        .add_table_lock(a, 9, "app/accounts", LockMode::IntentionExclusive)
        .unwrap();
    let compatible = engine
        .add_table_lock(b, 9, "app/accounts", LockMode::IntentionExclusive)
        .unwrap();
    let shared = engine
        .add_table_lock(b, 9, "app/accounts", LockMode::Shared)
        .unwrap();

    engine.set_wait(b, compatible).unwrap();
    assert!(edges_of(&engine).is_empty());
    engine.set_wait(b, shared).unwrap();
    assert_eq!(edges_of(&engine), pairs(&[("2:9", "1:9")]));
}

#[test]
fn edge_sides_match_lock_rows() {
    let engine = contended();
    let inspector = DataLockInspector::new(Arc::clone(&engine));

    let mut locks = RecordingSink::new();
    let mut iter = inspector.lock_iterator();
    while !iter.scan(&mut locks, false) {}

    let mut waits = RecordingWaitSink::new();
    let mut iter = inspector.lock_wait_iterator();
    drain(&mut iter, &mut waits);
    assert_eq!(waits.rows.len(), 3);

    for row in &waits.rows {
        assert_eq!(row.engine, "INNODB");
        for side in [&row.requesting, &row.blocking] {
            let lock = locks
                .rows
                .iter()
                .find(|l| l.engine_lock_id == side.engine_lock_id)
                .unwrap_or_else(|| panic!("no lock row {}", side.engine_lock_id));
            assert_eq!(lock.trx_id, side.trx_id);
            assert_eq!(lock.thread_event, side.thread_event);
            assert_eq!(lock.identity, side.identity);
        }
    }

    let waiting: HashSet<&str> = locks
        .rows
        .iter()
        .filter(|l| l.lock_status == LockStatus::Waiting)
        .map(|l| l.engine_lock_id.as_str())
        .collect();
    let requesting: HashSet<&str> = waits
        .rows
        .iter()
        .map(|r| r.requesting.engine_lock_id.as_str())
        .collect();
    assert_eq!(waiting, requesting);
}

#[test]
fn fetch_pairs() {
    let engine = contended();
    let iter = DataLockWaitIterator::new(Arc::clone(&engine));
    let scanned = {
        let mut iter = DataLockWaitIterator::new(Arc::clone(&engine));
        let mut sink = RecordingWaitSink::new();
        drain(&mut iter, &mut sink);
        sink.rows
    };

    for row in &scanned {
        let mut sink = RecordingWaitSink::new();
        assert!(iter.fetch(
            &mut sink,
            &row.requesting.engine_lock_id,
            &row.blocking.engine_lock_id
        ));
        assert_eq!(sink.rows.len(), 1);
        assert_eq!(&sink.rows[0], row);
    }

    let fetch = |requesting: &str, blocking: &str| {
        let mut sink = RecordingWaitSink::new();
        let found = iter.fetch(&mut sink, requesting, blocking);
        assert_eq!(found, !sink.rows.is_empty());
        found
    };
    // reversed edge
    assert!(!fetch("10:5:4:3", "30:5:4:3"));
    // blocking lock exists but is not ahead of the requester
    assert!(!fetch("20:5:4:3", "30:5:4:3"));
    // non-contended slot of a real blocker
    assert!(!fetch("30:5:4:3", "10:5:4:2"));
    assert!(!fetch("30:5:4:3", "10:9"));
    assert!(!fetch("30:5:4", "10:5:4:3"));
    assert!(!fetch("30:5:4:3", ""));

    // handle 2 is transaction 30
    engine.clear_wait(TrxHandle::new(2)).unwrap();
    assert!(!fetch("30:5:4:3", "20:5:4:3"));
    assert!(fetch("20:5:4:3", "10:5:4:3"));
}

#[test]
fn sink_filters() {
    let engine = contended();
    let run = |sink: RecordingWaitSink| {
        let mut iter = DataLockWaitIterator::new(Arc::clone(&engine));
        let mut sink = sink;
        drain(&mut iter, &mut sink);
        sink.edges()
            .into_iter()
            .map(|(r, b)| (r.to_owned(), b.to_owned()))
            .collect::<Vec<_>>()
    };

    assert_eq!(
        run(RecordingWaitSink::new().filter_blocking_trx(|id| id == TrxId::new(10))),
        pairs(&[("20:5:4:3", "10:5:4:3"), ("30:5:4:3", "10:5:4:3")])
    );
    assert_eq!(
        run(RecordingWaitSink::new().filter_requesting_trx(|id| id == TrxId::new(30))),
        pairs(&[("30:5:4:3", "20:5:4:3"), ("30:5:4:3", "10:5:4:3")])
    );
    assert_eq!(
        run(RecordingWaitSink::new().filter_requesting_lock_id(|id| id.starts_with("20:"))),
        pairs(&[("20:5:4:3", "10:5:4:3")])
    );
    assert_eq!(
        run(RecordingWaitSink::new().filter_blocking_lock_id(|id| id.starts_with("20:"))),
        pairs(&[("30:5:4:3", "20:5:4:3")])
    );
}

#[test]
fn rejected_engine_finishes_at_once() {
    let engine = contended();
    let mut iter = DataLockWaitIterator::new(Arc::clone(&engine));
    let mut sink = RecordingWaitSink::new().rejecting_engine();
    assert!(iter.scan(&mut sink));
    assert!(sink.rows.is_empty());
    assert_eq!(iter.state().current_pass(), ScanPass::Init);
    assert!(!iter.fetch(&mut sink, "20:5:4:3", "10:5:4:3"));
}

#[test]
fn every_edge_once_for_small_ranges() {
    let engine = Arc::new(MemLockSys::new());
    let mut expected = Vec::new();
    // holder/waiter pairs spread over many windows
    for n in 0..12_u64 {
        let holder_id = 1 + n * 97;
        let waiter_id = holder_id + 1;
        let page = u32::try_from(n).unwrap();
        let holder = engine.begin_rw(holder_id, n).unwrap();
        let waiter = engine.begin_rw(waiter_id, 100 + n).unwrap();
        engine
            .add_record_lock(
                holder,
                RecordLockRequest::new(9, "app/accounts", 6, page, LockMode::Exclusive, &[2]),
            )
            .unwrap();
        let wait = engine
            .add_record_lock(
                waiter,
                RecordLockRequest::new(9, "app/accounts", 6, page, LockMode::Shared, &[2]),
            )
            .unwrap();
        engine.set_wait(waiter, wait).unwrap();
        expected.push((format!("{waiter_id}:6:{page}:2"), format!("{holder_id}:6:{page}:2")));
    }

    for range in [1, 7, 256] {
        let log = Arc::new(ScanEventLog::new(4096));
        let config = ScanConfig::with_range(range).unwrap();
        let mut iter = DataLockWaitIterator::with_config(Arc::clone(&engine), config)
            .with_observer(log.clone());
        let mut sink = RecordingWaitSink::new();
        drain(&mut iter, &mut sink);
        let got: Vec<(String, String)> = sink
            .edges()
            .into_iter()
            .map(|(r, b)| (r.to_owned(), b.to_owned()))
            .collect();
        assert_eq!(got, expected, "range {range}");
        assert!(
            log.snapshot()
                .iter()
                .all(|e| e.table() == InspectTable::DataLockWaits)
        );
    }
}
