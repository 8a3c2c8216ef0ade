//! Data lock rows: one row per table lock and per granted slot of a record
//! lock.

use std::sync::Arc;

use dlock_types::{ENGINE_NAME, LockHandle, LockId, LockStatus, LockTarget, Transaction};
use tracing::{debug, debug_span};

use crate::config::ScanConfig;
use crate::engine::{LockSys, TrxSysView};
use crate::observability::{self, InspectTable, ScanEvent, ScanObserver, SharedObserver};
use crate::scan_state::{ScanPass, ScanState};
use crate::sink::{DataLockRow, DataLockSink};
use crate::table_path::{FilenameTablePaths, TablePathResolver, resolve_object};
use crate::traversal::{BatchOutcome, find_transaction, run_batch};

/// Scan session over the locks of one engine.
pub struct DataLockIterator<E: LockSys> {
    engine: Arc<E>,
    state: ScanState,
    resolver: Arc<dyn TablePathResolver>,
    observer: SharedObserver,
}

impl<E: LockSys> DataLockIterator<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self::with_config(engine, ScanConfig::default())
    }

    pub fn with_config(engine: Arc<E>, config: ScanConfig) -> Self {
        Self {
            engine,
            state: ScanState::new(config),
            resolver: Arc::new(FilenameTablePaths),
            observer: None,
        }
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn TablePathResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub(crate) fn with_shared_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    /// Emit the next batch of rows.
    ///
    /// Returns `true` once the session is exhausted; a call that emits rows
    /// never returns `true`. `include_lock_data` asks the engine for the
    /// content of every locked record, which is comparatively expensive.
    pub fn scan<S>(&mut self, sink: &mut S, include_lock_data: bool) -> bool
    where
        S: DataLockSink + ?Sized,
    {
        if self.state.current_pass() == ScanPass::Init {
            if !sink.accept_engine(ENGINE_NAME) {
                return true;
            }
            self.state.advance();
        }

        let span = debug_span!("data_lock_scan", pass = ?self.state.current_pass());
        let _entered = span.enter();

        let resolver = &*self.resolver;
        let state = &mut self.state;
        // finished by the previous batch: report an empty final one
        let outcome = if state.is_done() {
            BatchOutcome::FINISHED
        } else {
            let view = self.engine.enter();
            run_batch(&view, state, |trx| {
                scan_transaction(&view, trx, &mut *sink, resolver, include_lock_data, None)
            })
        };

        debug!(
            pass = ?state.current_pass(),
            window = ?state.window(),
            rows = outcome.rows,
            windows = outcome.windows,
            done = outcome.done,
            "data lock batch"
        );
        let rows = outcome.rows as u64;
        observability::record_batch(InspectTable::DataLocks, outcome.windows, rows);
        observability::emit(
            &self.observer,
            &ScanEvent::BatchCompleted {
                table: InspectTable::DataLocks,
                pass: state.current_pass(),
                windows: outcome.windows,
                rows,
                done: outcome.done,
                timestamp_ns: observability::now_ns(),
            },
        );
        outcome.done
    }

    /// Re-emit the single row previously reported under `lock_id`.
    ///
    /// Returns whether a row was emitted. Malformed ids and ids of locks that
    /// no longer exist are both reported as not found. The scan session is
    /// neither consulted nor changed.
    pub fn fetch<S>(&self, sink: &mut S, lock_id: &str, include_lock_data: bool) -> bool
    where
        S: DataLockSink + ?Sized,
    {
        if !sink.accept_engine(ENGINE_NAME) {
            return false;
        }

        let rows = match LockId::parse(lock_id) {
            Ok(filter) => {
                let view = self.engine.enter();
                find_transaction(&view, filter.trx_id()).map_or(0, |trx| {
                    scan_transaction(
                        &view,
                        trx,
                        sink,
                        &*self.resolver,
                        include_lock_data,
                        Some(&filter),
                    )
                })
            }
            Err(err) => {
                debug!(lock_id, error = %err, "data lock fetch: malformed lock id");
                observability::record_malformed_lock_id();
                0
            }
        };

        let found = rows > 0;
        debug!(lock_id, found, "data lock fetch");
        observability::record_fetch(InspectTable::DataLocks, rows as u64);
        observability::emit(
            &self.observer,
            &ScanEvent::FetchResolved {
                table: InspectTable::DataLocks,
                lock_id: lock_id.to_owned(),
                found,
                timestamp_ns: observability::now_ns(),
            },
        );
        found
    }
}

/// Emit the rows of every lock owned by `trx`, or only of the lock `filter`
/// names. Returns the number of rows emitted.
fn scan_transaction<V, S>(
    view: &V,
    trx: &Transaction,
    sink: &mut S,
    resolver: &dyn TablePathResolver,
    include_lock_data: bool,
    filter: Option<&LockId>,
) -> usize
where
    V: TrxSysView + ?Sized,
    S: DataLockSink + ?Sized,
{
    let trx_id = trx.print_id();
    let mut rows = 0;

    for &handle in &trx.locks {
        let Some(lock) = view.lock(handle) else {
            continue;
        };
        if filter.is_some_and(|id| !id.matches_lock(lock)) {
            continue;
        }
        if !sink.accept_transaction_id(trx_id) {
            continue;
        }
        if !sink.accept_thread_event(lock.owner) {
            continue;
        }
        let object = resolve_object(resolver, &lock.table_path, sink);
        if !sink.accept_object(&object) {
            continue;
        }

        let status = lock_status(trx, handle);
        let mode = lock.mode_str();
        let emit = |sink: &mut S, lock_id: &str, lock_data: Option<&str>| {
            sink.add_lock_row(DataLockRow {
                engine: ENGINE_NAME,
                engine_lock_id: lock_id,
                trx_id,
                thread_event: lock.owner,
                object: &object,
                index_name: lock.index_name(),
                identity: handle.identity(),
                lock_mode: &mode,
                lock_type: lock.type_str(),
                lock_status: status,
                lock_data,
            });
        };

        match &lock.target {
            LockTarget::Table => {
                let Some(id) = LockId::of(lock, None) else {
                    continue;
                };
                let lock_id = id.to_string();
                if sink.accept_lock_id(&lock_id) {
                    emit(&mut *sink, &lock_id, None);
                    rows += 1;
                }
            }
            LockTarget::Record { heaps, .. } => {
                let wanted = filter.and_then(LockId::heap_no);
                for heap_no in heaps.iter() {
                    if wanted.is_some_and(|w| w != heap_no) {
                        continue;
                    }
                    let Some(id) = LockId::of(lock, Some(heap_no)) else {
                        continue;
                    };
                    let lock_id = id.to_string();
                    if !sink.accept_lock_id(&lock_id) {
                        continue;
                    }
                    let lock_data = if include_lock_data {
                        view.lock_data(handle, heap_no)
                    } else {
                        None
                    };
                    emit(&mut *sink, &lock_id, lock_data.as_deref());
                    rows += 1;
                }
            }
        }
    }
    rows
}

fn lock_status(trx: &Transaction, lock: LockHandle) -> LockStatus {
    if trx.wait_lock == Some(lock) {
        LockStatus::Waiting
    } else {
        LockStatus::Granted
    }
}

#[cfg(test)]
mod tests {
    use dlock_types::{LockMode, ThreadEvent, TrxId};

    use super::*;
    use crate::sink::ObjectName;
    use crate::traversal::fixture::{FixtureEngine, FixtureView};

    #[derive(Default)]
    struct Rows {
        rows: Vec<(String, TrxId, LockStatus, String, Option<String>)>,
        reject_engine: bool,
        reject_lock_id: Option<String>,
        reject_owner: Option<ThreadEvent>,
    }

    impl DataLockSink for Rows {
        fn accept_engine(&mut self, engine: &str) -> bool {
            !self.reject_engine && crate::sink::is_engine(engine)
        }

        fn accept_thread_event(&mut self, owner: ThreadEvent) -> bool {
            self.reject_owner != Some(owner)
        }

        fn accept_object(&mut self, object: &ObjectName) -> bool {
            &*object.schema == "test" && &*object.name == "t1"
        }

        fn accept_lock_id(&mut self, engine_lock_id: &str) -> bool {
            self.reject_lock_id.as_deref() != Some(engine_lock_id)
        }

        fn add_lock_row(&mut self, row: DataLockRow<'_>) {
            assert_eq!(row.engine, "INNODB");
            self.rows.push((
                row.engine_lock_id.to_owned(),
                row.trx_id,
                row.lock_status,
                row.lock_mode.to_owned(),
                row.lock_data.map(str::to_owned),
            ));
        }
    }

    impl Rows {
        fn ids(&self) -> Vec<&str> {
            self.rows.iter().map(|r| r.0.as_str()).collect()
        }
    }

    fn engine(view: FixtureView) -> Arc<FixtureEngine> {
        Arc::new(FixtureEngine(parking_lot::Mutex::new(view)))
    }

    fn drain(iter: &mut DataLockIterator<FixtureEngine>, sink: &mut Rows) -> usize {
        let mut calls = 0;
        while !iter.scan(sink, false) {
            calls += 1;
            assert!(calls < 100, "scan did not finish");
        }
        calls + 1
    }

    #[test]
    fn scenario_two_windows_then_done() {
        let mut view = FixtureView::default();
        let a = view.trx(5, false);
        let b = view.trx(300, false);
        view.record_lock(a, &[2]);
        view.record_lock(b, &[3]);

        let mut iter = DataLockIterator::new(engine(view));
        let mut sink = Rows::default();

        assert!(!iter.scan(&mut sink, false));
        assert_eq!(sink.ids(), vec!["5:5:4:2"]);
        assert!(!iter.scan(&mut sink, false));
        assert_eq!(sink.ids(), vec!["5:5:4:2", "300:5:4:3"]);
        assert!(iter.scan(&mut sink, false));
        assert_eq!(sink.rows.len(), 2);
        assert!(iter.state().is_done());
        assert!(iter.scan(&mut sink, false));
    }

    fn batches(log: &observability::ScanEventLog) -> Vec<(u64, u64, bool)> {
        log.snapshot()
            .iter()
            .map(|e| match e {
                ScanEvent::BatchCompleted {
                    windows, rows, done, ..
                } => (*windows, *rows, *done),
                other => panic!("unexpected event {other:?}"),
            })
            .collect()
    }

    #[test]
    fn last_batch_is_reported_done() {
        // ends inside the call that scans the last, empty, client window
        let mut view = FixtureView::default();
        let a = view.trx(5, false);
        view.record_lock(a, &[2]);
        let log = Arc::new(observability::ScanEventLog::new(16));
        let mut iter = DataLockIterator::new(engine(view)).with_observer(log.clone());
        let mut sink = Rows::default();
        assert_eq!(drain(&mut iter, &mut sink), 2);
        assert_eq!(batches(&log), vec![(1, 1, false), (1, 0, true)]);

        // the last client window holds rows, so the session ends one call
        // later without touching any window
        let mut view = FixtureView::default();
        let ro = view.trx(5, true);
        view.record_lock(ro, &[2]);
        let log = Arc::new(observability::ScanEventLog::new(16));
        let mut iter = DataLockIterator::new(engine(view)).with_observer(log.clone());
        let mut sink = Rows::default();
        assert_eq!(drain(&mut iter, &mut sink), 2);
        assert_eq!(sink.ids(), vec!["5:5:4:2"]);
        assert_eq!(batches(&log), vec![(2, 1, false), (0, 0, true)]);
        assert!(iter.scan(&mut sink, false));
        assert_eq!(batches(&log).len(), 3);
    }

    #[test]
    fn rejected_engine_ends_scan_untouched() {
        let mut view = FixtureView::default();
        let a = view.trx(5, false);
        view.table_lock(a, LockMode::IntentionExclusive);

        let mut iter = DataLockIterator::new(engine(view));
        let mut sink = Rows {
            reject_engine: true,
            ..Rows::default()
        };
        assert!(iter.scan(&mut sink, false));
        assert_eq!(iter.state().current_pass(), ScanPass::Init);
        assert!(sink.rows.is_empty());
        assert!(!iter.fetch(&mut sink, "5:10", false));

        sink.reject_engine = false;
        assert_eq!(drain(&mut iter, &mut sink), 2);
        assert_eq!(sink.ids(), vec!["5:10"]);
    }

    #[test]
    fn one_row_per_slot_and_statuses() {
        let mut view = FixtureView::default();
        let a = view.trx(9, false);
        view.table_lock(a, LockMode::IntentionExclusive);
        let waiting = view.record_lock(a, &[1, 3, 70]);
        view.record_lock(a, &[2]);
        view.trxs[a.index()].wait_lock = Some(waiting);

        let mut iter = DataLockIterator::new(engine(view));
        let mut sink = Rows::default();
        drain(&mut iter, &mut sink);

        let summary: Vec<(&str, LockStatus)> =
            sink.rows.iter().map(|r| (r.0.as_str(), r.2)).collect();
        assert_eq!(
            summary,
            vec![
                ("9:10", LockStatus::Granted),
                ("9:5:4:1", LockStatus::Waiting),
                ("9:5:4:3", LockStatus::Waiting),
                ("9:5:4:70", LockStatus::Waiting),
                ("9:5:4:2", LockStatus::Granted),
            ]
        );
        assert_eq!(sink.rows[0].3, "IX");
        assert_eq!(sink.rows[1].3, "X,REC_NOT_GAP");
    }

    #[test]
    fn checkpoints_skip_single_candidates() {
        let mut view = FixtureView::default();
        let a = view.trx(9, false);
        let table = view.table_lock(a, LockMode::Shared);
        view.record_lock(a, &[2, 3]);
        let owner = view.locks[table.index()].owner;

        let mut iter = DataLockIterator::new(engine(view));
        let mut sink = Rows {
            reject_lock_id: Some("9:5:4:2".to_owned()),
            reject_owner: Some(owner),
            ..Rows::default()
        };
        drain(&mut iter, &mut sink);
        assert_eq!(sink.ids(), vec!["9:5:4:3"]);
    }

    #[test]
    fn lock_data_only_on_request() {
        let mut view = FixtureView::default();
        let a = view.trx(9, false);
        view.record_lock(a, &[4]);
        let iter = DataLockIterator::new(engine(view));

        let mut sink = Rows::default();
        assert!(iter.fetch(&mut sink, "9:5:4:4", false));
        assert!(iter.fetch(&mut sink, "9:5:4:4", true));
        assert_eq!(sink.rows[0].4, None);
        assert_eq!(sink.rows[1].4.as_deref(), Some("row 4"));
    }

    #[test]
    fn fetch_reproduces_scanned_rows() {
        let mut view = FixtureView::default();
        let a = view.trx(9, false);
        view.table_lock(a, LockMode::IntentionShared);
        view.record_lock(a, &[2, 5]);
        let ro = view.trx(0, true);
        view.table_lock(ro, LockMode::IntentionShared);
        let engine = engine(view);

        let mut iter = DataLockIterator::with_config(engine, ScanConfig::with_range(3).unwrap());
        let mut scanned = Rows::default();
        drain(&mut iter, &mut scanned);
        assert_eq!(scanned.rows.len(), 4);

        for row in &scanned.rows {
            let mut fetched = Rows::default();
            assert!(iter.fetch(&mut fetched, &row.0, true));
            assert_eq!(fetched.rows.len(), 1, "fetch {}", row.0);
            let got = &fetched.rows[0];
            assert_eq!((&got.0, got.1, got.2, &got.3), (&row.0, row.1, row.2, &row.3));
        }
    }

    #[test]
    fn fetch_misses() {
        let mut view = FixtureView::default();
        let a = view.trx(9, false);
        view.record_lock(a, &[2]);
        view.table_lock(a, LockMode::IntentionExclusive);
        let iter = DataLockIterator::new(engine(view));

        let mut sink = Rows::default();
        for id in ["9:5:4:3", "9:5:5:2", "9:11", "8:10", "9:x", "", "9:5:4", "9:5:4:2:1"] {
            assert!(!iter.fetch(&mut sink, id, false), "{id}");
        }
        assert!(sink.rows.is_empty());
        assert!(iter.fetch(&mut sink, "9:10", false));
        assert!(iter.fetch(&mut sink, "9:5:4:2", false));
        assert_eq!(iter.state().current_pass(), ScanPass::Init);
    }
}
