//! Data lock wait rows: one row per (requesting lock, blocking lock) edge of
//! the wait graph.
//!
//! Only a transaction blocked in a lock wait has edges, and its wait lock is
//! the requesting side of all of them. The blocking side is every lock queued
//! ahead of the wait lock that the requester actually has to wait for. For a
//! record lock both sides are reported at the contended slot, so the blocking
//! id names the slot the requester waits on, not necessarily the blocking
//! lock's lowest granted one.

use std::sync::Arc;

use dlock_types::{ENGINE_NAME, LockId, Transaction};
use tracing::{debug, debug_span};

use crate::config::ScanConfig;
use crate::engine::{LockSys, TrxSysView};
use crate::observability::{self, InspectTable, ScanEvent, ScanObserver, SharedObserver};
use crate::scan_state::{ScanPass, ScanState};
use crate::sink::{DataLockWaitRow, DataLockWaitSink, WaitEdgeSide};
use crate::traversal::{BatchOutcome, find_transaction, run_batch};

/// Scan session over the lock wait edges of one engine.
pub struct DataLockWaitIterator<E: LockSys> {
    engine: Arc<E>,
    state: ScanState,
    observer: SharedObserver,
}

/// Exact edge a fetch is looking for.
#[derive(Debug, Clone, Copy)]
struct EdgeFilter {
    requesting: LockId,
    blocking: LockId,
}

impl<E: LockSys> DataLockWaitIterator<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self::with_config(engine, ScanConfig::default())
    }

    pub fn with_config(engine: Arc<E>, config: ScanConfig) -> Self {
        Self {
            engine,
            state: ScanState::new(config),
            observer: None,
        }
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

    /// Emit the next batch of wait edges. Same completion contract as
    /// [`DataLockIterator::scan`](crate::DataLockIterator::scan).
    pub fn scan<S>(&mut self, sink: &mut S) -> bool
    where
        S: DataLockWaitSink + ?Sized,
    {
        if self.state.current_pass() == ScanPass::Init {
            if !sink.accept_engine(ENGINE_NAME) {
                return true;
            }
            self.state.advance();
        }

        let span = debug_span!("data_lock_wait_scan", pass = ?self.state.current_pass());
        let _entered = span.enter();

        let state = &mut self.state;
        // finished by the previous batch: report an empty final one
        let outcome = if state.is_done() {
            BatchOutcome::FINISHED
        } else {
            let view = self.engine.enter();
            run_batch(&view, state, |trx| {
                scan_wait_transaction(&view, trx, &mut *sink, None)
            })
        };

        debug!(
            pass = ?state.current_pass(),
            window = ?state.window(),
            rows = outcome.rows,
            windows = outcome.windows,
            done = outcome.done,
            "data lock wait batch"
        );
        let rows = outcome.rows as u64;
        observability::record_batch(InspectTable::DataLockWaits, outcome.windows, rows);
        observability::emit(
            &self.observer,
            &ScanEvent::BatchCompleted {
                table: InspectTable::DataLockWaits,
                pass: state.current_pass(),
                windows: outcome.windows,
                rows,
                done: outcome.done,
                timestamp_ns: observability::now_ns(),
            },
        );
        outcome.done
    }

    /// Re-emit the single edge previously reported under the pair of lock
    /// ids. Returns whether a row was emitted.
    pub fn fetch<S>(&self, sink: &mut S, requesting_lock_id: &str, blocking_lock_id: &str) -> bool
    where
        S: DataLockWaitSink + ?Sized,
    {
        if !sink.accept_engine(ENGINE_NAME) {
            return false;
        }

        let parsed = LockId::parse(requesting_lock_id).and_then(|requesting| {
            LockId::parse(blocking_lock_id).map(|blocking| (requesting, blocking))
        });
        let rows = match parsed {
            Ok((requesting, blocking)) => {
                let filter = EdgeFilter {
                    requesting,
                    blocking,
                };
                let view = self.engine.enter();
                find_transaction(&view, requesting.trx_id()).map_or(0, |trx| {
                    scan_wait_transaction(&view, trx, sink, Some(&filter))
                })
            }
            Err(err) => {
                debug!(
                    requesting_lock_id,
                    blocking_lock_id,
                    error = %err,
                    "data lock wait fetch: malformed lock id"
                );
                observability::record_malformed_lock_id();
                0
            }
        };

        let found = rows > 0;
        debug!(requesting_lock_id, blocking_lock_id, found, "data lock wait fetch");
        observability::record_fetch(InspectTable::DataLockWaits, rows as u64);
        observability::emit(
            &self.observer,
            &ScanEvent::FetchResolved {
                table: InspectTable::DataLockWaits,
                lock_id: format!("{requesting_lock_id} {blocking_lock_id}"),
                found,
                timestamp_ns: observability::now_ns(),
            },
        );
        found
    }
}

/// Emit the wait edges of `trx`, or only the edge `filter` names.
///
/// # Panics
///
/// Panics when the transaction's wait lock is not a live lock of the view.
fn scan_wait_transaction<V, S>(
    view: &V,
    trx: &Transaction,
    sink: &mut S,
    filter: Option<&EdgeFilter>,
) -> usize
where
    V: TrxSysView + ?Sized,
    S: DataLockWaitSink + ?Sized,
{
    let Some(wait) = trx.wait_lock else {
        return 0;
    };
    let Some(wait_lock) = view.lock(wait) else {
        panic!(
            "transaction {} waits on unknown lock {}",
            trx.print_id(),
            wait.get()
        );
    };
    let Some(requesting_id) = LockId::of(wait_lock, None) else {
        return 0;
    };
    if filter.is_some_and(|f| f.requesting != requesting_id) {
        return 0;
    }

    let trx_id = trx.print_id();
    if !sink.accept_requesting_transaction_id(trx_id) {
        return 0;
    }
    if !sink.accept_requesting_thread_event(wait_lock.owner) {
        return 0;
    }
    let requesting_text = requesting_id.to_string();
    if !sink.accept_requesting_lock_id(&requesting_text) {
        return 0;
    }

    let requesting = WaitEdgeSide {
        engine_lock_id: &requesting_text,
        trx_id,
        thread_event: wait_lock.owner,
        identity: wait.identity(),
    };

    let mut rows = 0;
    for peer in view.queue_ahead(wait) {
        let Some(blocking_lock) = view.lock(peer) else {
            continue;
        };
        if !view.has_to_wait(wait, peer) {
            continue;
        }
        let Some(blocking_id) = LockId::of(blocking_lock, requesting_id.heap_no()) else {
            continue;
        };
        if filter.is_some_and(|f| f.blocking != blocking_id) {
            continue;
        }
        if !sink.accept_blocking_transaction_id(blocking_lock.trx_id) {
            continue;
        }
        if !sink.accept_blocking_thread_event(blocking_lock.owner) {
            continue;
        }
        let blocking_text = blocking_id.to_string();
        if !sink.accept_blocking_lock_id(&blocking_text) {
            continue;
        }

        sink.add_lock_wait_row(DataLockWaitRow {
            engine: ENGINE_NAME,
            requesting,
            blocking: WaitEdgeSide {
                engine_lock_id: &blocking_text,
                trx_id: blocking_lock.trx_id,
                thread_event: blocking_lock.owner,
                identity: peer.identity(),
            },
        });
        rows += 1;
    }
    rows
}
