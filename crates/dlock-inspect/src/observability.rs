//! Data lock introspection observability.
//!
//! Scans report through `tracing` and through process-wide counters. An
//! optional [`ScanObserver`] additionally receives one [`ScanEvent`] per
//! batch and per fetch, for callers that want the outcomes programmatically.
//!
//! **Invariant:** nothing in this module blocks on engine mutexes. Observers
//! are invoked after the engine guard has been released.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

use crate::scan_state::ScanPass;

/// Optional observer handle. When `None`, no callback overhead.
pub type SharedObserver = Option<Arc<dyn ScanObserver>>;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Which introspection table an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InspectTable {
    DataLocks,
    DataLockWaits,
}

/// Outcome of one scan batch or fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ScanEvent {
    /// A `scan` call returned.
    BatchCompleted {
        table: InspectTable,
        /// Pass the session is in after the batch.
        pass: ScanPass,
        /// Windows traversed under the engine guard.
        windows: u64,
        rows: u64,
        done: bool,
        /// Monotonic event timestamp (nanoseconds since process start).
        timestamp_ns: u64,
    },
    /// A `fetch` call returned.
    FetchResolved {
        table: InspectTable,
        /// Lock id as passed by the caller; for wait edges, the requesting
        /// and blocking ids joined by a space.
        lock_id: String,
        found: bool,
        timestamp_ns: u64,
    },
}

impl ScanEvent {
    pub fn table(&self) -> InspectTable {
        match self {
            Self::BatchCompleted { table, .. } | Self::FetchResolved { table, .. } => *table,
        }
    }

    pub fn timestamp_ns(&self) -> u64 {
        match self {
            Self::BatchCompleted { timestamp_ns, .. }
            | Self::FetchResolved { timestamp_ns, .. } => *timestamp_ns,
        }
    }
}

/// Receiver of scan events. Implementations must be cheap and non-blocking.
pub trait ScanObserver: Send + Sync {
    fn on_event(&self, event: &ScanEvent);
}

/// Observer that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl ScanObserver for NoOpObserver {
    #[inline(always)]
    fn on_event(&self, _event: &ScanEvent) {}
}

/// Observer keeping the most recent events, oldest evicted first.
pub struct ScanEventLog {
    capacity: usize,
    events: Mutex<VecDeque<ScanEvent>>,
}

impl ScanEventLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Stored events, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ScanEvent> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ScanObserver for ScanEventLog {
    fn on_event(&self, event: &ScanEvent) {
        if self.capacity == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event.clone());
    }
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

static DL_BATCHES: AtomicU64 = AtomicU64::new(0);
static DL_WINDOWS_SCANNED: AtomicU64 = AtomicU64::new(0);
static DL_EMPTY_WINDOWS: AtomicU64 = AtomicU64::new(0);
static DL_LOCK_ROWS: AtomicU64 = AtomicU64::new(0);
static DL_WAIT_ROWS: AtomicU64 = AtomicU64::new(0);
static DL_FETCH_HITS: AtomicU64 = AtomicU64::new(0);
static DL_FETCH_MISSES: AtomicU64 = AtomicU64::new(0);
static DL_MALFORMED_IDS: AtomicU64 = AtomicU64::new(0);

/// Snapshot of the data lock introspection counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DataLockMetricsSnapshot {
    pub batches: u64,
    pub windows_scanned: u64,
    /// Windows that produced no row and were advanced past within a batch.
    pub empty_windows_skipped: u64,
    pub lock_rows: u64,
    pub wait_rows: u64,
    pub fetch_hits: u64,
    pub fetch_misses: u64,
    pub malformed_lock_ids: u64,
}

pub(crate) fn record_batch(table: InspectTable, windows: u64, rows: u64) {
    DL_BATCHES.fetch_add(1, Ordering::Relaxed);
    DL_WINDOWS_SCANNED.fetch_add(windows, Ordering::Relaxed);
    let empty = if rows == 0 { windows } else { windows.saturating_sub(1) };
    DL_EMPTY_WINDOWS.fetch_add(empty, Ordering::Relaxed);
    record_rows(table, rows);
}

pub(crate) fn record_fetch(table: InspectTable, rows: u64) {
    if rows == 0 {
        DL_FETCH_MISSES.fetch_add(1, Ordering::Relaxed);
    } else {
        DL_FETCH_HITS.fetch_add(1, Ordering::Relaxed);
    }
    record_rows(table, rows);
}

pub(crate) fn record_malformed_lock_id() {
    DL_MALFORMED_IDS.fetch_add(1, Ordering::Relaxed);
}

fn record_rows(table: InspectTable, rows: u64) {
    let counter = match table {
        InspectTable::DataLocks => &DL_LOCK_ROWS,
        InspectTable::DataLockWaits => &DL_WAIT_ROWS,
    };
    counter.fetch_add(rows, Ordering::Relaxed);
}

/// Snapshot the data lock introspection counters.
#[must_use]
pub fn data_lock_metrics_snapshot() -> DataLockMetricsSnapshot {
    DataLockMetricsSnapshot {
        batches: DL_BATCHES.load(Ordering::Relaxed),
        windows_scanned: DL_WINDOWS_SCANNED.load(Ordering::Relaxed),
        empty_windows_skipped: DL_EMPTY_WINDOWS.load(Ordering::Relaxed),
        lock_rows: DL_LOCK_ROWS.load(Ordering::Relaxed),
        wait_rows: DL_WAIT_ROWS.load(Ordering::Relaxed),
        fetch_hits: DL_FETCH_HITS.load(Ordering::Relaxed),
        fetch_misses: DL_FETCH_MISSES.load(Ordering::Relaxed),
        malformed_lock_ids: DL_MALFORMED_IDS.load(Ordering::Relaxed),
    }
}

/// Reset the data lock introspection counters.
pub fn reset_data_lock_metrics() {
    for counter in [
        &DL_BATCHES,
        &DL_WINDOWS_SCANNED,
        &DL_EMPTY_WINDOWS,
        &DL_LOCK_ROWS,
        &DL_WAIT_ROWS,
        &DL_FETCH_HITS,
        &DL_FETCH_MISSES,
        &DL_MALFORMED_IDS,
    ] {
        counter.store(0, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Emission
// ---------------------------------------------------------------------------

/// Monotonic nanosecond timestamp relative to process start.
pub(crate) fn now_ns() -> u64 {
    static EPOCH: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    u64::try_from(epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

/// Emit to observer if present.
#[inline]
pub(crate) fn emit(observer: &SharedObserver, event: &ScanEvent) {
    if let Some(obs) = observer {
        obs.on_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(rows: u64) -> ScanEvent {
        ScanEvent::BatchCompleted {
            table: InspectTable::DataLocks,
            pass: ScanPass::ReadWriteList,
            windows: 1,
            rows,
            done: false,
            timestamp_ns: now_ns(),
        }
    }

    #[test]
    fn event_log_evicts_oldest() {
        let log = ScanEventLog::new(2);
        log.on_event(&batch(1));
        log.on_event(&batch(2));
        log.on_event(&batch(3));
        let rows: Vec<u64> = log
            .snapshot()
            .into_iter()
            .map(|e| match e {
                ScanEvent::BatchCompleted { rows, .. } => rows,
                ScanEvent::FetchResolved { .. } => unreachable!(),
            })
            .collect();
        assert_eq!(rows, vec![2, 3]);
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn zero_capacity_log_stores_nothing() {
        let log = ScanEventLog::new(0);
        log.on_event(&batch(1));
        assert!(log.is_empty());
    }

    #[test]
    fn shared_observer_dispatch() {
        let log = Arc::new(ScanEventLog::new(8));
        let observer: SharedObserver = Some(log.clone());
        emit(&observer, &batch(4));
        emit(&None, &batch(5));
        assert_eq!(log.len(), 1);
        assert_eq!(log.snapshot()[0].table(), InspectTable::DataLocks);
    }

    #[test]
    fn counters_accumulate() {
        let before = data_lock_metrics_snapshot();
        record_batch(InspectTable::DataLocks, 3, 2);
        record_batch(InspectTable::DataLockWaits, 2, 0);
        record_fetch(InspectTable::DataLocks, 1);
        record_fetch(InspectTable::DataLockWaits, 0);
        record_malformed_lock_id();
        let after = data_lock_metrics_snapshot();

        assert!(after.batches >= before.batches + 2);
        assert!(after.windows_scanned >= before.windows_scanned + 5);
        assert!(after.empty_windows_skipped >= before.empty_windows_skipped + 4);
        assert!(after.lock_rows >= before.lock_rows + 3);
        assert!(after.fetch_hits > before.fetch_hits);
        assert!(after.fetch_misses > before.fetch_misses);
        assert!(after.malformed_lock_ids > before.malformed_lock_ids);
    }

    #[test]
    fn events_serialize() {
        let event = ScanEvent::FetchResolved {
            table: InspectTable::DataLockWaits,
            lock_id: "7:1:2:3 8:1:2:3".to_owned(),
            found: true,
            timestamp_ns: 10,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["FetchResolved"]["table"], "DataLockWaits");
        assert_eq!(json["FetchResolved"]["found"], true);
        assert_eq!(event.timestamp_ns(), 10);

        let snapshot = serde_json::to_value(DataLockMetricsSnapshot::default()).unwrap();
        assert_eq!(snapshot["fetch_hits"], 0);
    }
}
