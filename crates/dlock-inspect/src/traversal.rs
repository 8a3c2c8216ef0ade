//! Windowed traversal shared by the lock and lock-wait iterators.

use dlock_types::{Transaction, TrxId, TrxList};

use crate::engine::TrxSysView;
use crate::scan_state::ScanState;

/// Result of one `scan` batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BatchOutcome {
    /// Rows emitted by the last window traversed.
    pub rows: usize,
    pub windows: u64,
    pub done: bool,
}

impl BatchOutcome {
    /// Outcome of a call made after the scan already finished.
    pub const FINISHED: Self = Self {
        rows: 0,
        windows: 0,
        done: true,
    };
}

/// Walk the current pass's list once, handing every reported transaction
/// whose printable id lies in the current window to `visit`.
///
/// Returns the number of rows `visit` reported.
pub(crate) fn scan_window<V, F>(view: &V, state: &mut ScanState, visit: &mut F) -> usize
where
    V: TrxSysView + ?Sized,
    F: FnMut(&Transaction) -> usize,
{
    let Some(list) = state.current_pass().list() else {
        return 0;
    };

    let mut rows = 0;
    for &handle in view.transactions(list) {
        let Some(trx) = view.transaction(handle) else {
            continue;
        };
        if trx.is_discarded_from(list) {
            continue;
        }
        if state.contains(trx.print_id()) {
            rows += visit(trx);
        }
    }
    rows
}

/// Traverse windows until one produces rows or the scan finishes.
///
/// The outcome is `done` only when the scan is finished and this batch
/// produced nothing; a batch that emits rows always asks for another call.
pub(crate) fn run_batch<V, F>(view: &V, state: &mut ScanState, mut visit: F) -> BatchOutcome
where
    V: TrxSysView + ?Sized,
    F: FnMut(&Transaction) -> usize,
{
    let mut rows = 0;
    let mut windows = 0;
    while !state.is_done() {
        rows = scan_window(view, state, &mut visit);
        windows += 1;
        state.advance();
        if rows > 0 {
            break;
        }
    }
    BatchOutcome {
        rows,
        windows,
        done: rows == 0 && state.is_done(),
    }
}

/// Transaction reported under `trx_id`, searching the read-write list first.
/// The discard rule applies exactly as during a scan.
pub(crate) fn find_transaction<V>(view: &V, trx_id: TrxId) -> Option<&Transaction>
where
    V: TrxSysView + ?Sized,
{
    [TrxList::ReadWrite, TrxList::Client]
        .into_iter()
        .find_map(|list| {
            view.transactions(list)
                .iter()
                .filter_map(|&handle| view.transaction(handle))
                .find(|trx| !trx.is_discarded_from(list) && trx.print_id() == trx_id)
        })
}
