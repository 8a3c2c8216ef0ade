//! Engine collaborator seam.
//!
//! The storage engine owns every transaction and lock. Introspection only
//! ever sees them through a [`TrxSysView`], which is produced by entering the
//! engine's lock subsystem and transaction-list mutexes together
//! ([`LockSys::enter`]). Everything borrowed from the view lives no longer
//! than the guard, so no reference to engine storage can survive a single
//! `scan` or `fetch` call.

use dlock_types::{HeapNo, Lock, LockHandle, Transaction, TrxHandle, TrxList};

/// Storage engine whose lock state can be inspected.
pub trait LockSys: Send + Sync {
    /// Joint lock-subsystem and transaction-list guard.
    type Guard<'a>: TrxSysView
    where
        Self: 'a;

    /// Acquire the lock-subsystem mutex, then the transaction-list mutex.
    /// Both are released when the guard drops.
    fn enter(&self) -> Self::Guard<'_>;
}

/// Read-only view of the transaction and lock subsystem, valid while the
/// guard that produced it is held.
pub trait TrxSysView {
    /// Members of one transaction list, in list order.
    fn transactions(&self, list: TrxList) -> &[TrxHandle];

    fn transaction(&self, handle: TrxHandle) -> Option<&Transaction>;

    fn lock(&self, handle: LockHandle) -> Option<&Lock>;

    /// Locks queued on the same resource ahead of `lock`, nearest first.
    ///
    /// For a record lock the queue is the one of the page's slot the lock is
    /// waiting for.
    fn queue_ahead(&self, lock: LockHandle) -> Vec<LockHandle>;

    /// Conflict predicate: whether `requester` has to wait for `other`.
    fn has_to_wait(&self, requester: LockHandle, other: LockHandle) -> bool;

    /// Descriptive content of the record in `heap_no` covered by a record
    /// lock, when the engine can produce one.
    fn lock_data(&self, lock: LockHandle, heap_no: HeapNo) -> Option<String>;
}
