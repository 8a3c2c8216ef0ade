//! Transaction model as exposed by the engine while its transaction-list
//! mutex is held.

use serde::{Deserialize, Serialize};

use crate::ids::{LockHandle, TrxId};

/// The two engine transaction lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrxList {
    /// Transactions that have been assigned an id for writing.
    ReadWrite,
    /// Transactions attached to a client session, writing or not.
    Client,
}

/// One engine transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Assigned id, [`TrxId::NONE`] until the transaction first writes.
    pub id: TrxId,
    /// Stand-in id reported while `id` is unassigned. Engine-chosen, disjoint
    /// from the assigned id space.
    pub pseudo_id: TrxId,
    pub started: bool,
    pub read_only: bool,
    /// Lock this transaction is currently blocked on.
    pub wait_lock: Option<LockHandle>,
    /// Locks owned by this transaction, in acquisition order.
    pub locks: Vec<LockHandle>,
}

impl Transaction {
    /// Id under which this transaction appears in rows and lock ids.
    #[inline]
    pub const fn print_id(&self) -> TrxId {
        if self.id.is_assigned() {
            self.id
        } else {
            self.pseudo_id
        }
    }

    /// Whether the transaction is blocked in a lock wait.
    #[inline]
    pub const fn is_waiting(&self) -> bool {
        self.wait_lock.is_some()
    }

    /// Whether scans of `list` skip this transaction.
    ///
    /// Not-started transactions are never reported. A read-write transaction
    /// with an assigned id is visible on both lists and is only reported from
    /// [`TrxList::ReadWrite`].
    pub const fn is_discarded_from(&self, list: TrxList) -> bool {
        if !self.started {
            return true;
        }
        matches!(list, TrxList::Client) && self.id.is_assigned() && !self.read_only
    }
}
