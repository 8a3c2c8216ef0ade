//! Row sinks.
//!
//! A sink is the consumer side of a scan: it decides which candidates it
//! wants through the `accept_*` checkpoints and receives one call per
//! emitted row. Every checkpoint defaults to accepting, so a plain collector
//! only needs to implement the row callback.
//!
//! Row values borrow from the scan that produced them and are only valid for
//! the duration of the callback. Text the sink wants to keep across calls
//! goes through [`DataLockSink::cache_str`].

use std::sync::Arc;

use dlock_types::{ENGINE_NAME, LockIdentity, LockStatus, ThreadEvent, TrxId};

/// Whether `name` is this engine's name. Exact, case-sensitive comparison.
pub fn is_engine(name: &str) -> bool {
    name == ENGINE_NAME
}

/// Decomposed table identity of a lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectName {
    pub schema: Arc<str>,
    pub name: Arc<str>,
    pub partition: Option<Arc<str>>,
    pub subpartition: Option<Arc<str>>,
}

/// One row of the data lock table: a table lock, or one slot of a record
/// lock.
#[derive(Debug, Clone, Copy)]
pub struct DataLockRow<'a> {
    pub engine: &'a str,
    pub engine_lock_id: &'a str,
    pub trx_id: TrxId,
    pub thread_event: ThreadEvent,
    pub object: &'a ObjectName,
    /// Index of a record lock, `None` for table locks.
    pub index_name: Option<&'a str>,
    pub identity: LockIdentity,
    pub lock_mode: &'a str,
    pub lock_type: &'a str,
    pub lock_status: LockStatus,
    /// Only produced when the scan was asked for lock data.
    pub lock_data: Option<&'a str>,
}

/// One side of a wait edge.
#[derive(Debug, Clone, Copy)]
pub struct WaitEdgeSide<'a> {
    pub engine_lock_id: &'a str,
    pub trx_id: TrxId,
    pub thread_event: ThreadEvent,
    pub identity: LockIdentity,
}

/// One row of the data lock wait table: the requesting lock waits for the
/// blocking lock.
#[derive(Debug, Clone, Copy)]
pub struct DataLockWaitRow<'a> {
    pub engine: &'a str,
    pub requesting: WaitEdgeSide<'a>,
    pub blocking: WaitEdgeSide<'a>,
}

/// Consumer of data lock rows.
pub trait DataLockSink {
    fn accept_engine(&mut self, _engine: &str) -> bool {
        true
    }

    fn accept_transaction_id(&mut self, _trx_id: TrxId) -> bool {
        true
    }

    fn accept_thread_event(&mut self, _owner: ThreadEvent) -> bool {
        true
    }

    fn accept_object(&mut self, _object: &ObjectName) -> bool {
        true
    }

    fn accept_lock_id(&mut self, _engine_lock_id: &str) -> bool {
        true
    }

    fn add_lock_row(&mut self, row: DataLockRow<'_>);

    /// Intern transcoded identifier text.
    fn cache_str(&mut self, text: &str) -> Arc<str> {
        Arc::from(text)
    }
}

/// Consumer of data lock wait rows.
pub trait DataLockWaitSink {
    fn accept_engine(&mut self, _engine: &str) -> bool {
        true
    }

    fn accept_requesting_transaction_id(&mut self, _trx_id: TrxId) -> bool {
        true
    }

    fn accept_requesting_thread_event(&mut self, _owner: ThreadEvent) -> bool {
        true
    }

    fn accept_requesting_lock_id(&mut self, _engine_lock_id: &str) -> bool {
        true
    }

    fn accept_blocking_transaction_id(&mut self, _trx_id: TrxId) -> bool {
        true
    }

    fn accept_blocking_thread_event(&mut self, _owner: ThreadEvent) -> bool {
        true
    }

    fn accept_blocking_lock_id(&mut self, _engine_lock_id: &str) -> bool {
        true
    }

    fn add_lock_wait_row(&mut self, row: DataLockWaitRow<'_>);
}
