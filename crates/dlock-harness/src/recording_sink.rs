//! Sinks that keep owned copies of every row they receive.

use std::collections::HashSet;
use std::sync::Arc;

use dlock_inspect::{
    DataLockRow, DataLockSink, DataLockWaitRow, DataLockWaitSink, ObjectName, WaitEdgeSide,
    is_engine,
};
use dlock_types::{LockIdentity, LockStatus, ThreadEvent, TrxId};

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send>;
type TextPredicate = Box<dyn Fn(&str) -> bool + Send>;

/// Owned copy of one data lock row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRowRecord {
    pub engine: String,
    pub engine_lock_id: String,
    pub trx_id: TrxId,
    pub thread_event: ThreadEvent,
    pub object: ObjectName,
    pub index_name: Option<String>,
    pub identity: LockIdentity,
    pub lock_mode: String,
    pub lock_type: String,
    pub lock_status: LockStatus,
    pub lock_data: Option<String>,
}

impl From<DataLockRow<'_>> for LockRowRecord {
    fn from(row: DataLockRow<'_>) -> Self {
        Self {
            engine: row.engine.to_owned(),
            engine_lock_id: row.engine_lock_id.to_owned(),
            trx_id: row.trx_id,
            thread_event: row.thread_event,
            object: row.object.clone(),
            index_name: row.index_name.map(str::to_owned),
            identity: row.identity,
            lock_mode: row.lock_mode.to_owned(),
            lock_type: row.lock_type.to_owned(),
            lock_status: row.lock_status,
            lock_data: row.lock_data.map(str::to_owned),
        }
    }
}

/// Data lock sink collecting rows, with optional per-checkpoint filters.
#[derive(Default)]
pub struct RecordingSink {
    pub rows: Vec<LockRowRecord>,
    reject_engine: bool,
    trx_filter: Option<Predicate<TrxId>>,
    owner_filter: Option<Predicate<ThreadEvent>>,
    object_filter: Option<Predicate<ObjectName>>,
    lock_id_filter: Option<TextPredicate>,
    cache: HashSet<Arc<str>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject this engine at the `accept_engine` checkpoint.
    #[must_use]
    pub fn rejecting_engine(mut self) -> Self {
        self.reject_engine = true;
        self
    }

    #[must_use]
    pub fn filter_trx(mut self, keep: impl Fn(TrxId) -> bool + Send + 'static) -> Self {
        self.trx_filter = Some(Box::new(move |id: &TrxId| keep(*id)));
        self
    }

    #[must_use]
    pub fn filter_owner(mut self, keep: impl Fn(ThreadEvent) -> bool + Send + 'static) -> Self {
        self.owner_filter = Some(Box::new(move |owner: &ThreadEvent| keep(*owner)));
        self
    }

    #[must_use]
    pub fn filter_object(mut self, keep: impl Fn(&ObjectName) -> bool + Send + 'static) -> Self {
        self.object_filter = Some(Box::new(keep));
        self
    }

    #[must_use]
    pub fn filter_lock_id(mut self, keep: impl Fn(&str) -> bool + Send + 'static) -> Self {
        self.lock_id_filter = Some(Box::new(keep));
        self
    }

    /// Reported lock ids, in emission order.
    pub fn lock_ids(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.engine_lock_id.as_str()).collect()
    }

    /// Number of distinct strings interned through `cache_str`.
    pub fn cached_strings(&self) -> usize {
        self.cache.len()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

fn keep<T, F>(filter: Option<&F>, value: &T) -> bool
where
    T: ?Sized,
    F: Fn(&T) -> bool + ?Sized,
{
    filter.is_none_or(|f| f(value))
}

impl DataLockSink for RecordingSink {
    fn accept_engine(&mut self, engine: &str) -> bool {
        !self.reject_engine && is_engine(engine)
    }

    fn accept_transaction_id(&mut self, trx_id: TrxId) -> bool {
        keep(self.trx_filter.as_deref(), &trx_id)
    }

    fn accept_thread_event(&mut self, owner: ThreadEvent) -> bool {
        keep(self.owner_filter.as_deref(), &owner)
    }

    fn accept_object(&mut self, object: &ObjectName) -> bool {
        keep(self.object_filter.as_deref(), object)
    }

    fn accept_lock_id(&mut self, engine_lock_id: &str) -> bool {
        keep(self.lock_id_filter.as_deref(), engine_lock_id)
    }

    fn add_lock_row(&mut self, row: DataLockRow<'_>) {
        self.rows.push(row.into());
    }

    fn cache_str(&mut self, text: &str) -> Arc<str> {
        if let Some(hit) = self.cache.get(text) {
            return Arc::clone(hit);
        }
        let interned: Arc<str> = Arc::from(text);
        self.cache.insert(Arc::clone(&interned));
        interned
    }
}

/// Owned copy of one side of a wait edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeSideRecord {
    pub engine_lock_id: String,
    pub trx_id: TrxId,
    pub thread_event: ThreadEvent,
    pub identity: LockIdentity,
}

impl From<WaitEdgeSide<'_>> for EdgeSideRecord {
    fn from(side: WaitEdgeSide<'_>) -> Self {
        Self {
            engine_lock_id: side.engine_lock_id.to_owned(),
            trx_id: side.trx_id,
            thread_event: side.thread_event,
            identity: side.identity,
        }
    }
}

/// Owned copy of one data lock wait row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitRowRecord {
    pub engine: String,
    pub requesting: EdgeSideRecord,
    pub blocking: EdgeSideRecord,
}

/// Data lock wait sink collecting rows.
#[derive(Default)]
pub struct RecordingWaitSink {
    pub rows: Vec<WaitRowRecord>,
    reject_engine: bool,
    requesting_trx_filter: Option<Predicate<TrxId>>,
    blocking_trx_filter: Option<Predicate<TrxId>>,
    requesting_lock_filter: Option<TextPredicate>,
    blocking_lock_filter: Option<TextPredicate>,
}

impl RecordingWaitSink {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn rejecting_engine(mut self) -> Self {
        self.reject_engine = true;
        self
    }

    #[must_use]
    pub fn filter_requesting_trx(mut self, keep: impl Fn(TrxId) -> bool + Send + 'static) -> Self {
        self.requesting_trx_filter = Some(Box::new(move |id: &TrxId| keep(*id)));
        self
    }

    #[must_use]
    pub fn filter_blocking_trx(mut self, keep: impl Fn(TrxId) -> bool + Send + 'static) -> Self {
        self.blocking_trx_filter = Some(Box::new(move |id: &TrxId| keep(*id)));
        self
    }

    #[must_use]
    pub fn filter_requesting_lock_id(
        mut self,
        keep: impl Fn(&str) -> bool + Send + 'static,
    ) -> Self {
        self.requesting_lock_filter = Some(Box::new(keep));
        self
    }

    #[must_use]
    pub fn filter_blocking_lock_id(
        mut self,
        keep: impl Fn(&str) -> bool + Send + 'static,
    ) -> Self {
        self.blocking_lock_filter = Some(Box::new(keep));
        self
    }

    /// `(requesting, blocking)` lock id pairs, in emission order.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.rows
            .iter()
            .map(|r| {
                (
                    r.requesting.engine_lock_id.as_str(),
                    r.blocking.engine_lock_id.as_str(),
                )
            })
            .collect()
    }
}

impl DataLockWaitSink for RecordingWaitSink {
    fn accept_engine(&mut self, engine: &str) -> bool {
        !self.reject_engine && is_engine(engine)
    }

    fn accept_requesting_transaction_id(&mut self, trx_id: TrxId) -> bool {
        keep(self.requesting_trx_filter.as_deref(), &trx_id)
    }

    fn accept_requesting_lock_id(&mut self, engine_lock_id: &str) -> bool {
        keep(self.requesting_lock_filter.as_deref(), engine_lock_id)
    }

    fn accept_blocking_transaction_id(&mut self, trx_id: TrxId) -> bool {
        keep(self.blocking_trx_filter.as_deref(), &trx_id)
    }

    fn accept_blocking_lock_id(&mut self, engine_lock_id: &str) -> bool {
        keep(self.blocking_lock_filter.as_deref(), engine_lock_id)
    }

    fn add_lock_wait_row(&mut self, row: DataLockWaitRow<'_>) {
        self.rows.push(WaitRowRecord {
            engine: row.engine.to_owned(),
            requesting: row.requesting.into(),
            blocking: row.blocking.into(),
        });
    }
}
