//! In-memory reference engine.
//!
//! [`MemLockSys`] keeps a lock table and a transaction table behind two
//! mutexes, the lock mutex always taken first. Handles index slab slots and
//! are never reused, so a handle of a finished transaction or released lock
//! simply stops resolving.

use std::collections::HashMap;

use dlock_error::{DataLockError, Result};
use dlock_inspect::{LockSys, TrxSysView};
use dlock_types::{
    HeapBitmap, HeapNo, Lock, LockHandle, LockMode, LockTarget, PageNo, RecordLockFlags, SpaceId,
    TableId, ThreadEvent, Transaction, TrxHandle, TrxId, TrxList,
};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace};

/// Base of the printable ids handed to transactions without an assigned id.
pub const PSEUDO_ID_BASE: u64 = 1 << 48;

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

struct LockSlot {
    lock: Lock,
    trx: TrxHandle,
}

#[derive(Default)]
struct LockTable {
    slots: Vec<Option<LockSlot>>,
    record_data: HashMap<(SpaceId, PageNo, HeapNo), String>,
}

impl LockTable {
    fn get(&self, handle: LockHandle) -> Option<&LockSlot> {
        self.slots.get(handle.index()).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, handle: LockHandle) -> Option<&mut LockSlot> {
        self.slots.get_mut(handle.index()).and_then(Option::as_mut)
    }

    fn insert(&mut self, slot: LockSlot) -> Result<LockHandle> {
        let raw = u32::try_from(self.slots.len())
            .map_err(|_| DataLockError::internal("lock table full"))?;
        self.slots.push(Some(slot));
        Ok(LockHandle::new(raw))
    }
}

struct TrxSlot {
    trx: Transaction,
    thread_id: u64,
    next_event: u64,
}

#[derive(Default)]
struct TrxTable {
    slots: Vec<Option<TrxSlot>>,
    rw_list: Vec<TrxHandle>,
    client_list: Vec<TrxHandle>,
}

impl TrxTable {
    fn get(&self, handle: TrxHandle) -> Result<&TrxSlot> {
        self.slots
            .get(handle.index())
            .and_then(Option::as_ref)
            .ok_or(DataLockError::UnknownTransaction {
                handle: handle.get(),
            })
    }

    fn get_mut(&mut self, handle: TrxHandle) -> Result<&mut TrxSlot> {
        self.slots
            .get_mut(handle.index())
            .and_then(Option::as_mut)
            .ok_or(DataLockError::UnknownTransaction {
                handle: handle.get(),
            })
    }

    fn started_mut(&mut self, handle: TrxHandle) -> Result<&mut TrxSlot> {
        let slot = self.get_mut(handle)?;
        if !slot.trx.started {
            return Err(DataLockError::NotStarted {
                handle: handle.get(),
            });
        }
        Ok(slot)
    }

    fn id_in_use(&self, id: TrxId, except: TrxHandle) -> bool {
        self.slots.iter().enumerate().any(|(idx, slot)| {
            idx != except.index() && slot.as_ref().is_some_and(|s| s.trx.id == id)
        })
    }
}

/// Fields of a new record lock.
#[derive(Debug, Clone)]
pub struct RecordLockRequest {
    pub table_id: TableId,
    pub table_path: String,
    pub index_name: String,
    pub space_id: SpaceId,
    pub page_no: PageNo,
    pub mode: LockMode,
    pub flags: RecordLockFlags,
    pub heaps: Vec<HeapNo>,
}

impl RecordLockRequest {
    /// Next-key lock on the given slots of `(space, page)` in index `PRIMARY`.
    pub fn new(
        table_id: u64,
        table_path: &str,
        space_id: u32,
        page_no: u32,
        mode: LockMode,
        heaps: &[u32],
    ) -> Self {
        Self {
            table_id: TableId::new(table_id),
            table_path: table_path.to_owned(),
            index_name: "PRIMARY".to_owned(),
            space_id: SpaceId::new(space_id),
            page_no: PageNo::new(page_no),
            mode,
            flags: RecordLockFlags::next_key(),
            heaps: heaps.iter().copied().map(HeapNo::new).collect(),
        }
    }

    #[must_use]
    pub fn index(mut self, index_name: &str) -> Self {
        self.index_name = index_name.to_owned();
        self
    }

    #[must_use]
    pub fn flags(mut self, flags: RecordLockFlags) -> Self {
        self.flags = flags;
        self
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Reference transactional engine.
#[derive(Default)]
pub struct MemLockSys {
    lock_sys: Mutex<LockTable>,
    trx_sys: Mutex<TrxTable>,
}

/// Both engine mutexes, released transaction list first.
pub struct MemGuard<'a> {
    trxs: MutexGuard<'a, TrxTable>,
    locks: MutexGuard<'a, LockTable>,
}

impl MemLockSys {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MemGuard<'_> {
        let locks = self.lock_sys.lock();
        let trxs = self.trx_sys.lock();
        MemGuard { trxs, locks }
    }

    /// Register a not-yet-started transaction on the client list.
    pub fn create_trx(&self, thread_id: u64) -> Result<TrxHandle> {
        let mut trxs = self.trx_sys.lock();
        let raw = u32::try_from(trxs.slots.len())
            .map_err(|_| DataLockError::internal("transaction table full"))?;
        let handle = TrxHandle::new(raw);
        trxs.slots.push(Some(TrxSlot {
            trx: Transaction {
                id: TrxId::NONE,
                pseudo_id: TrxId::new(PSEUDO_ID_BASE + u64::from(raw)),
                started: false,
                read_only: false,
                wait_lock: None,
                locks: Vec::new(),
            },
            thread_id,
            next_event: 1,
        }));
        trxs.client_list.push(handle);
        Ok(handle)
    }

    pub fn start(&self, trx: TrxHandle, read_only: bool) -> Result<()> {
        let mut trxs = self.trx_sys.lock();
        let slot = trxs.get_mut(trx)?;
        slot.trx.started = true;
        slot.trx.read_only = read_only;
        Ok(())
    }

    /// Give a started transaction its id. Read-write transactions join the
    /// read-write list; locks already held are re-labelled with the id.
    pub fn assign_id(&self, trx: TrxHandle, id: TrxId) -> Result<()> {
        if !id.is_assigned() || id > TrxId::MAX || id.get() >= PSEUDO_ID_BASE {
            return Err(DataLockError::TransactionIdOutOfRange { trx_id: id.get() });
        }

        let MemGuard {
            mut trxs,
            mut locks,
        } = self.tables();
        if trxs.id_in_use(id, trx) {
            return Err(DataLockError::TransactionIdInUse { trx_id: id.get() });
        }
        let slot = trxs.started_mut(trx)?;
        slot.trx.id = id;
        let read_only = slot.trx.read_only;
        let owned = slot.trx.locks.clone();

        for handle in owned {
            if let Some(lock) = locks.get_mut(handle) {
                lock.lock.trx_id = id;
            }
        }
        if !read_only && !trxs.rw_list.contains(&trx) {
            trxs.rw_list.push(trx);
        }
        debug!(trx = trx.get(), trx_id = %id, read_only, "transaction id assigned");
        Ok(())
    }

    /// Started read-write transaction with `id`, on both lists.
    pub fn begin_rw(&self, id: u64, thread_id: u64) -> Result<TrxHandle> {
        let trx = self.create_trx(thread_id)?;
        self.start(trx, false)?;
        self.assign_id(trx, TrxId::new(id))?;
        Ok(trx)
    }

    /// Started read-only transaction without an id, on the client list only.
    pub fn begin_read_only(&self, thread_id: u64) -> Result<TrxHandle> {
        let trx = self.create_trx(thread_id)?;
        self.start(trx, true)?;
        Ok(trx)
    }

    pub fn add_table_lock(
        &self,
        trx: TrxHandle,
        table_id: u64,
        table_path: &str,
        mode: LockMode,
    ) -> Result<LockHandle> {
        self.add_lock(trx, TableId::new(table_id), table_path, mode, LockTarget::Table)
    }

    pub fn add_record_lock(&self, trx: TrxHandle, request: RecordLockRequest) -> Result<LockHandle> {
        if request.heaps.is_empty() {
            return Err(DataLockError::EmptyRecordLock);
        }
        if let Some(&heap_no) = request.heaps.iter().find(|&&h| h > HeapNo::MAX) {
            return Err(DataLockError::HeapNoOutOfRange {
                heap_no: heap_no.get(),
                max: HeapNo::MAX.get(),
            });
        }
        let heaps: HeapBitmap = request.heaps.iter().copied().collect();
        let target = LockTarget::Record {
            space_id: request.space_id,
            page_no: request.page_no,
            index_name: request.index_name,
            flags: request.flags,
            heaps,
        };
        self.add_lock(trx, request.table_id, &request.table_path, request.mode, target)
    }

    fn add_lock(
        &self,
        trx: TrxHandle,
        table_id: TableId,
        table_path: &str,
        mode: LockMode,
        target: LockTarget,
    ) -> Result<LockHandle> {
        let MemGuard {
            mut trxs,
            mut locks,
        } = self.tables();
        let slot = trxs.started_mut(trx)?;
        let owner = ThreadEvent::new(slot.thread_id, slot.next_event);
        let handle = locks.insert(LockSlot {
            lock: Lock {
                trx_id: slot.trx.print_id(),
                mode,
                owner,
                table_id,
                table_path: table_path.to_owned(),
                target,
            },
            trx,
        })?;
        slot.next_event += 1;
        slot.trx.locks.push(handle);
        trace!(trx = trx.get(), lock = handle.get(), %mode, "lock created");
        Ok(handle)
    }

    /// Mark `trx` as blocked on one of its own locks.
    pub fn set_wait(&self, trx: TrxHandle, lock: LockHandle) -> Result<()> {
        let MemGuard { mut trxs, locks } = self.tables();
        let owner = locks
            .get(lock)
            .ok_or(DataLockError::UnknownLock { handle: lock.get() })?
            .trx;
        if owner != trx {
            return Err(DataLockError::LockNotOwned {
                lock: lock.get(),
                trx: trx.get(),
            });
        }
        trxs.started_mut(trx)?.trx.wait_lock = Some(lock);
        Ok(())
    }

    pub fn clear_wait(&self, trx: TrxHandle) -> Result<()> {
        let mut trxs = self.trx_sys.lock();
        trxs.get_mut(trx)?.trx.wait_lock = None;
        Ok(())
    }

    /// Key text reported as lock data for a user record slot.
    pub fn set_record_data(&self, space_id: u32, page_no: u32, heap_no: u32, text: &str) {
        self.lock_sys.lock().record_data.insert(
            (SpaceId::new(space_id), PageNo::new(page_no), HeapNo::new(heap_no)),
            text.to_owned(),
        );
    }

    /// Commit or roll back: release every lock and drop the transaction.
    pub fn finish(&self, trx: TrxHandle) -> Result<()> {
        let MemGuard {
            mut trxs,
            mut locks,
        } = self.tables();
        let slot = trxs
            .slots
            .get_mut(trx.index())
            .and_then(Option::take)
            .ok_or(DataLockError::UnknownTransaction { handle: trx.get() })?;
        for handle in &slot.trx.locks {
            if let Some(entry) = locks.slots.get_mut(handle.index()) {
                *entry = None;
            }
        }
        trxs.rw_list.retain(|&h| h != trx);
        trxs.client_list.retain(|&h| h != trx);
        debug!(
            trx = trx.get(),
            trx_id = %slot.trx.print_id(),
            locks = slot.trx.locks.len(),
            "transaction finished"
        );
        Ok(())
    }

    /// Printable id of a live transaction.
    pub fn print_id(&self, trx: TrxHandle) -> Result<TrxId> {
        Ok(self.trx_sys.lock().get(trx)?.trx.print_id())
    }
}

impl LockSys for MemLockSys {
    type Guard<'a> = MemGuard<'a>;

    fn enter(&self) -> MemGuard<'_> {
        self.tables()
    }
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

impl MemGuard<'_> {
    fn slot(&self, handle: LockHandle) -> Option<&LockSlot> {
        self.locks.get(handle)
    }

    fn shares_resource(requester: &Lock, other: &Lock) -> bool {
        match (&requester.target, &other.target) {
            (LockTarget::Table, LockTarget::Table) => requester.table_id == other.table_id,
            (
                LockTarget::Record {
                    space_id,
                    page_no,
                    heaps,
                    ..
                },
                LockTarget::Record {
                    space_id: other_space,
                    page_no: other_page,
                    heaps: other_heaps,
                    ..
                },
            ) => {
                space_id == other_space
                    && page_no == other_page
                    && heaps.first().is_some_and(|h| other_heaps.contains(h))
            }
            _ => false,
        }
    }
}

/// Gap-aware record conflict rules. `true` when the requester is blocked.
fn record_has_to_wait(heap_no: HeapNo, requester: RecordLockFlags, other: RecordLockFlags) -> bool {
    if (heap_no == HeapNo::SUPREMUM || requester.is_gap()) && !requester.is_insert_intention() {
        return false;
    }
    if !requester.is_insert_intention() && other.is_gap() {
        return false;
    }
    if requester.is_gap() && other.is_rec_not_gap() {
        return false;
    }
    !other.is_insert_intention()
}

impl TrxSysView for MemGuard<'_> {
    fn transactions(&self, list: TrxList) -> &[TrxHandle] {
        match list {
            TrxList::ReadWrite => &self.trxs.rw_list,
            TrxList::Client => &self.trxs.client_list,
        }
    }

    fn transaction(&self, handle: TrxHandle) -> Option<&Transaction> {
        self.trxs.get(handle).ok().map(|slot| &slot.trx)
    }

    fn lock(&self, handle: LockHandle) -> Option<&Lock> {
        self.slot(handle).map(|slot| &slot.lock)
    }

    fn queue_ahead(&self, lock: LockHandle) -> Vec<LockHandle> {
        let Some(requester) = self.lock(lock) else {
            return Vec::new();
        };
        self.locks.slots[..lock.index()]
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, slot)| {
                slot.as_ref()
                    .is_some_and(|s| Self::shares_resource(requester, &s.lock))
            })
            .filter_map(|(idx, _)| u32::try_from(idx).ok().map(LockHandle::new))
            .collect()
    }

    fn has_to_wait(&self, requester: LockHandle, other: LockHandle) -> bool {
        let (Some(req), Some(blk)) = (self.slot(requester), self.slot(other)) else {
            return false;
        };
        if req.trx == blk.trx || req.lock.mode.is_compatible(blk.lock.mode) {
            return false;
        }
        match (&req.lock.target, &blk.lock.target) {
            (LockTarget::Table, LockTarget::Table) => true,
            (
                LockTarget::Record { flags, heaps, .. },
                LockTarget::Record {
                    flags: other_flags, ..
                },
            ) => heaps
                .first()
                .is_some_and(|heap_no| record_has_to_wait(heap_no, *flags, *other_flags)),
            _ => false,
        }
    }

    fn lock_data(&self, lock: LockHandle, heap_no: HeapNo) -> Option<String> {
        let (space_id, page_no) = self.lock(lock)?.page()?;
        match heap_no {
            HeapNo::INFIMUM => Some("infimum pseudo-record".to_owned()),
            HeapNo::SUPREMUM => Some("supremum pseudo-record".to_owned()),
            _ => self
                .locks
                .record_data
                .get(&(space_id, page_no, heap_no))
                .cloned(),
        }
    }
}
