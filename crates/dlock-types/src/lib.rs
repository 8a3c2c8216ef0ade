//! Shared vocabulary of the data lock introspection workspace: identifier
//! newtypes, the transaction and lock model an engine exposes under its
//! mutexes, and the engine lock id codec.

pub mod ids;
pub mod lock;
pub mod lock_id;
pub mod trx;

pub use ids::{
    HeapNo, LockHandle, LockIdentity, PageNo, SpaceId, TableId, ThreadEvent, TrxHandle, TrxId,
};
pub use lock::{
    HeapBitmap, Lock, LockKind, LockMode, LockStatus, LockTarget, RecordLockFlags,
};
pub use lock_id::{LockId, LockIdError};
pub use trx::{Transaction, TrxList};

/// Engine name reported in every row and matched by `accept_engine`.
pub const ENGINE_NAME: &str = "INNODB";
