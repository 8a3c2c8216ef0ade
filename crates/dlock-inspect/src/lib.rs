//! Live introspection of engine locks and lock waits.
//!
//! The engine's transaction lists are walked in bounded batches: every
//! [`DataLockIterator::scan`] or [`DataLockWaitIterator::scan`] call holds the
//! engine mutexes for one transaction-id window only and returns, so a
//! consumer can page through an arbitrarily large lock table without
//! freezing the engine. Rows are consistent within a batch, not across the
//! whole scan. Any reported row can later be re-resolved exactly through
//! `fetch` with the engine lock id it was reported under.

pub mod config;
pub mod engine;
pub mod inspector;
pub mod lock_iter;
pub mod lock_wait_iter;
pub mod observability;
pub mod scan_state;
pub mod sink;
pub mod table_path;
mod traversal;

pub use config::{DEFAULT_SCAN_RANGE, ScanConfig};
pub use engine::{LockSys, TrxSysView};
pub use inspector::DataLockInspector;
pub use lock_iter::DataLockIterator;
pub use lock_wait_iter::DataLockWaitIterator;
pub use observability::{
    DataLockMetricsSnapshot, InspectTable, NoOpObserver, ScanEvent, ScanEventLog, ScanObserver,
    SharedObserver, data_lock_metrics_snapshot, reset_data_lock_metrics,
};
pub use scan_state::{ScanPass, ScanState, Window, WindowPosition};
pub use sink::{
    DataLockRow, DataLockSink, DataLockWaitRow, DataLockWaitSink, ObjectName, WaitEdgeSide,
    is_engine,
};
pub use table_path::{FilenameTablePaths, TablePath, TablePathResolver, resolve_object};
