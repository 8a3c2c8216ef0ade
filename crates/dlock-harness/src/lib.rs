//! Test harness for data lock introspection.
//!
//! Provides an in-memory engine implementing the engine collaborator traits
//! and sinks that record every row they receive. The integration tests of
//! this crate drive both iterators through them.

pub mod mem_engine;
pub mod recording_sink;

pub use mem_engine::{MemGuard, MemLockSys, PSEUDO_ID_BASE, RecordLockRequest};
pub use recording_sink::{
    EdgeSideRecord, LockRowRecord, RecordingSink, RecordingWaitSink, WaitRowRecord,
};
