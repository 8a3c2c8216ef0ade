//! Identifier newtypes.
//!
//! Every value that ends up in an engine lock id gets its own type so that a
//! space id can never be passed where a page number is expected, which the
//! positional `trx:space:page:heap` grammar would otherwise happily accept.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transaction id.
///
/// `0` means "no id assigned yet": read-only and not-yet-writing
/// transactions run without one. Real ids are allocated by the engine and are
/// increasing but not dense.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct TrxId(u64);

impl TrxId {
    /// Unassigned transaction id.
    pub const NONE: Self = Self(0);

    /// Largest id a transaction may carry. `u64::MAX` is kept free so that a
    /// scan window end can always exceed every valid id.
    pub const MAX: Self = Self(u64::MAX - 1);

    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether the engine has assigned an id.
    #[inline]
    pub const fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for TrxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TrxId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident($raw:ty)) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize,
            Deserialize,
        )]
        #[repr(transparent)]
        pub struct $name($raw);

        impl $name {
            #[inline]
            pub const fn new(raw: $raw) -> Self {
                Self(raw)
            }

            /// Get the raw value.
            #[inline]
            pub const fn get(self) -> $raw {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$raw> for $name {
            fn from(raw: $raw) -> Self {
                Self(raw)
            }
        }
    };
}

id_newtype!(
    /// Dictionary id of a table.
    TableId(u64)
);

id_newtype!(
    /// Tablespace id.
    SpaceId(u32)
);

id_newtype!(
    /// Page number within a tablespace.
    PageNo(u32)
);

id_newtype!(
    /// Slot of a record within its page (the record's heap number).
    HeapNo(u32)
);

impl HeapNo {
    /// Heap number of the page infimum pseudo-record.
    pub const INFIMUM: Self = Self(0);
    /// Heap number of the page supremum pseudo-record.
    pub const SUPREMUM: Self = Self(1);
    /// Largest heap number a page can hold; the record header field is 13 bits.
    pub const MAX: Self = Self(8191);
}

/// Instrumentation identity of the code that created a lock: the owning
/// thread and the event sequence number within that thread.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ThreadEvent {
    pub thread_id: u64,
    pub event_id: u64,
}

impl ThreadEvent {
    pub const fn new(thread_id: u64, event_id: u64) -> Self {
        Self {
            thread_id,
            event_id,
        }
    }
}

/// Engine handle of a transaction. Only meaningful to the engine that issued
/// it, and only while that engine's transaction-list mutex is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrxHandle(u32);

impl TrxHandle {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Engine handle of a lock, same validity rules as [`TrxHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockHandle(u32);

impl LockHandle {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Opaque identity token handed to row sinks.
    #[inline]
    pub const fn identity(self) -> LockIdentity {
        LockIdentity(self.0 as u64)
    }
}

/// Opaque per-lock token carried by emitted rows.
///
/// Sinks may use it to correlate rows (e.g. a lock row with the wait edges
/// that reference the same lock). It is never turned back into a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockIdentity(u64);

impl LockIdentity {
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}
