//! Engine lock id codec.
//!
//! The engine lock id is the only wire-visible format of the data lock
//! tables. Consumers store it and hand it back to `fetch`, so the grammar is
//! fixed:
//!
//! - table lock: `<trx_id>:<table_id>`
//! - record lock: `<trx_id>:<space_id>:<page_no>:<heap_no>`
//!
//! every field a plain unsigned decimal number.

use std::fmt;
use std::str::FromStr;

use dlock_error::DataLockError;

use crate::ids::{HeapNo, PageNo, SpaceId, TableId, TrxId};
use crate::lock::{Lock, LockKind, LockTarget};

/// Decoded engine lock id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockId {
    Table {
        trx_id: TrxId,
        table_id: TableId,
    },
    Record {
        trx_id: TrxId,
        space_id: SpaceId,
        page_no: PageNo,
        heap_no: HeapNo,
    },
}

impl LockId {
    /// Id of `lock`, scoped to `heap_no` for record locks.
    ///
    /// `heap_no` is ignored for table locks. A record lock without an explicit
    /// slot falls back to its lowest granted heap number; `None` only when the
    /// record lock holds no slot at all.
    pub fn of(lock: &Lock, heap_no: Option<HeapNo>) -> Option<Self> {
        match &lock.target {
            LockTarget::Table => Some(Self::Table {
                trx_id: lock.trx_id,
                table_id: lock.table_id,
            }),
            LockTarget::Record {
                space_id,
                page_no,
                heaps,
                ..
            } => Some(Self::Record {
                trx_id: lock.trx_id,
                space_id: *space_id,
                page_no: *page_no,
                heap_no: heap_no.or_else(|| heaps.first())?,
            }),
        }
    }

    /// Decode an engine lock id.
    ///
    /// # Errors
    ///
    /// Returns a [`LockIdError`] describing the first deviation from either
    /// grammar.
    pub fn parse(input: &str) -> Result<Self, LockIdError> {
        let mut values = [0_u64; 4];
        let mut count = 0;

        for (index, field) in input.split(':').enumerate() {
            if index == values.len() {
                return Err(LockIdError::FieldCount { found: index + 1 });
            }
            values[index] = parse_field(index, field)?;
            count = index + 1;
        }

        match count {
            2 => Ok(Self::Table {
                trx_id: TrxId::new(values[0]),
                table_id: TableId::new(values[1]),
            }),
            4 => Ok(Self::Record {
                trx_id: TrxId::new(values[0]),
                space_id: SpaceId::new(narrow(1, values[1])?),
                page_no: PageNo::new(narrow(2, values[2])?),
                heap_no: HeapNo::new(narrow(3, values[3])?),
            }),
            found => Err(LockIdError::FieldCount { found }),
        }
    }

    pub const fn trx_id(&self) -> TrxId {
        match *self {
            Self::Table { trx_id, .. } | Self::Record { trx_id, .. } => trx_id,
        }
    }

    pub const fn kind(&self) -> LockKind {
        match self {
            Self::Table { .. } => LockKind::Table,
            Self::Record { .. } => LockKind::Record,
        }
    }

    pub const fn heap_no(&self) -> Option<HeapNo> {
        match *self {
            Self::Table { .. } => None,
            Self::Record { heap_no, .. } => Some(heap_no),
        }
    }

    /// Whether `lock` is the lock this id was printed from, ignoring the slot.
    ///
    /// Table locks match on table id, record locks on `(space, page)`.
    pub fn matches_lock(&self, lock: &Lock) -> bool {
        match (*self, &lock.target) {
            (Self::Table { table_id, .. }, LockTarget::Table) => lock.table_id == table_id,
            (
                Self::Record {
                    space_id, page_no, ..
                },
                LockTarget::Record {
                    space_id: lock_space,
                    page_no: lock_page,
                    ..
                },
            ) => *lock_space == space_id && *lock_page == page_no,
            _ => false,
        }
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table { trx_id, table_id } => write!(f, "{trx_id}:{table_id}"),
            Self::Record {
                trx_id,
                space_id,
                page_no,
                heap_no,
            } => write!(f, "{trx_id}:{space_id}:{page_no}:{heap_no}"),
        }
    }
}

impl FromStr for LockId {
    type Err = DataLockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).map_err(|err| DataLockError::malformed_lock_id(s, err.to_string()))
    }
}

fn parse_field(index: usize, field: &str) -> Result<u64, LockIdError> {
    if field.is_empty() {
        return Err(LockIdError::EmptyField { index });
    }
    if !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LockIdError::NotANumber { index });
    }
    field
        .parse::<u64>()
        .map_err(|_| LockIdError::OutOfRange { index })
}

fn narrow(index: usize, value: u64) -> Result<u32, LockIdError> {
    u32::try_from(value).map_err(|_| LockIdError::OutOfRange { index })
}

/// Why an engine lock id failed to decode. Field indexes are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockIdError {
    /// Neither 2 nor 4 `:`-separated fields.
    FieldCount { found: usize },
    /// Two separators in a row, or a leading/trailing separator.
    EmptyField { index: usize },
    /// Field contains something other than decimal digits.
    NotANumber { index: usize },
    /// Field does not fit its column type.
    OutOfRange { index: usize },
}

impl fmt::Display for LockIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldCount { found } => {
                write!(f, "expected 2 or 4 fields, found {found}")
            }
            Self::EmptyField { index } => write!(f, "field {index} is empty"),
            Self::NotANumber { index } => write!(f, "field {index} is not a number"),
            Self::OutOfRange { index } => write!(f, "field {index} is out of range"),
        }
    }
}

impl std::error::Error for LockIdError {}
