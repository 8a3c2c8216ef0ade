//! Lock model as exposed by the engine while its lock mutex is held.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::ids::{HeapNo, PageNo, SpaceId, TableId, ThreadEvent, TrxId};

// ---------------------------------------------------------------------------
// LockMode
// ---------------------------------------------------------------------------

/// Basic lock mode shared by table and record locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    /// Intention shared.
    IntentionShared,
    /// Intention exclusive.
    IntentionExclusive,
    /// Shared.
    Shared,
    /// Exclusive.
    Exclusive,
    /// Table auto-increment lock.
    AutoInc,
}

impl LockMode {
    /// Column text for the mode.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IntentionShared => "IS",
            Self::IntentionExclusive => "IX",
            Self::Shared => "S",
            Self::Exclusive => "X",
            Self::AutoInc => "AUTO_INC",
        }
    }

    /// Classic multi-granularity compatibility matrix.
    pub const fn is_compatible(self, other: Self) -> bool {
        use LockMode::{AutoInc, Exclusive, IntentionExclusive, IntentionShared, Shared};
        match (self, other) {
            (Exclusive, _) | (_, Exclusive) => false,
            (IntentionShared, _) | (_, IntentionShared) => true,
            (IntentionExclusive, IntentionExclusive | AutoInc)
            | (AutoInc, IntentionExclusive)
            | (Shared, Shared) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RecordLockFlags
// ---------------------------------------------------------------------------

/// Precision qualifiers of a record lock (bit flags).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RecordLockFlags(u8);

impl RecordLockFlags {
    /// Lock covers only the gap before the record.
    pub const GAP: u8 = 1 << 0;
    /// Lock covers only the record, not the gap.
    pub const REC_NOT_GAP: u8 = 1 << 1;
    /// Insert intention gap lock.
    pub const INSERT_INTENTION: u8 = 1 << 2;

    /// Next-key lock: record plus the gap before it.
    pub const fn next_key() -> Self {
        Self(0)
    }

    pub const fn with_gap(self) -> Self {
        Self(self.0 | Self::GAP)
    }

    pub const fn with_rec_not_gap(self) -> Self {
        Self(self.0 | Self::REC_NOT_GAP)
    }

    pub const fn with_insert_intention(self) -> Self {
        Self(self.0 | Self::INSERT_INTENTION)
    }

    pub const fn is_gap(self) -> bool {
        (self.0 & Self::GAP) != 0
    }

    pub const fn is_rec_not_gap(self) -> bool {
        (self.0 & Self::REC_NOT_GAP) != 0
    }

    pub const fn is_insert_intention(self) -> bool {
        (self.0 & Self::INSERT_INTENTION) != 0
    }

    pub const fn as_u8(self) -> u8 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// HeapBitmap
// ---------------------------------------------------------------------------

/// Set of heap numbers covered by one record lock.
///
/// Most record locks cover a handful of slots on a small page, so the first
/// 128 heap numbers live inline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct HeapBitmap {
    words: SmallVec<[u64; 2]>,
}

impl HeapBitmap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `heap_no`. Returns `true` if it was not set before.
    ///
    /// The bitmap grows to cover `heap_no`, so callers keep heap numbers
    /// within [`HeapNo::MAX`].
    pub fn insert(&mut self, heap_no: HeapNo) -> bool {
        let (word, bit) = Self::locate(heap_no);
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        let was_set = self.words[word] & bit != 0;
        self.words[word] |= bit;
        !was_set
    }

    /// Clear `heap_no`. Returns `true` if it was set.
    pub fn remove(&mut self, heap_no: HeapNo) -> bool {
        let (word, bit) = Self::locate(heap_no);
        match self.words.get_mut(word) {
            Some(w) if *w & bit != 0 => {
                *w &= !bit;
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, heap_no: HeapNo) -> bool {
        let (word, bit) = Self::locate(heap_no);
        self.words.get(word).is_some_and(|w| w & bit != 0)
    }

    /// Lowest set heap number.
    pub fn first(&self) -> Option<HeapNo> {
        self.iter().next()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Number of set heap numbers.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Set heap numbers in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = HeapNo> + '_ {
        self.words.iter().enumerate().flat_map(|(idx, &word)| {
            let base = u32::try_from(idx * 64).unwrap_or(u32::MAX);
            BitIter(word).map(move |bit| HeapNo::new(base + bit))
        })
    }

    fn locate(heap_no: HeapNo) -> (usize, u64) {
        let raw = heap_no.get() as usize;
        (raw / 64, 1_u64 << (raw % 64))
    }
}

impl FromIterator<HeapNo> for HeapBitmap {
    fn from_iter<I: IntoIterator<Item = HeapNo>>(iter: I) -> Self {
        let mut bitmap = Self::new();
        for heap_no in iter {
            bitmap.insert(heap_no);
        }
        bitmap
    }
}

/// Yields the positions of set bits of one word, lowest first.
struct BitIter(u64);

impl Iterator for BitIter {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.0 == 0 {
            return None;
        }
        let bit = self.0.trailing_zeros();
        self.0 &= self.0 - 1;
        Some(bit)
    }
}

// ---------------------------------------------------------------------------
// Lock
// ---------------------------------------------------------------------------

/// Lock granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockKind {
    Table,
    Record,
}

impl LockKind {
    /// Column text for the lock type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Table => "TABLE",
            Self::Record => "RECORD",
        }
    }
}

/// Whether a lock is held or still being waited for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockStatus {
    Granted,
    Waiting,
}

impl LockStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Granted => "GRANTED",
            Self::Waiting => "WAITING",
        }
    }
}

/// Kind-specific part of a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockTarget {
    /// Lock on a whole table.
    Table,
    /// Lock on records of one index page.
    Record {
        space_id: SpaceId,
        page_no: PageNo,
        index_name: String,
        flags: RecordLockFlags,
        heaps: HeapBitmap,
    },
}

/// One engine lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    /// Printable id of the owning transaction.
    pub trx_id: TrxId,
    pub mode: LockMode,
    /// Thread and event that created the lock.
    pub owner: ThreadEvent,
    /// Table the lock belongs to (for record locks, the table of the index).
    pub table_id: TableId,
    /// Engine-internal table path, `schema/table[#P#part[#SP#subpart]]`.
    pub table_path: String,
    pub target: LockTarget,
}

impl Lock {
    pub const fn kind(&self) -> LockKind {
        match self.target {
            LockTarget::Table => LockKind::Table,
            LockTarget::Record { .. } => LockKind::Record,
        }
    }

    /// Mode column text, record qualifiers appended (`X,REC_NOT_GAP`).
    pub fn mode_str(&self) -> Cow<'static, str> {
        let LockTarget::Record { flags, .. } = &self.target else {
            return Cow::Borrowed(self.mode.as_str());
        };
        if flags.as_u8() == 0 {
            return Cow::Borrowed(self.mode.as_str());
        }
        let mut text = String::from(self.mode.as_str());
        if flags.is_gap() {
            text.push_str(",GAP");
        }
        if flags.is_rec_not_gap() {
            text.push_str(",REC_NOT_GAP");
        }
        if flags.is_insert_intention() {
            text.push_str(",INSERT_INTENTION");
        }
        Cow::Owned(text)
    }

    /// Type column text.
    pub const fn type_str(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Index name of a record lock.
    pub fn index_name(&self) -> Option<&str> {
        match &self.target {
            LockTarget::Table => None,
            LockTarget::Record { index_name, .. } => Some(index_name),
        }
    }

    /// Granted heap numbers of a record lock.
    pub fn heaps(&self) -> Option<&HeapBitmap> {
        match &self.target {
            LockTarget::Table => None,
            LockTarget::Record { heaps, .. } => Some(heaps),
        }
    }

    /// `(space, page)` of a record lock.
    pub fn page(&self) -> Option<(SpaceId, PageNo)> {
        match self.target {
            LockTarget::Table => None,
            LockTarget::Record {
                space_id, page_no, ..
            } => Some((space_id, page_no)),
        }
    }
}
