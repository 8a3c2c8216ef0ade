//! Restartable batch scan state.
//!
//! A scan session walks the read-write list, then the client list. Each list
//! is covered window by window: a `scan` call takes the engine mutexes,
//! reports every transaction whose id falls into the current window, and
//! releases them again. Lock-hold time and memory are bounded by one window's
//! worth of rows; in exchange, rows are only consistent within a window.
//!
//! Windows are never enumerated blindly. While one window is traversed the
//! smallest id beyond it is remembered (the lookahead), and the next window
//! starts at that id rounded down to a multiple of the range, so empty stretches
//! of the id space cost nothing.

use dlock_types::{TrxId, TrxList};
use serde::Serialize;
use tracing::trace;

use crate::config::ScanConfig;

/// Position of a scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ScanPass {
    /// Nothing scanned yet; the engine has not been accepted.
    Init,
    ReadWriteList,
    ClientList,
    Done,
}

impl ScanPass {
    /// Transaction list walked during this pass.
    pub const fn list(self) -> Option<TrxList> {
        match self {
            Self::ReadWriteList => Some(TrxList::ReadWrite),
            Self::ClientList => Some(TrxList::Client),
            Self::Init | Self::Done => None,
        }
    }

    /// Following pass.
    ///
    /// # Panics
    ///
    /// A finished scan has no following pass; advancing one means the caller
    /// lost track of its own state.
    fn next(self) -> Self {
        match self {
            Self::Init => Self::ReadWriteList,
            Self::ReadWriteList => Self::ClientList,
            Self::ClientList => Self::Done,
            Self::Done => panic!("data lock scan advanced past Done"),
        }
    }
}

/// Half-open transaction id window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Window {
    pub start: u64,
    pub end: u64,
}

impl Window {
    fn aligned(id: u64, range: u64) -> Self {
        let start = id - id % range;
        Self {
            start,
            end: start.saturating_add(range),
        }
    }

    pub const fn contains(self, id: u64) -> bool {
        self.start <= id && id < self.end
    }
}

/// Where an id lies relative to the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPosition {
    Before,
    Inside,
    Beyond,
}

/// State machine of one scan session.
#[derive(Debug, Clone)]
pub struct ScanState {
    range: u64,
    pass: ScanPass,
    window: Window,
    lookahead: Option<u64>,
}

impl ScanState {
    pub fn new(config: ScanConfig) -> Self {
        let range = config.range();
        Self {
            range,
            pass: ScanPass::Init,
            window: Window::aligned(0, range),
            lookahead: None,
        }
    }

    pub const fn current_pass(&self) -> ScanPass {
        self.pass
    }

    pub const fn is_done(&self) -> bool {
        matches!(self.pass, ScanPass::Done)
    }

    /// Current window, `None` once the scan is done.
    pub const fn window(&self) -> Option<Window> {
        match self.pass {
            ScanPass::Done => None,
            _ => Some(self.window),
        }
    }

    /// Smallest id seen beyond the current window so far.
    pub const fn lookahead(&self) -> Option<u64> {
        self.lookahead
    }

    pub const fn range(&self) -> u64 {
        self.range
    }

    /// Locate `id` relative to the current window without touching state.
    pub const fn classify(&self, id: TrxId) -> WindowPosition {
        let raw = id.get();
        if raw < self.window.start {
            WindowPosition::Before
        } else if raw < self.window.end {
            WindowPosition::Inside
        } else {
            WindowPosition::Beyond
        }
    }

    /// Whether `id` belongs to the current window, remembering it as the next
    /// window seed when it lies beyond.
    ///
    /// # Panics
    ///
    /// Panics on an id above [`TrxId::MAX`]. No window can hold it, so the
    /// scan would revisit the topmost window forever.
    pub fn contains(&mut self, id: TrxId) -> bool {
        assert!(id <= TrxId::MAX, "transaction id {id} out of domain");
        if self.is_done() {
            return false;
        }
        match self.classify(id) {
            WindowPosition::Inside => true,
            WindowPosition::Before => false,
            WindowPosition::Beyond => {
                self.record_lookahead(id.get());
                false
            }
        }
    }

    fn record_lookahead(&mut self, id: u64) {
        if self.lookahead.is_none_or(|seen| id < seen) {
            self.lookahead = Some(id);
        }
    }

    /// Move to the next non-empty window of this pass, or to the next pass.
    ///
    /// # Panics
    ///
    /// Panics when called on a finished scan.
    pub fn advance(&mut self) {
        if let Some(next) = self.lookahead.take() {
            self.window = Window::aligned(next, self.range);
            trace!(
                pass = ?self.pass,
                start = self.window.start,
                end = self.window.end,
                "scan window advanced"
            );
            return;
        }

        self.pass = self.pass.next();
        self.window = Window::aligned(0, self.range);
        trace!(pass = ?self.pass, "scan pass advanced");
    }
}

impl Default for ScanState {
    fn default() -> Self {
        Self::new(ScanConfig::default())
    }
}
