//! Per-session scan configuration.

use std::num::NonZeroU64;

use dlock_error::{DataLockError, Result};
use serde::{Deserialize, Serialize};

/// Default width of one scan window, in transaction ids.
pub const DEFAULT_SCAN_RANGE: u64 = 256;

/// Configuration of a data lock scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    range: NonZeroU64,
}

impl ScanConfig {
    /// Build a config with a window width of `range` transaction ids.
    ///
    /// # Errors
    ///
    /// Returns [`DataLockError::InvalidScanRange`] when `range` is 0.
    pub fn with_range(range: u64) -> Result<Self> {
        let range = NonZeroU64::new(range).ok_or(DataLockError::InvalidScanRange { range })?;
        Ok(Self { range })
    }

    /// Window width in transaction ids.
    #[must_use]
    pub const fn range(self) -> u64 {
        self.range.get()
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            range: NonZeroU64::MIN.saturating_add(DEFAULT_SCAN_RANGE - 1),
        }
    }
}
