use thiserror::Error;

/// Primary error type for data lock introspection.
///
/// Introspection itself never fails towards the consumer: a malformed or
/// unknown lock id is reported as "no row", and a sink rejection silently
/// skips the candidate. These variants cover the fallible edges around that
/// core: configuration, explicit lock-id decoding, and mutation of the
/// in-memory reference engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataLockError {
    // === Configuration Errors ===
    /// Scan window width must be at least one transaction id.
    #[error("invalid scan range: {range} (must be at least 1)")]
    InvalidScanRange { range: u64 },

    // === Lock Id Errors ===
    /// Engine lock id does not match `trx:table` or `trx:space:page:heap`.
    #[error("malformed lock id '{input}': {reason}")]
    MalformedLockId { input: String, reason: String },

    // === Engine Errors ===
    /// No transaction behind this handle.
    #[error("no such transaction handle: {handle}")]
    UnknownTransaction { handle: u32 },

    /// No lock behind this handle.
    #[error("no such lock handle: {handle}")]
    UnknownLock { handle: u32 },

    /// Lock exists but belongs to a different transaction.
    #[error("lock {lock} is not owned by transaction handle {trx}")]
    LockNotOwned { lock: u32, trx: u32 },

    /// Transaction id is already assigned to a live transaction.
    #[error("transaction id {trx_id} is already in use")]
    TransactionIdInUse { trx_id: u64 },

    /// Transaction id is outside the assignable domain.
    #[error("transaction id {trx_id} out of range")]
    TransactionIdOutOfRange { trx_id: u64 },

    /// Operation requires a started transaction.
    #[error("transaction handle {handle} has not started")]
    NotStarted { handle: u32 },

    /// Record lock created without any heap number.
    #[error("record lock needs at least one heap number")]
    EmptyRecordLock,

    /// Heap number beyond the slots a page can hold.
    #[error("heap number {heap_no} exceeds the page maximum {max}")]
    HeapNoOutOfRange { heap_no: u32, max: u32 },

    // === Internal Errors ===
    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl DataLockError {
    /// Whether this error means "the requested row does not exist".
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::MalformedLockId { .. } | Self::UnknownTransaction { .. } | Self::UnknownLock { .. }
        )
    }

    /// Whether the caller can likely fix this without code changes.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidScanRange { .. }
                | Self::MalformedLockId { .. }
                | Self::TransactionIdInUse { .. }
                | Self::TransactionIdOutOfRange { .. }
                | Self::HeapNoOutOfRange { .. }
        )
    }

    /// Create a malformed lock id error.
    pub fn malformed_lock_id(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedLockId {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using `DataLockError`.
pub type Result<T> = std::result::Result<T, DataLockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_malformed_lock_id() {
        let err = DataLockError::malformed_lock_id("12:x", "field 2 is not a number");
        assert_eq!(
            err.to_string(),
            "malformed lock id '12:x': field 2 is not a number"
        );
    }

    #[test]
    fn error_display_scan_range() {
        let err = DataLockError::InvalidScanRange { range: 0 };
        assert_eq!(err.to_string(), "invalid scan range: 0 (must be at least 1)");
    }

    #[test]
    fn error_display_lock_not_owned() {
        let err = DataLockError::LockNotOwned { lock: 4, trx: 9 };
        assert_eq!(
            err.to_string(),
            "lock 4 is not owned by transaction handle 9"
        );
    }

    #[test]
    fn not_found_classification() {
        assert!(DataLockError::malformed_lock_id("", "empty").is_not_found());
        assert!(DataLockError::UnknownLock { handle: 1 }.is_not_found());
        assert!(!DataLockError::InvalidScanRange { range: 0 }.is_not_found());
        assert!(!DataLockError::internal("boom").is_not_found());
    }

    #[test]
    fn user_recoverable() {
        assert!(DataLockError::InvalidScanRange { range: 0 }.is_user_recoverable());
        assert!(DataLockError::TransactionIdInUse { trx_id: 7 }.is_user_recoverable());
        assert!(!DataLockError::EmptyRecordLock.is_user_recoverable());
    }
}
