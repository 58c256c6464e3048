use thiserror::Error;

/// Structured failures surfaced by the storage layer. Errors propagate
/// directly to the caller; this layer never retries a statement.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The targeted row does not exist. Absence on a plain lookup is an
    /// `Ok(None)`, not this error.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness or referential-integrity rule rejected the write.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// A successful write could not be read back fully hydrated, or a stored
    /// value failed to decode. Signals a defect, never a recoverable state.
    #[error("integrity fault: {0}")]
    Integrity(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Classify a rusqlite failure coming out of a write: SQLite constraint
    /// errors (unique, foreign key) become `ConstraintViolation`, anything
    /// else passes through as `Storage`.
    pub(crate) fn from_write(err: rusqlite::Error, context: &str) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => {
                StoreError::ConstraintViolation(format!("{context}: {err}"))
            }
            _ => StoreError::Storage(err),
        }
    }
}
