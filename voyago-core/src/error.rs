/// Error surface shared by every repository implementation.
///
/// Callers in the booking layer need to tell "the row is gone" and "the
/// guarded update lost" apart from plain I/O failure, so this is a closed
/// enum rather than a boxed error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A guarded conditional update matched no row (capacity exhausted,
    /// coupon spent, overlapping room hold).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn database(err: impl std::fmt::Display) -> Self {
        StoreError::Database(err.to_string())
    }
}
