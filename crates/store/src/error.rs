use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row that must exist was not found.
    #[error("{table} row not found: {id}")]
    NotFound { table: &'static str, id: String },

    /// A row was written in a transaction that does not hold its lock.
    #[error("{table} row {id} is not locked by this transaction")]
    RowNotLocked { table: &'static str, id: String },

    /// A row with the same key already exists.
    #[error("Duplicate {table} row: {id}")]
    Duplicate { table: &'static str, id: String },

    /// Waiting for a row lock exceeded the configured lock timeout.
    #[error("Timed out waiting for a row lock")]
    LockTimeout,

    /// A stored value could not be mapped back to the domain vocabulary.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// The backing store refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub(crate) fn not_found(table: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            table,
            id: id.to_string(),
        }
    }

    pub(crate) fn not_locked(table: &'static str, id: impl ToString) -> Self {
        StoreError::RowNotLocked {
            table,
            id: id.to_string(),
        }
    }
}

impl From<common::ParseEnumError> for StoreError {
    fn from(e: common::ParseEnumError) -> Self {
        StoreError::CorruptRow(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
