//! Storage error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    /// The database rejected or could not run a statement. Callers may retry.
    #[error("storage failure: {0}")]
    TransientStorageFailure(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    /// A stored row does not map back onto a typed record.
    #[error("corrupt {table} row: {reason}")]
    CorruptRow { table: &'static str, reason: String },
    #[error("persistence synchronizer is closed")]
    SynchronizerClosed,
}

impl PersistError {
    pub(crate) fn corrupt(table: &'static str, reason: impl Into<String>) -> Self {
        PersistError::CorruptRow {
            table,
            reason: reason.into(),
        }
    }
}
