//! Error types for SQLite migration operations.
//!
//! Provides a unified error type covering database access, lock-retry
//! exhaustion, schema mismatches, registry misuse, and connection failures.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while executing change plans.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// The database stayed locked for longer than the retry timeout.
    #[error("database still locked after {elapsed:?} (timeout {timeout:?}): {last_error}")]
    Timeout {
        elapsed: Duration,
        timeout: Duration,
        last_error: rusqlite::Error,
    },

    /// An existing table lacks a column the entity expects.
    #[error("schema mismatch on table '{table}': {reason}")]
    SchemaMismatch { table: String, reason: String },

    /// An insert statement affected no rows.
    #[error("insert into '{0}' affected no rows")]
    NoRowsInserted(String),

    /// A plan was looked up that was never registered.
    #[error("no change plan registered for {0}")]
    PlanNotFound(String),

    /// A plan with the same key is already registered.
    #[error("change plan already registered for {0}")]
    DuplicatePlan(String),

    /// An entity plan was added to a version plan for a different version.
    #[error("change plan {plan} does not target version {version}")]
    PlanVersionMismatch { plan: String, version: String },

    /// The operation does not exist for the active strategy kind.
    #[error("{operation} is not supported by the {strategy} strategy")]
    Unsupported {
        operation: &'static str,
        strategy: &'static str,
    },

    /// A plan was asked to run in a direction it has no hook for.
    #[error("change plan {plan} does not support {direction}")]
    DirectionUnsupported {
        plan: String,
        direction: &'static str,
    },

    /// The post-migration verification policy failed.
    #[error("verification failed for {plan}: table '{table}' does not exist")]
    VerificationFailed { plan: String, table: String },

    /// Opening the database failed.
    #[error("failed opening database '{}': {source}", path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Catalog lookup or mode validation failure.
    #[error("catalog error: {0}")]
    CatalogError(#[from] schema_tick_core::CatalogError),

    /// The async worker running a blocking operation failed.
    #[cfg(feature = "async")]
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

impl SqliteError {
    /// Returns `true` for errors that indicate the database is transiently
    /// busy or locked.
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::DatabaseError(e) if is_locked_error(e))
    }
}

/// Returns `true` if a rusqlite error is SQLITE_BUSY or SQLITE_LOCKED.
pub(crate) fn is_locked_error(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn test_busy_and_locked_are_retryable() {
        assert!(is_locked_error(&sqlite_failure(rusqlite::ffi::SQLITE_BUSY)));
        assert!(is_locked_error(&sqlite_failure(rusqlite::ffi::SQLITE_LOCKED)));
        assert!(!is_locked_error(&sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT)));
        assert!(!is_locked_error(&rusqlite::Error::QueryReturnedNoRows));
    }

    #[test]
    fn test_is_locked_on_wrapped_error() {
        let err = SqliteError::from(sqlite_failure(rusqlite::ffi::SQLITE_BUSY));
        assert!(err.is_locked());
        assert!(!SqliteError::NoRowsInserted("t".into()).is_locked());
    }
}
