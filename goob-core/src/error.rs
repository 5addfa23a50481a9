// ABOUTME: Typed errors for the durable store.
// ABOUTME: Separates transient SQLite contention from permanent failures so writes can be retried.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLITE_BUSY or SQLITE_LOCKED; another connection holds the write lock
    #[error("database is busy: {0}")]
    Busy(#[source] rusqlite::Error),

    #[error("database error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    #[error("snapshot serialization failed: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("store connection mutex poisoned")]
    Poisoned,

    #[error("max retries exceeded after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// Whether retrying the same operation could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Busy(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(sqlite_err, _) = &err {
            if matches!(
                sqlite_err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) {
                return StoreError::Busy(err);
            }
        }
        StoreError::Sqlite(err)
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;

    fn sqlite_failure(code: std::os::raw::c_int) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), None)
    }

    #[test]
    fn test_busy_and_locked_are_transient() {
        assert!(StoreError::from(sqlite_failure(ffi::SQLITE_BUSY)).is_transient());
        assert!(StoreError::from(sqlite_failure(ffi::SQLITE_LOCKED)).is_transient());
    }

    #[test]
    fn test_constraint_violation_is_permanent() {
        let err = StoreError::from(sqlite_failure(ffi::SQLITE_CONSTRAINT));
        assert!(!err.is_transient());
        assert!(matches!(err, StoreError::Sqlite(_)));
    }

    #[test]
    fn test_no_rows_is_permanent() {
        assert!(!StoreError::from(rusqlite::Error::QueryReturnedNoRows).is_transient());
    }
}
