//! Mapping driver errors into migration errors.

use rusqlite::ErrorCode;
use strata_migrate::MigrationError;

/// Result code name for a primary SQLite error code, as matched by the
/// sqlite lock-timeout rule.
pub fn code_name(code: ErrorCode) -> Option<&'static str> {
    Some(match code {
        ErrorCode::DatabaseBusy => "SQLITE_BUSY",
        ErrorCode::DatabaseLocked => "SQLITE_LOCKED",
        ErrorCode::ConstraintViolation => "SQLITE_CONSTRAINT",
        ErrorCode::ReadOnly => "SQLITE_READONLY",
        ErrorCode::CannotOpen => "SQLITE_CANTOPEN",
        ErrorCode::DatabaseCorrupt => "SQLITE_CORRUPT",
        ErrorCode::NotADatabase => "SQLITE_NOTADB",
        ErrorCode::DiskFull => "SQLITE_FULL",
        ErrorCode::SystemIoFailure => "SQLITE_IOERR",
        ErrorCode::PermissionDenied => "SQLITE_PERM",
        ErrorCode::TypeMismatch => "SQLITE_MISMATCH",
        _ => return None,
    })
}

pub(crate) fn from_rusqlite(err: rusqlite::Error) -> MigrationError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message) => {
            let message = message.clone().unwrap_or_else(|| failure.to_string());
            match code_name(failure.code) {
                Some(code) => MigrationError::database_code(code, message),
                None => MigrationError::database_code(failure.extended_code.to_string(), message),
            }
        }
        _ => MigrationError::database(err.to_string()),
    }
}

pub(crate) fn from_driver(err: tokio_rusqlite::Error) -> MigrationError {
    match err {
        tokio_rusqlite::Error::Rusqlite(err) => from_rusqlite(err),
        tokio_rusqlite::Error::ConnectionClosed => {
            MigrationError::database("sqlite connection closed")
        }
        other => MigrationError::database(other.to_string()),
    }
}
