//! Conversions from external infrastructure errors into domain errors.

use punchclock_domain::TimeclockError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can
/// be converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub TimeclockError);

impl From<InfraError> for TimeclockError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<TimeclockError> for InfraError {
    fn from(value: TimeclockError) -> Self {
        InfraError(value)
    }
}

/// SQLite extended result code for a unique-index violation.
pub const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

/// True when the error is a unique-constraint violation, the signal the
/// conditional inserts translate into their domain rejection.
pub fn is_unique_violation(err: &SqlError) -> bool {
    matches!(
        err,
        SqlError::SqliteFailure(failure, _) if failure.extended_code == SQLITE_CONSTRAINT_UNIQUE
    )
}

/// True when the error is transient lock contention worth one retry at the
/// transaction boundary.
pub fn is_busy(err: &SqlError) -> bool {
    use rusqlite::ffi::ErrorCode;
    matches!(
        err,
        SqlError::SqliteFailure(failure, _)
            if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Extension trait to make the conversion logic explicit in tests and
/// within this module.
trait IntoTimeclockError {
    fn into_timeclock(self) -> TimeclockError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → TimeclockError */
/* -------------------------------------------------------------------------- */

impl IntoTimeclockError for SqlError {
    fn into_timeclock(self) -> TimeclockError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        TimeclockError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        TimeclockError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, SQLITE_CONSTRAINT_UNIQUE) => {
                        TimeclockError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        TimeclockError::Database("foreign key constraint violation".into())
                    }
                    _ => TimeclockError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => TimeclockError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                TimeclockError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                TimeclockError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => {
                TimeclockError::Database("invalid UTF-8 returned from sqlite".into())
            }
            RE::InvalidQuery => TimeclockError::Database("invalid SQL query".into()),
            other => TimeclockError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_timeclock())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → TimeclockError */
/* -------------------------------------------------------------------------- */

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(TimeclockError::Database(format!("connection pool error: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → TimeclockError */
/* -------------------------------------------------------------------------- */

impl IntoTimeclockError for HttpError {
    fn into_timeclock(self) -> TimeclockError {
        if self.is_timeout() {
            return TimeclockError::Network("HTTP request timed out".into());
        }
        if self.is_connect() {
            return TimeclockError::Network("HTTP connection failed".into());
        }
        if let Some(status) = self.status() {
            return TimeclockError::Network(format!("HTTP status {status}"));
        }
        TimeclockError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_timeclock())
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json::Error → TimeclockError */
/* -------------------------------------------------------------------------- */

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(TimeclockError::Internal(format!("serialization failed: {value}")))
    }
}
