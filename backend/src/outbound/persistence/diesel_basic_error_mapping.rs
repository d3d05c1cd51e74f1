//! Shared Diesel error mapping for repositories with basic query semantics.

use tracing::debug;

use super::pool::PoolError;

/// Map pool errors into a repository-specific connection error constructor.
pub fn map_basic_pool_error<E, C>(error: PoolError, connection: C) -> E
where
    C: FnOnce(String) -> E,
{
    let message = match error {
        PoolError::Checkout { message } | PoolError::Build { message } => message,
    };
    connection(message)
}

/// Map common Diesel error variants into query/connection constructors.
///
/// `NotFound` and query-builder failures map to query errors; a closed
/// connection maps to a connection error.
pub fn map_basic_diesel_error<E, Q, C>(error: diesel::result::Error, query: Q, connection: C) -> E
where
    Q: Fn(&'static str) -> E,
    C: Fn(&'static str) -> E,
{
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(error = %error, "diesel operation failed"),
    }

    match error {
        DieselError::NotFound => query("record not found"),
        DieselError::QueryBuilderError(_) => query("database query error"),
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            connection("database connection error")
        }
        DieselError::DatabaseError(_, _) => query("database error"),
        _ => query("database error"),
    }
}

/// Convert an identifier to the signed `BIGINT` representation.
pub fn to_db_id<E, Q>(value: u64, column: &'static str, query: Q) -> Result<i64, E>
where
    Q: FnOnce(String) -> E,
{
    i64::try_from(value).map_err(|_| query(format!("{column} {value} exceeds BIGINT range")))
}

/// Convert a stored `BIGINT` back to an unsigned identifier.
pub fn from_db_id<E, Q>(value: i64, column: &'static str, query: Q) -> Result<u64, E>
where
    Q: FnOnce(String) -> E,
{
    u64::try_from(value).map_err(|_| query(format!("{column} {value} is negative")))
}
