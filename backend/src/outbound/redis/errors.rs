//! Shared Redis error mapping for adapters.

use bb8_redis::redis::RedisError;
use tracing::debug;

use super::pool::RedisPoolError;

/// Map pool errors into an adapter-specific unavailability constructor.
pub fn map_pool_error<E, U>(error: RedisPoolError, unavailable: U) -> E
where
    U: FnOnce(String) -> E,
{
    let message = match error {
        RedisPoolError::Checkout { message } | RedisPoolError::Build { message } => message,
    };
    unavailable(message)
}

/// Split Redis failures into transport failures and rejected commands.
pub fn map_redis_error<E, U, C>(error: RedisError, unavailable: U, command: C) -> E
where
    U: FnOnce(String) -> E,
    C: FnOnce(String) -> E,
{
    debug!(kind = ?error.kind(), error = %error, "redis operation failed");
    if error.is_io_error() || error.is_connection_dropped() || error.is_timeout() {
        unavailable(error.to_string())
    } else {
        command(error.to_string())
    }
}
