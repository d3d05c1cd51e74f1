//! Redis implementation of the [`AdmissionGate`] port.
//!
//! Admission runs as one Lua script, so Redis executes the window check, stock
//! check, duplicate check, decrement, buyer record and stream append without
//! interleaving any other client's commands.
//!
//! Keys per voucher:
//!
//! - `seckill:stock:{voucher}`: remaining admission stock.
//! - `seckill:order:{voucher}`: set of users who bought the voucher.
//! - `seckill:window:{voucher}`: hash with `begin` and `end` in epoch millis.

use async_trait::async_trait;
use bb8_redis::redis::{self, RedisError};
use tracing::debug;

use crate::domain::ports::{AdmissionGate, AdmissionGateError, AdmissionVerdict};
use crate::domain::{FlashSaleVoucher, OrderIntent, VoucherId};

use super::errors::{map_pool_error, map_redis_error};
use super::pool::RedisPool;

/// Namespace prefix for remaining stock counters.
pub const STOCK_KEY_PREFIX: &str = "seckill:stock:";
/// Namespace prefix for per-voucher buyer sets.
pub const BUYERS_KEY_PREFIX: &str = "seckill:order:";
/// Namespace prefix for per-voucher sale windows.
pub const WINDOW_KEY_PREFIX: &str = "seckill:window:";

// Return codes match `AdmissionVerdict::code`. Stream field names match
// `domain::order::fields`.
const ADMISSION_SCRIPT: &str = r"
local now = tonumber(ARGV[4])
local window = redis.call('HMGET', KEYS[3], 'begin', 'end')
if window[1] and now < tonumber(window[1]) then
    return 3
end
if window[2] and now >= tonumber(window[2]) then
    return 4
end
local raw = redis.call('GET', KEYS[1])
if not raw or tonumber(raw) <= 0 then
    return 1
end
if redis.call('SISMEMBER', KEYS[2], ARGV[1]) == 1 then
    return 2
end
redis.call('DECR', KEYS[1])
redis.call('SADD', KEYS[2], ARGV[1])
redis.call('XADD', KEYS[4], '*', 'id', ARGV[3], 'userId', ARGV[1], 'voucherId', ARGV[2], 'createdAt', ARGV[4])
return 0
";

pub fn stock_key(voucher_id: VoucherId) -> String {
    format!("{STOCK_KEY_PREFIX}{voucher_id}")
}

pub fn buyers_key(voucher_id: VoucherId) -> String {
    format!("{BUYERS_KEY_PREFIX}{voucher_id}")
}

pub fn window_key(voucher_id: VoucherId) -> String {
    format!("{WINDOW_KEY_PREFIX}{voucher_id}")
}

/// Admission gate appending admitted intents to one order stream.
#[derive(Clone)]
pub struct RedisAdmissionGate {
    pool: RedisPool,
    stream_key: String,
}

impl RedisAdmissionGate {
    /// Create a gate appending to `stream_key`.
    pub fn new(pool: RedisPool, stream_key: impl Into<String>) -> Self {
        Self {
            pool,
            stream_key: stream_key.into(),
        }
    }
}

fn map_error(error: RedisError) -> AdmissionGateError {
    map_redis_error(
        error,
        AdmissionGateError::unavailable,
        AdmissionGateError::script,
    )
}

#[async_trait]
impl AdmissionGate for RedisAdmissionGate {
    async fn publish(&self, voucher: &FlashSaleVoucher) -> Result<(), AdmissionGateError> {
        let id = voucher.voucher_id;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| map_pool_error(err, AdmissionGateError::unavailable))?;

        let () = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(stock_key(id))
            .arg(voucher.stock)
            .ignore()
            .cmd("HSET")
            .arg(window_key(id))
            .arg("begin")
            .arg(voucher.window.begin().timestamp_millis())
            .arg("end")
            .arg(voucher.window.end().timestamp_millis())
            .ignore()
            .query_async(&mut *conn)
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn try_admit(&self, intent: &OrderIntent) -> Result<AdmissionVerdict, AdmissionGateError> {
        let voucher_id = intent.voucher_id;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| map_pool_error(err, AdmissionGateError::unavailable))?;

        let code: i64 = redis::cmd("EVAL")
            .arg(ADMISSION_SCRIPT)
            .arg(4)
            .arg(stock_key(voucher_id))
            .arg(buyers_key(voucher_id))
            .arg(window_key(voucher_id))
            .arg(&self.stream_key)
            .arg(intent.user_id.get())
            .arg(voucher_id.get())
            .arg(intent.order_id.get())
            .arg(intent.created_at.timestamp_millis())
            .query_async(&mut *conn)
            .await
            .map_err(map_error)?;

        debug!(%voucher_id, user_id = %intent.user_id, code, "admission script returned");
        AdmissionVerdict::from_code(code).ok_or_else(|| {
            AdmissionGateError::script(format!("admission script returned unknown code {code}"))
        })
    }

    async fn remaining_stock(
        &self,
        voucher_id: VoucherId,
    ) -> Result<Option<i64>, AdmissionGateError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| map_pool_error(err, AdmissionGateError::unavailable))?;
        redis::cmd("GET")
            .arg(stock_key(voucher_id))
            .query_async(&mut *conn)
            .await
            .map_err(map_error)
    }
}
