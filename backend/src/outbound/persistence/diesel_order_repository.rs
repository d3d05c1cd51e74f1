//! PostgreSQL-backed `OrderRepository` implementation using Diesel ORM.
//!
//! Persisting an order and decrementing the authoritative stock happen in one
//! transaction. The unique constraints on `voucher_orders` make replays of the
//! same intent insert nothing, which keeps the worker idempotent.

use async_trait::async_trait;
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::debug;

use crate::domain::ports::{OrderRepository, OrderRepositoryError, PersistOutcome};
use crate::domain::{OrderIntent, OrderStatus, UserId, VoucherId};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error, to_db_id};
use super::models::NewVoucherOrderRow;
use super::pool::{DbPool, PoolError};
use super::schema::{seckill_vouchers, voucher_orders};

/// Diesel-backed implementation of the `OrderRepository` port.
#[derive(Clone)]
pub struct DieselOrderRepository {
    pool: DbPool,
}

impl DieselOrderRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> OrderRepositoryError {
    map_basic_pool_error(error, OrderRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> OrderRepositoryError {
    map_basic_diesel_error(
        error,
        OrderRepositoryError::query,
        OrderRepositoryError::connection,
    )
}

fn db_id(value: u64, column: &'static str) -> Result<i64, OrderRepositoryError> {
    to_db_id(value, column, OrderRepositoryError::query)
}

/// Ways the persistence transaction ends without committing.
#[derive(Debug)]
enum Aborted {
    Database(diesel::result::Error),
    StockExhausted,
}

impl From<diesel::result::Error> for Aborted {
    fn from(error: diesel::result::Error) -> Self {
        Self::Database(error)
    }
}

#[async_trait]
impl OrderRepository for DieselOrderRepository {
    async fn exists(
        &self,
        user_id: UserId,
        voucher_id: VoucherId,
    ) -> Result<bool, OrderRepositoryError> {
        let user = db_id(user_id.get(), "user_id")?;
        let voucher = db_id(voucher_id.get(), "voucher_id")?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        diesel::select(exists(
            voucher_orders::table
                .filter(voucher_orders::user_id.eq(user))
                .filter(voucher_orders::voucher_id.eq(voucher)),
        ))
        .get_result(&mut conn)
        .await
        .map_err(map_diesel_error)
    }

    async fn persist(&self, intent: &OrderIntent) -> Result<PersistOutcome, OrderRepositoryError> {
        let row = NewVoucherOrderRow {
            id: db_id(intent.order_id.get(), "id")?,
            user_id: db_id(intent.user_id.get(), "user_id")?,
            voucher_id: db_id(intent.voucher_id.get(), "voucher_id")?,
            status: OrderStatus::Persisted.as_str(),
            create_time: intent.created_at,
        };
        let voucher = row.voucher_id;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let result = conn
            .transaction::<_, Aborted, _>(|conn| {
                async move {
                    let inserted = diesel::insert_into(voucher_orders::table)
                        .values(&row)
                        .on_conflict_do_nothing()
                        .execute(conn)
                        .await?;
                    if inserted == 0 {
                        return Ok(PersistOutcome::AlreadyPersisted);
                    }

                    let decremented = diesel::update(
                        seckill_vouchers::table
                            .filter(seckill_vouchers::voucher_id.eq(voucher))
                            .filter(seckill_vouchers::stock.gt(0)),
                    )
                    .set(seckill_vouchers::stock.eq(seckill_vouchers::stock - 1))
                    .execute(conn)
                    .await?;
                    if decremented == 0 {
                        return Err(Aborted::StockExhausted);
                    }
                    Ok(PersistOutcome::Persisted)
                }
                .scope_boxed()
            })
            .await;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(Aborted::StockExhausted) => {
                debug!(
                    order_id = %intent.order_id,
                    voucher_id = %intent.voucher_id,
                    "authoritative stock exhausted, order rolled back"
                );
                Ok(PersistOutcome::StockExhausted)
            }
            Err(Aborted::Database(error)) => Err(map_diesel_error(error)),
        }
    }
}
