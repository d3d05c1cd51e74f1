//! PostgreSQL-backed `ShopRepository` implementation using Diesel ORM.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use mockable::Clock;
use std::sync::Arc;

use crate::domain::ports::{ShopRepository, ShopRepositoryError};
use crate::domain::{Shop, ShopId};

use super::diesel_basic_error_mapping::{
    from_db_id, map_basic_diesel_error, map_basic_pool_error, to_db_id,
};
use super::models::{ShopRow, ShopUpdate};
use super::pool::{DbPool, PoolError};
use super::schema::shops;

/// Diesel-backed implementation of the `ShopRepository` port.
#[derive(Clone)]
pub struct DieselShopRepository {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl DieselShopRepository {
    /// Create a repository stamping updates with `clock`.
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

fn map_pool_error(error: PoolError) -> ShopRepositoryError {
    map_basic_pool_error(error, ShopRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> ShopRepositoryError {
    map_basic_diesel_error(
        error,
        ShopRepositoryError::query,
        ShopRepositoryError::connection,
    )
}

fn row_to_shop(row: ShopRow) -> Result<Shop, ShopRepositoryError> {
    Ok(Shop {
        id: ShopId::new(from_db_id(row.id, "id", ShopRepositoryError::query)?),
        name: row.name,
        type_id: from_db_id(row.type_id, "type_id", ShopRepositoryError::query)?,
        area: row.area,
        address: row.address,
        avg_price: row.avg_price,
        score: row.score,
    })
}

#[async_trait]
impl ShopRepository for DieselShopRepository {
    async fn find_by_id(&self, id: ShopId) -> Result<Option<Shop>, ShopRepositoryError> {
        let key = to_db_id(id.get(), "id", ShopRepositoryError::query)?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<ShopRow> = shops::table
            .find(key)
            .select(ShopRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        row.map(row_to_shop).transpose()
    }

    async fn update(&self, shop: &Shop) -> Result<bool, ShopRepositoryError> {
        let key = to_db_id(shop.id.get(), "id", ShopRepositoryError::query)?;
        let changes = ShopUpdate {
            name: &shop.name,
            type_id: to_db_id(shop.type_id, "type_id", ShopRepositoryError::query)?,
            area: shop.area.as_deref(),
            address: &shop.address,
            avg_price: shop.avg_price,
            score: shop.score,
            updated_at: self.clock.utc(),
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let updated = diesel::update(shops::table.find(key))
            .set(&changes)
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(updated > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn row(type_id: i64) -> ShopRow {
        ShopRow {
            id: 1,
            name: "Tea House".to_owned(),
            type_id,
            area: Some("Old Town".to_owned()),
            address: "1 Market Street".to_owned(),
            avg_price: None,
            score: 47,
        }
    }

    #[rstest]
    fn rows_convert_to_shops() {
        let shop = row_to_shop(row(3)).expect("valid row");
        assert_eq!(shop.id, ShopId::new(1));
        assert_eq!(shop.type_id, 3);
        assert_eq!(shop.area.as_deref(), Some("Old Town"));
    }

    #[rstest]
    fn negative_columns_are_query_errors() {
        let err = row_to_shop(row(-3)).expect_err("negative type id");
        assert!(matches!(err, ShopRepositoryError::Query { .. }));
    }
}
