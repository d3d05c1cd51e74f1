//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::schema::{shops, voucher_orders};

/// Insertable struct for a persisted order.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = voucher_orders)]
pub(crate) struct NewVoucherOrderRow<'a> {
    pub id: i64,
    pub user_id: i64,
    pub voucher_id: i64,
    pub status: &'a str,
    pub create_time: DateTime<Utc>,
}

/// Row struct for reading from the shops table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = shops)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ShopRow {
    pub id: i64,
    pub name: String,
    pub type_id: i64,
    pub area: Option<String>,
    pub address: String,
    pub avg_price: Option<i64>,
    pub score: i32,
}

/// Changeset struct for updating a shop.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = shops)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct ShopUpdate<'a> {
    pub name: &'a str,
    pub type_id: i64,
    pub area: Option<&'a str>,
    pub address: &'a str,
    pub avg_price: Option<i64>,
    pub score: i32,
    pub updated_at: DateTime<Utc>,
}
