//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! The relational database is the system of record for orders, voucher stock
//! and shops. Repository implementations only translate between Diesel rows
//! and domain types; row structs (`models.rs`) and table definitions
//! (`schema.rs`) never leave this module.
//!
//! # Example
//!
//! ```no_run
//! use promo_backend::outbound::persistence::{DbPool, DieselOrderRepository, PoolConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/promo")).await?;
//! let repo = DieselOrderRepository::new(pool);
//! # let _ = repo;
//! # Ok(())
//! # }
//! ```

mod diesel_basic_error_mapping;
mod diesel_order_repository;
mod diesel_shop_repository;
mod models;
mod pool;
mod schema;

pub use diesel_order_repository::DieselOrderRepository;
pub use diesel_shop_repository::DieselShopRepository;
pub use pool::{DbPool, PoolConfig, PoolError};
