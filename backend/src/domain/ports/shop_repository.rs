//! Port for reading and updating shops in the system of record.
use async_trait::async_trait;

use crate::domain::{Shop, ShopId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by shop repository adapters.
    pub enum ShopRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "shop repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "shop repository query failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ShopRepository: Send + Sync {
    /// Load a shop; `None` when the id is unknown.
    async fn find_by_id(&self, id: ShopId) -> Result<Option<Shop>, ShopRepositoryError>;

    /// Overwrite a shop. Returns `false` when no row matched.
    async fn update(&self, shop: &Shop) -> Result<bool, ShopRepositoryError>;
}
