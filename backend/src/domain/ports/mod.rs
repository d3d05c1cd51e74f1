//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod admission_gate;
mod cache_key;
mod key_value_store;
mod order_queue;
mod order_repository;
mod shop_repository;

#[cfg(test)]
pub use admission_gate::MockAdmissionGate;
pub use admission_gate::{AdmissionGate, AdmissionGateError, AdmissionVerdict};
pub use cache_key::{CacheKey, CacheKeyValidationError};
#[cfg(test)]
pub use key_value_store::MockKeyValueStore;
pub use key_value_store::{KeyValueStore, StoreError};
#[cfg(test)]
pub use order_queue::MockOrderQueue;
pub use order_queue::{OrderQueue, OrderQueueError};
#[cfg(test)]
pub use order_repository::MockOrderRepository;
pub use order_repository::{OrderRepository, OrderRepositoryError, PersistOutcome};
#[cfg(test)]
pub use shop_repository::MockShopRepository;
pub use shop_repository::{ShopRepository, ShopRepositoryError};
