//! Domain primitives, services and ports.
//!
//! Purpose: hold the concurrency-critical core of the platform (cache
//! coordination, distributed locking, id allocation, flash-sale admission and
//! order persistence) behind ports, so the same services run against Redis and
//! PostgreSQL in production and against in-memory doubles in tests.
//!
//! Public surface:
//! - [`CacheCoordinator`] with its three read policies.
//! - [`DistributedLock`], [`LockGuard`] and [`MultiLock`].
//! - [`IdAllocator`] for time-ordered 64-bit ids.
//! - [`FlashSaleCoordinator`] for atomic purchase admission.
//! - [`OrderPersistenceWorker`] for draining the order stream.
//! - [`ShopCatalogue`] for cached shop reads.
//! - [`Error`] and [`ErrorCode`] for inbound adapters.

pub mod cache;
pub mod error;
pub mod flash_sale;
pub mod id_allocator;
pub mod ids;
pub mod lock;
pub mod order;
pub mod order_worker;
pub mod ports;
pub mod runtime;
pub mod shop;
pub mod shop_catalogue;

pub use self::cache::{
    CacheCoordinator, CacheError, CachePolicyConfig, CacheRuntime, CacheTtl, NoTtlJitter,
    RandomTtlJitter, TtlJitter,
};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::flash_sale::{FlashSaleCoordinator, FlashSaleError, ORDER_ID_PREFIX};
pub use self::id_allocator::{IdAllocator, IdAllocatorError, compose_id};
pub use self::ids::{OrderId, ShopId, UserId, VoucherId};
pub use self::lock::{
    DistributedLock, HolderToken, LockError, LockGuard, MultiLock, MultiLockGuard,
};
pub use self::order::{
    FlashSaleVoucher, MessageId, OrderIntent, OrderIntentDecodeError, OrderStatus, QueueMessage,
    SaleWindow, SaleWindowValidationError, WindowPosition,
};
pub use self::order_worker::{
    MessageOutcome, OrderPersistenceWorker, OrderWorkerConfig, OrderWorkerPorts, WorkerError,
};
pub use self::runtime::{RetryPolicy, Sleeper, TokioSleeper};
pub use self::shop::Shop;
pub use self::shop_catalogue::{ShopCachePolicy, ShopCatalogue, ShopCatalogueError};
