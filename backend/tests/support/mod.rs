//! Shared wiring for integration tests: every port backed by the in-memory
//! store, with a clock pinned inside an open sale window.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use promo_backend::domain::{
    DistributedLock, FlashSaleCoordinator, FlashSaleVoucher, IdAllocator, OrderPersistenceWorker,
    OrderWorkerConfig, OrderWorkerPorts, RetryPolicy, SaleWindow, VoucherId,
};
use promo_backend::test_support::{
    InMemoryOrderQueue, InMemoryOrderRepository, InMemoryStore, MutableClock,
};

pub const VOUCHER: VoucherId = VoucherId::new(10);

pub fn sale_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0)
        .single()
        .expect("valid time")
}

pub struct World {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<MutableClock>,
    pub sale: FlashSaleCoordinator,
}

impl World {
    /// Store and coordinator with the clock five minutes into the sale.
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(MutableClock::new(sale_start() + TimeDelta::minutes(5)));
        let ids = IdAllocator::new(store.clone(), clock.clone());
        let sale = FlashSaleCoordinator::new(store.clone(), ids, clock.clone());
        Self { store, clock, sale }
    }

    /// Publish `VOUCHER` with `stock` units for one hour from `sale_start`.
    pub async fn publish(&self, stock: u32) {
        let window = SaleWindow::new(sale_start(), sale_start() + TimeDelta::hours(1))
            .expect("valid window");
        self.sale
            .publish(&FlashSaleVoucher {
                voucher_id: VOUCHER,
                stock,
                window,
            })
            .await
            .expect("publish succeeds");
    }

    /// Worker consuming the world's stream as `c1` of `g1`.
    pub fn worker(
        &self,
        repository: Arc<InMemoryOrderRepository>,
    ) -> (OrderPersistenceWorker, Arc<InMemoryOrderQueue>) {
        let queue = Arc::new(InMemoryOrderQueue::new(self.store.clone()));
        let worker = OrderPersistenceWorker::new(
            OrderWorkerPorts::new(queue.clone(), repository),
            DistributedLock::new(self.store.clone()),
            fast_worker_config(),
        );
        (worker, queue)
    }
}

pub fn fast_worker_config() -> OrderWorkerConfig {
    OrderWorkerConfig {
        poll_block: Duration::from_millis(20),
        pending_retry_backoff: Duration::from_millis(1),
        lock_lease: Duration::from_secs(10),
        lock_retry: RetryPolicy::once(),
    }
}
