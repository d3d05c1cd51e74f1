//! In-memory systems of record for orders and shops.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::ports::{
    OrderRepository, OrderRepositoryError, PersistOutcome, ShopRepository, ShopRepositoryError,
};
use crate::domain::{OrderIntent, Shop, ShopId, UserId, VoucherId};

use super::lock_or_recover;

#[derive(Default)]
struct OrderState {
    stock: HashMap<VoucherId, i64>,
    orders: Vec<OrderIntent>,
    failures_left: u32,
}

/// Order table plus relational stock, written transactionally.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    state: Mutex<OrderState>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed relational stock for `voucher_id`.
    pub fn with_stock(self, voucher_id: VoucherId, stock: i64) -> Self {
        lock_or_recover(&self.state).stock.insert(voucher_id, stock);
        self
    }

    /// Make the next `count` persists fail with a query error.
    pub fn fail_next_persists(&self, count: u32) {
        lock_or_recover(&self.state).failures_left = count;
    }

    /// Persisted orders in insertion order.
    pub fn orders(&self) -> Vec<OrderIntent> {
        lock_or_recover(&self.state).orders.clone()
    }

    /// Relational stock for `voucher_id`.
    pub fn stock(&self, voucher_id: VoucherId) -> Option<i64> {
        lock_or_recover(&self.state).stock.get(&voucher_id).copied()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn exists(
        &self,
        user_id: UserId,
        voucher_id: VoucherId,
    ) -> Result<bool, OrderRepositoryError> {
        Ok(lock_or_recover(&self.state)
            .orders
            .iter()
            .any(|order| order.user_id == user_id && order.voucher_id == voucher_id))
    }

    async fn persist(&self, intent: &OrderIntent) -> Result<PersistOutcome, OrderRepositoryError> {
        let mut state = lock_or_recover(&self.state);
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(OrderRepositoryError::query("injected persist failure"));
        }
        if state.orders.iter().any(|order| {
            order.order_id == intent.order_id
                || (order.user_id == intent.user_id && order.voucher_id == intent.voucher_id)
        }) {
            return Ok(PersistOutcome::AlreadyPersisted);
        }
        match state.stock.get_mut(&intent.voucher_id) {
            Some(stock) if *stock > 0 => *stock -= 1,
            _ => return Ok(PersistOutcome::StockExhausted),
        }
        state.orders.push(intent.clone());
        Ok(PersistOutcome::Persisted)
    }
}

/// Shop table with a lookup counter and optional read latency.
#[derive(Default)]
pub struct InMemoryShopRepository {
    shops: Mutex<HashMap<ShopId, Shop>>,
    lookups: AtomicUsize,
    latency: Option<Duration>,
}

impl InMemoryShopRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every lookup by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, shop: Shop) {
        lock_or_recover(&self.shops).insert(shop.id, shop);
    }

    /// Lookups served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShopRepository for InMemoryShopRepository {
    async fn find_by_id(&self, id: ShopId) -> Result<Option<Shop>, ShopRepositoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(lock_or_recover(&self.shops).get(&id).cloned())
    }

    async fn update(&self, shop: &Shop) -> Result<bool, ShopRepositoryError> {
        let mut shops = lock_or_recover(&self.shops);
        match shops.get_mut(&shop.id) {
            Some(existing) => {
                *existing = shop.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
