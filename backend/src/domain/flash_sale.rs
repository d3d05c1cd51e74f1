//! Flash-sale admission.
//!
//! [`FlashSaleCoordinator::submit`] allocates an order id, then hands the
//! intent to the [`AdmissionGate`], which checks the sale window, stock and
//! the voucher's purchased-set, decrements stock, records the buyer and
//! enqueues the intent as one atomic step. Admission returns as soon as the
//! intent is queued; the order is persisted later by the order worker.

use std::sync::Arc;

use mockable::Clock;
use thiserror::Error;
use tracing::debug;

use crate::domain::ports::{AdmissionGate, AdmissionGateError, AdmissionVerdict};
use crate::domain::{
    FlashSaleVoucher, IdAllocator, IdAllocatorError, OrderId, OrderIntent, UserId, VoucherId,
};

/// Counter prefix used when allocating order ids.
pub const ORDER_ID_PREFIX: &str = "order";

/// Reasons a submission did not produce an order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlashSaleError {
    /// No stock remains.
    #[error("voucher {voucher_id} is sold out")]
    StockExhausted { voucher_id: VoucherId },
    /// The user already bought this voucher.
    #[error("user {user_id} already holds voucher {voucher_id}")]
    DuplicateOrder {
        user_id: UserId,
        voucher_id: VoucherId,
    },
    /// The sale window has not opened.
    #[error("sale for voucher {voucher_id} has not started")]
    SaleNotStarted { voucher_id: VoucherId },
    /// The sale window has closed.
    #[error("sale for voucher {voucher_id} has ended")]
    SaleEnded { voucher_id: VoucherId },
    /// The order id could not be allocated.
    #[error("order id allocation failed: {0}")]
    IdAllocation(#[from] IdAllocatorError),
    /// The admission store failed; the caller may retry.
    #[error(transparent)]
    Unavailable(#[from] AdmissionGateError),
}

impl FlashSaleError {
    /// Whether this is an expected business outcome rather than a failure.
    pub const fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            Self::StockExhausted { .. }
                | Self::DuplicateOrder { .. }
                | Self::SaleNotStarted { .. }
                | Self::SaleEnded { .. }
        )
    }
}

/// Entry point for flash-sale purchases.
#[derive(Clone)]
pub struct FlashSaleCoordinator {
    gate: Arc<dyn AdmissionGate>,
    ids: IdAllocator,
    clock: Arc<dyn Clock>,
}

impl FlashSaleCoordinator {
    /// Build a coordinator over an admission gate.
    pub fn new(gate: Arc<dyn AdmissionGate>, ids: IdAllocator, clock: Arc<dyn Clock>) -> Self {
        Self { gate, ids, clock }
    }

    /// Make `voucher` purchasable, resetting its admission stock.
    pub async fn publish(&self, voucher: &FlashSaleVoucher) -> Result<(), FlashSaleError> {
        self.gate.publish(voucher).await?;
        debug!(
            voucher_id = %voucher.voucher_id,
            stock = voucher.stock,
            "flash-sale voucher published"
        );
        Ok(())
    }

    /// Try to buy one unit of `voucher_id` for an already authenticated
    /// `user_id`.
    ///
    /// An `Ok` order id means the purchase was admitted and queued, not that
    /// it has been persisted.
    pub async fn submit(
        &self,
        voucher_id: VoucherId,
        user_id: UserId,
    ) -> Result<OrderId, FlashSaleError> {
        let order_id = OrderId::new(self.ids.next_id(ORDER_ID_PREFIX).await?);
        let intent = OrderIntent {
            order_id,
            user_id,
            voucher_id,
            created_at: self.clock.utc(),
        };

        match self.gate.try_admit(&intent).await? {
            AdmissionVerdict::Admitted => {
                debug!(%voucher_id, %user_id, %order_id, "purchase admitted");
                Ok(order_id)
            }
            rejected => {
                let err = rejection(rejected, voucher_id, user_id);
                debug!(%voucher_id, %user_id, reason = %err, "purchase rejected");
                Err(err)
            }
        }
    }

    /// Admission stock left for `voucher_id`, `None` when never published.
    pub async fn remaining_stock(
        &self,
        voucher_id: VoucherId,
    ) -> Result<Option<i64>, FlashSaleError> {
        Ok(self.gate.remaining_stock(voucher_id).await?)
    }
}

fn rejection(verdict: AdmissionVerdict, voucher_id: VoucherId, user_id: UserId) -> FlashSaleError {
    match verdict {
        AdmissionVerdict::DuplicateOrder => FlashSaleError::DuplicateOrder {
            user_id,
            voucher_id,
        },
        AdmissionVerdict::NotStarted => FlashSaleError::SaleNotStarted { voucher_id },
        AdmissionVerdict::Ended => FlashSaleError::SaleEnded { voucher_id },
        AdmissionVerdict::StockExhausted | AdmissionVerdict::Admitted => {
            FlashSaleError::StockExhausted { voucher_id }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::MockAdmissionGate;
    use crate::test_support::{InMemoryStore, MutableClock};
    use chrono::{DateTime, TimeZone, Utc};
    use rstest::{fixture, rstest};

    #[fixture]
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0)
            .single()
            .expect("valid time")
    }

    fn coordinator(gate: MockAdmissionGate, now: DateTime<Utc>) -> FlashSaleCoordinator {
        let clock = Arc::new(MutableClock::new(now));
        let ids = IdAllocator::new(Arc::new(InMemoryStore::new()), clock.clone());
        FlashSaleCoordinator::new(Arc::new(gate), ids, clock)
    }

    #[rstest]
    #[tokio::test]
    async fn admitted_intents_carry_a_fresh_order_id_and_the_clock_time(now: DateTime<Utc>) {
        let mut gate = MockAdmissionGate::new();
        gate.expect_try_admit()
            .withf(move |intent| {
                intent.user_id == UserId::new(7)
                    && intent.voucher_id == VoucherId::new(3)
                    && intent.created_at == now
                    && intent.order_id.get() & 0xFFFF_FFFF == 1
            })
            .times(1)
            .returning(|_| Ok(AdmissionVerdict::Admitted));

        let order_id = coordinator(gate, now)
            .submit(VoucherId::new(3), UserId::new(7))
            .await
            .expect("admitted");

        assert_eq!(order_id.get() & 0xFFFF_FFFF, 1);
    }

    #[rstest]
    #[case(AdmissionVerdict::StockExhausted, FlashSaleError::StockExhausted { voucher_id: VoucherId::new(3) })]
    #[case(AdmissionVerdict::DuplicateOrder, FlashSaleError::DuplicateOrder { user_id: UserId::new(7), voucher_id: VoucherId::new(3) })]
    #[case(AdmissionVerdict::NotStarted, FlashSaleError::SaleNotStarted { voucher_id: VoucherId::new(3) })]
    #[case(AdmissionVerdict::Ended, FlashSaleError::SaleEnded { voucher_id: VoucherId::new(3) })]
    #[tokio::test]
    async fn rejections_are_business_outcomes(
        now: DateTime<Utc>,
        #[case] verdict: AdmissionVerdict,
        #[case] expected: FlashSaleError,
    ) {
        let mut gate = MockAdmissionGate::new();
        gate.expect_try_admit().returning(move |_| Ok(verdict));

        let err = coordinator(gate, now)
            .submit(VoucherId::new(3), UserId::new(7))
            .await
            .expect_err("rejected");

        assert_eq!(err, expected);
        assert!(err.is_business_rejection());
    }

    #[rstest]
    #[tokio::test]
    async fn store_failures_are_transient_not_rejections(now: DateTime<Utc>) {
        let mut gate = MockAdmissionGate::new();
        gate.expect_try_admit()
            .returning(|_| Err(AdmissionGateError::unavailable("connection reset")));

        let err = coordinator(gate, now)
            .submit(VoucherId::new(3), UserId::new(7))
            .await
            .expect_err("store down");

        assert!(matches!(err, FlashSaleError::Unavailable(_)));
        assert!(!err.is_business_rejection());
    }
}
