//! Port for the atomic flash-sale admission script.
use async_trait::async_trait;

use crate::domain::{FlashSaleVoucher, OrderIntent, VoucherId};

use super::define_port_error;

define_port_error! {
    /// Errors raised while talking to the admission store.
    ///
    /// These are transport failures and never business rejections.
    pub enum AdmissionGateError {
        /// Store is unreachable.
        Unavailable { message: String } => "admission store unavailable: {message}",
        /// Script failed or returned a code outside the protocol.
        Script { message: String } => "admission script failed: {message}",
    }
}

/// Result of one admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionVerdict {
    /// Stock was decremented, the user was recorded, and the intent queued.
    Admitted,
    /// No stock left (or no stock was ever published).
    StockExhausted,
    /// The user already holds a unit of this voucher.
    DuplicateOrder,
    /// The intent predates the sale window.
    NotStarted,
    /// The intent is at or after the end of the sale window.
    Ended,
}

impl AdmissionVerdict {
    /// Integer code returned by the admission script.
    pub const fn code(self) -> i64 {
        match self {
            Self::Admitted => 0,
            Self::StockExhausted => 1,
            Self::DuplicateOrder => 2,
            Self::NotStarted => 3,
            Self::Ended => 4,
        }
    }

    /// Decode a script return code.
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Admitted),
            1 => Some(Self::StockExhausted),
            2 => Some(Self::DuplicateOrder),
            3 => Some(Self::NotStarted),
            4 => Some(Self::Ended),
            _ => None,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdmissionGate: Send + Sync {
    /// Publish (or republish) the stock and sale window for a voucher.
    ///
    /// Republishing resets the stock counter but keeps the purchased-set, so a
    /// user who already bought cannot buy again after a restock.
    async fn publish(&self, voucher: &FlashSaleVoucher) -> Result<(), AdmissionGateError>;

    /// Check the sale window, stock and purchased-set, then decrement stock,
    /// record the user and enqueue `intent`, all in one atomic step.
    async fn try_admit(&self, intent: &OrderIntent) -> Result<AdmissionVerdict, AdmissionGateError>;

    /// Read the remaining admission stock, `None` when never published.
    async fn remaining_stock(
        &self,
        voucher_id: VoucherId,
    ) -> Result<Option<i64>, AdmissionGateError>;
}

#[cfg(test)]
mod tests {
    use super::AdmissionVerdict;
    use rstest::rstest;

    #[rstest]
    #[case(AdmissionVerdict::Admitted)]
    #[case(AdmissionVerdict::StockExhausted)]
    #[case(AdmissionVerdict::DuplicateOrder)]
    #[case(AdmissionVerdict::NotStarted)]
    #[case(AdmissionVerdict::Ended)]
    fn script_codes_are_stable(#[case] verdict: AdmissionVerdict) {
        assert_eq!(AdmissionVerdict::from_code(verdict.code()), Some(verdict));
    }

    #[rstest]
    fn unknown_codes_are_rejected() {
        assert_eq!(AdmissionVerdict::from_code(-1), None);
        assert_eq!(AdmissionVerdict::from_code(5), None);
    }
}
