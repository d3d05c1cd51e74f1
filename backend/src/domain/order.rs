//! Order intents, queue messages, and the flash-sale voucher model.
//!
//! An [`OrderIntent`] is created by the admission gate and travels through
//! the durable order stream as a flat list of string fields. The field names
//! in [`fields`] are shared by every encoder of that stream, including the
//! admission script, so they must not drift.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{OrderId, UserId, VoucherId};

/// Stream field names for an encoded [`OrderIntent`].
pub mod fields {
    /// Pre-allocated order identifier.
    pub const ORDER_ID: &str = "id";
    /// Purchasing user.
    pub const USER_ID: &str = "userId";
    /// Purchased voucher.
    pub const VOUCHER_ID: &str = "voucherId";
    /// Admission time in milliseconds since the Unix epoch.
    pub const CREATED_AT: &str = "createdAt";
}

/// Lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Admitted and queued, not yet written to the system of record.
    Pending,
    /// Written to the system of record.
    Persisted,
}

impl OrderStatus {
    /// Stable storage representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Persisted => "persisted",
        }
    }
}

/// A purchase admitted by the flash-sale gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderIntent {
    /// Order id allocated before admission.
    pub order_id: OrderId,
    /// Purchasing user, passed explicitly rather than read from request scope.
    pub user_id: UserId,
    /// Purchased voucher.
    pub voucher_id: VoucherId,
    /// Admission time; also the instant the sale window is checked against.
    pub created_at: DateTime<Utc>,
}

/// Errors raised when a stream entry cannot be decoded into an intent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderIntentDecodeError {
    /// A required field was absent.
    #[error("order intent field `{field}` is missing")]
    MissingField {
        /// Name of the absent field.
        field: &'static str,
    },
    /// A field was present but not parseable.
    #[error("order intent field `{field}` is invalid: {value}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Raw value found in the entry.
        value: String,
    },
}

impl OrderIntent {
    /// Encode the intent as stream field/value pairs.
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            (fields::ORDER_ID, self.order_id.to_string()),
            (fields::USER_ID, self.user_id.to_string()),
            (fields::VOUCHER_ID, self.voucher_id.to_string()),
            (
                fields::CREATED_AT,
                self.created_at.timestamp_millis().to_string(),
            ),
        ]
    }

    /// Decode an intent from stream field/value pairs.
    ///
    /// Unknown fields are ignored so producers may add metadata without
    /// breaking older consumers.
    ///
    /// # Examples
    /// ```
    /// use promo_backend::domain::OrderIntent;
    ///
    /// let intent = OrderIntent::from_fields([
    ///     ("id".to_owned(), "9".to_owned()),
    ///     ("userId".to_owned(), "3".to_owned()),
    ///     ("voucherId".to_owned(), "5".to_owned()),
    ///     ("createdAt".to_owned(), "1700000000000".to_owned()),
    /// ])
    /// .expect("complete entry");
    /// assert_eq!(intent.order_id.get(), 9);
    /// ```
    pub fn from_fields(
        entry: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, OrderIntentDecodeError> {
        let values: HashMap<String, String> = entry.into_iter().collect();
        let order_id = parse_field(&values, fields::ORDER_ID)?;
        let user_id = parse_field(&values, fields::USER_ID)?;
        let voucher_id = parse_field(&values, fields::VOUCHER_ID)?;
        let created_millis: i64 = parse_field(&values, fields::CREATED_AT)?;
        let created_at = Utc
            .timestamp_millis_opt(created_millis)
            .single()
            .ok_or_else(|| OrderIntentDecodeError::InvalidField {
                field: fields::CREATED_AT,
                value: created_millis.to_string(),
            })?;

        Ok(Self {
            order_id: OrderId::new(order_id),
            user_id: UserId::new(user_id),
            voucher_id: VoucherId::new(voucher_id),
            created_at,
        })
    }
}

fn parse_field<T: std::str::FromStr>(
    values: &HashMap<String, String>,
    field: &'static str,
) -> Result<T, OrderIntentDecodeError> {
    let raw = values
        .get(field)
        .ok_or(OrderIntentDecodeError::MissingField { field })?;
    raw.parse().map_err(|_| OrderIntentDecodeError::InvalidField {
        field,
        value: raw.clone(),
    })
}

/// Identifier assigned to a stream entry by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(String);

impl MessageId {
    /// Wrap a queue-assigned identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An intent as delivered by the durable queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Queue offset, used for acknowledgement.
    pub id: MessageId,
    /// Decoded payload.
    pub intent: OrderIntent,
}

/// Half-open interval `[begin, end)` during which a voucher is on sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleWindow {
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Validation error for [`SaleWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sale window must end after it begins")]
pub struct SaleWindowValidationError;

/// Position of an instant relative to a sale window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPosition {
    /// The sale has not started yet.
    Before,
    /// The sale is running.
    Open,
    /// The sale is over.
    After,
}

impl SaleWindow {
    /// Build a window, rejecting empty or inverted intervals.
    pub fn new(
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, SaleWindowValidationError> {
        if end <= begin {
            return Err(SaleWindowValidationError);
        }
        Ok(Self { begin, end })
    }

    /// Start of the sale (inclusive).
    pub const fn begin(&self) -> DateTime<Utc> {
        self.begin
    }

    /// End of the sale (exclusive).
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Classify `now` against the window.
    pub fn position(&self, now: DateTime<Utc>) -> WindowPosition {
        if now < self.begin {
            WindowPosition::Before
        } else if now >= self.end {
            WindowPosition::After
        } else {
            WindowPosition::Open
        }
    }
}

/// Admission state published for a limited-stock voucher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashSaleVoucher {
    /// Voucher being sold.
    pub voucher_id: VoucherId,
    /// Units available to the admission gate.
    pub stock: u32,
    /// Period during which purchases are admitted.
    pub window: SaleWindow,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::{fixture, rstest};

    #[fixture]
    fn intent() -> OrderIntent {
        OrderIntent {
            order_id: OrderId::new(11),
            user_id: UserId::new(22),
            voucher_id: VoucherId::new(33),
            created_at: Utc
                .timestamp_millis_opt(1_700_000_000_123)
                .single()
                .expect("valid timestamp"),
        }
    }

    fn owned(pairs: Vec<(&'static str, String)>) -> Vec<(String, String)> {
        pairs
            .into_iter()
            .map(|(field, value)| (field.to_owned(), value))
            .collect()
    }

    #[rstest]
    fn encoded_fields_decode_to_the_same_intent(intent: OrderIntent) {
        let decoded = OrderIntent::from_fields(owned(intent.to_fields())).expect("decodes");
        assert_eq!(decoded, intent);
    }

    #[rstest]
    fn decoding_reports_the_missing_field(intent: OrderIntent) {
        let mut pairs = owned(intent.to_fields());
        pairs.retain(|(field, _)| field != fields::USER_ID);
        let err = OrderIntent::from_fields(pairs).expect_err("userId missing");
        assert_eq!(
            err,
            OrderIntentDecodeError::MissingField {
                field: fields::USER_ID
            }
        );
    }

    #[rstest]
    fn decoding_rejects_non_numeric_ids(intent: OrderIntent) {
        let mut pairs = owned(intent.to_fields());
        for (field, value) in &mut pairs {
            if field == fields::VOUCHER_ID {
                *value = "voucher-33".to_owned();
            }
        }
        let err = OrderIntent::from_fields(pairs).expect_err("voucherId invalid");
        assert!(matches!(
            err,
            OrderIntentDecodeError::InvalidField { field, .. } if field == fields::VOUCHER_ID
        ));
    }

    #[rstest]
    fn sale_window_is_half_open() {
        let begin = Utc::now();
        let window = SaleWindow::new(begin, begin + Duration::hours(1)).expect("valid window");
        assert_eq!(window.position(begin - Duration::seconds(1)), WindowPosition::Before);
        assert_eq!(window.position(begin), WindowPosition::Open);
        assert_eq!(window.position(window.end()), WindowPosition::After);
    }

    #[rstest]
    fn sale_window_rejects_inverted_bounds() {
        let begin = Utc::now();
        assert_eq!(
            SaleWindow::new(begin, begin),
            Err(SaleWindowValidationError)
        );
    }
}
