//! Domain-level error types.
//!
//! These errors are transport agnostic. Whatever inbound adapter the platform
//! mounts maps them to HTTP responses or any other protocol-specific envelope.
//! Business rejections (sold out, already bought) map to stable codes so
//! callers can tell them apart from transient failures.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::domain::cache::CacheError;
use crate::domain::flash_sale::FlashSaleError;
use crate::domain::id_allocator::IdAllocatorError;
use crate::domain::lock::LockError;
use crate::domain::order_worker::WorkerError;
use crate::domain::shop_catalogue::ShopCatalogueError;

/// Stable machine-readable error code describing the failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request is malformed or outside the allowed window.
    InvalidRequest,
    /// The requested resource does not exist.
    NotFound,
    /// The request conflicts with current state (sold out, already bought).
    Conflict,
    /// A dependency is unavailable or busy; retrying may succeed.
    ServiceUnavailable,
    /// An unexpected error occurred inside the domain.
    InternalError,
}

impl ErrorCode {
    const fn fallback_message(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid request",
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::ServiceUnavailable => "service unavailable",
            Self::InternalError => "internal error",
        }
    }
}

/// Domain error payload.
///
/// ## Invariants
/// - `message` must be non-empty once trimmed of whitespace.
///
/// # Examples
/// ```
/// use promo_backend::domain::{Error, ErrorCode};
///
/// let err = Error::new(ErrorCode::NotFound, "missing");
/// assert_eq!(err.code(), ErrorCode::NotFound);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
#[serde(try_from = "ErrorDto", into = "ErrorDto")]
pub struct Error {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

/// Validation errors emitted by the constructors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorValidationError {
    #[error("error message must not be empty")]
    EmptyMessage,
}

impl Error {
    /// Create a new error. A blank message is replaced by a generic one for
    /// `code`.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::try_new(code, message).unwrap_or_else(|_| Self {
            code,
            message: code.fallback_message().to_owned(),
            details: None,
        })
    }

    /// Fallible constructor that validates the message content.
    pub fn try_new(
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Result<Self, ErrorValidationError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(ErrorValidationError::EmptyMessage);
        }
        Ok(Self {
            code,
            message,
            details: None,
        })
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable message returned to adapters.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Supplementary error details for adapters.
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Attach structured details to the error.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Convenience constructor for [`ErrorCode::InvalidRequest`].
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Convenience constructor for [`ErrorCode::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Convenience constructor for [`ErrorCode::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Convenience constructor for [`ErrorCode::ServiceUnavailable`].
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    /// Convenience constructor for [`ErrorCode::InternalError`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

impl From<FlashSaleError> for Error {
    fn from(value: FlashSaleError) -> Self {
        let message = value.to_string();
        match value {
            FlashSaleError::StockExhausted { voucher_id } => {
                Self::conflict(message).with_details(json!({ "voucherId": voucher_id }))
            }
            FlashSaleError::DuplicateOrder {
                user_id,
                voucher_id,
            } => Self::conflict(message)
                .with_details(json!({ "userId": user_id, "voucherId": voucher_id })),
            FlashSaleError::SaleNotStarted { .. } | FlashSaleError::SaleEnded { .. } => {
                Self::invalid_request(message)
            }
            FlashSaleError::IdAllocation(_) | FlashSaleError::Unavailable(_) => {
                Self::service_unavailable(message)
            }
        }
    }
}

impl From<LockError> for Error {
    fn from(value: LockError) -> Self {
        Self::service_unavailable(value.to_string())
    }
}

impl From<IdAllocatorError> for Error {
    fn from(value: IdAllocatorError) -> Self {
        let message = value.to_string();
        match value {
            IdAllocatorError::Store(_) => Self::service_unavailable(message),
            IdAllocatorError::ClockBeforeEpoch { .. }
            | IdAllocatorError::CounterOutOfRange { .. } => Self::internal(message),
        }
    }
}

impl From<WorkerError> for Error {
    fn from(value: WorkerError) -> Self {
        Self::service_unavailable(value.to_string())
    }
}

impl From<CacheError> for Error {
    fn from(value: CacheError) -> Self {
        let message = value.to_string();
        match value {
            CacheError::Store(_)
            | CacheError::Loader { .. }
            | CacheError::LockTimeout { .. }
            | CacheError::Lock(_) => Self::service_unavailable(message),
            CacheError::Corrupt { .. } | CacheError::Encode { .. } => Self::internal(message),
        }
    }
}

impl From<ShopCatalogueError> for Error {
    fn from(value: ShopCatalogueError) -> Self {
        match value {
            ShopCatalogueError::NotFound { .. } => Self::not_found(value.to_string()),
            ShopCatalogueError::Cache(err) => err.into(),
            ShopCatalogueError::Repository(err) => Self::service_unavailable(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDto {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl From<Error> for ErrorDto {
    fn from(value: Error) -> Self {
        Self {
            code: value.code,
            message: value.message,
            details: value.details,
        }
    }
}

impl TryFrom<ErrorDto> for Error {
    type Error = ErrorValidationError;

    fn try_from(value: ErrorDto) -> Result<Self, Self::Error> {
        let ErrorDto {
            code,
            message,
            details,
        } = value;

        let mut error = Error::try_new(code, message)?;
        error.details = details;
        Ok(error)
    }
}

#[cfg(test)]
mod tests;
