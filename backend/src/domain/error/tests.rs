//! Tests for error payload serialisation and service error mapping.

use super::*;
use crate::domain::ports::{AdmissionGateError, StoreError};
use crate::domain::{ShopId, UserId, VoucherId};
use rstest::rstest;
use serde_json::json;

#[rstest]
fn constructors_set_the_code() {
    assert_eq!(Error::conflict("sold out").code(), ErrorCode::Conflict);
    assert_eq!(
        Error::service_unavailable("busy").code(),
        ErrorCode::ServiceUnavailable
    );
}

#[rstest]
fn try_new_rejects_empty_messages() {
    let result = Error::try_new(ErrorCode::InvalidRequest, "   ");
    assert_eq!(result, Err(ErrorValidationError::EmptyMessage));
}

#[rstest]
fn new_falls_back_to_a_generic_message() {
    let err = Error::new(ErrorCode::NotFound, "");
    assert_eq!(err.message(), "not found");
}

#[rstest]
fn serialises_with_snake_case_codes() {
    let err = Error::not_found("shop 4 not found").with_details(json!({ "shopId": 4 }));
    let value = serde_json::to_value(&err).expect("serialise");
    assert_eq!(
        value,
        json!({ "code": "not_found", "message": "shop 4 not found", "details": { "shopId": 4 } })
    );
}

#[rstest]
fn deserialisation_enforces_the_message_invariant() {
    let result: Result<Error, _> =
        serde_json::from_value(json!({ "code": "conflict", "message": " " }));
    assert!(result.is_err());
}

#[rstest]
#[case(FlashSaleError::StockExhausted { voucher_id: VoucherId::new(1) }, ErrorCode::Conflict)]
#[case(FlashSaleError::DuplicateOrder { user_id: UserId::new(2), voucher_id: VoucherId::new(1) }, ErrorCode::Conflict)]
#[case(FlashSaleError::SaleNotStarted { voucher_id: VoucherId::new(1) }, ErrorCode::InvalidRequest)]
#[case(FlashSaleError::SaleEnded { voucher_id: VoucherId::new(1) }, ErrorCode::InvalidRequest)]
#[case(FlashSaleError::Unavailable(AdmissionGateError::unavailable("down")), ErrorCode::ServiceUnavailable)]
fn flash_sale_errors_map_to_stable_codes(#[case] source: FlashSaleError, #[case] code: ErrorCode) {
    assert_eq!(Error::from(source).code(), code);
}

#[rstest]
fn duplicate_orders_carry_identifiers_in_details() {
    let err = Error::from(FlashSaleError::DuplicateOrder {
        user_id: UserId::new(2),
        voucher_id: VoucherId::new(1),
    });
    assert_eq!(err.details(), Some(&json!({ "userId": 2, "voucherId": 1 })));
}

#[rstest]
fn catalogue_not_found_maps_to_not_found() {
    let err = Error::from(ShopCatalogueError::NotFound { id: ShopId::new(3) });
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[rstest]
fn cache_lock_timeouts_are_retryable() {
    let err = Error::from(CacheError::LockTimeout {
        key: "cache:shop:1".to_owned(),
        attempts: 20,
    });
    assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
}

#[rstest]
fn corrupt_counters_are_internal_failures() {
    let err = Error::from(IdAllocatorError::CounterOutOfRange {
        key: "icr:order:2026:05:01".to_owned(),
        value: -1,
    });
    assert_eq!(err.code(), ErrorCode::InternalError);

    let err = Error::from(IdAllocatorError::Store(StoreError::unavailable("down")));
    assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
}
