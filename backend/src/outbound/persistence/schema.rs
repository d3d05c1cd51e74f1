//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match `backend/migrations` exactly. Regenerate them
//! with `diesel print-schema` after changing a migration.

diesel::table! {
    /// Limited-stock vouchers sold through the flash-sale path.
    ///
    /// `stock` is the authoritative count; the shared store holds a copy used
    /// only for admission.
    seckill_vouchers (voucher_id) {
        voucher_id -> Int8,
        stock -> Int4,
        begin_time -> Timestamptz,
        end_time -> Timestamptz,
    }
}

diesel::table! {
    /// Persisted voucher orders.
    ///
    /// Unique on `id` and on `(user_id, voucher_id)`, so replays of an
    /// admitted intent insert nothing.
    voucher_orders (id) {
        id -> Int8,
        user_id -> Int8,
        voucher_id -> Int8,
        status -> Varchar,
        create_time -> Timestamptz,
    }
}

diesel::table! {
    /// Shop catalogue.
    shops (id) {
        id -> Int8,
        name -> Varchar,
        type_id -> Int8,
        area -> Nullable<Varchar>,
        address -> Varchar,
        avg_price -> Nullable<Int8>,
        score -> Int4,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(seckill_vouchers, voucher_orders, shops);
