//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **redis**: the shared fast store (cache, lock and counter records, the
//!   admission script and the order stream).
//! - **persistence**: PostgreSQL repositories for the system of record.
//!
//! Adapters translate between domain types and infrastructure
//! representations. They contain no business logic.

pub mod persistence;
pub mod redis;
