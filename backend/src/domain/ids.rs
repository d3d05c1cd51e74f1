//! Strongly typed numeric identifiers shared across the core.
//!
//! Every identifier is a `u64` on the wire and in the shared store. The
//! relational store keeps them in `BIGINT` columns, so conversions to `i64`
//! are fallible and checked at the persistence boundary.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw identifier.
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Return the raw identifier.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<u64>().map(Self)
            }
        }
    };
}

define_id! {
    /// Identifier of a platform user, already authenticated by the caller.
    UserId
}

define_id! {
    /// Identifier of a promotional voucher.
    VoucherId
}

define_id! {
    /// Globally unique, time-ordered order identifier.
    OrderId
}

define_id! {
    /// Identifier of a shop in the catalogue.
    ShopId
}
