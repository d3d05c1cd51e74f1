//! Shop catalogue entity served through the cache.

use serde::{Deserialize, Serialize};

use super::ids::ShopId;

/// A shop as stored in the system of record and cached as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    /// Primary key.
    pub id: ShopId,
    /// Display name.
    pub name: String,
    /// Catalogue category.
    pub type_id: u64,
    /// Neighbourhood or business district, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    /// Street address.
    pub address: String,
    /// Average spend per customer in minor currency units, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_price: Option<i64>,
    /// Rating multiplied by ten (`47` is 4.7 stars).
    pub score: i32,
}
