//! Batch computation engines: pick-frequency aggregation, order
//! co-occurrence affinity, and slotting scoring. All three are pure
//! functions over in-memory inputs; reading order history and persisting
//! results belong to the storage layer.

pub mod affinity;
pub mod frequency;
pub mod scorer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;

/// One order line from the read-only order history source. `completed`
/// reflects the upstream order status; only completed orders count as
/// movement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLineRecord {
    pub order_id: String,
    pub product_id: ProductId,
    pub quantity: u32,
    pub ordered_at: DateTime<Utc>,
    pub completed: bool,
}
