use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::product::ProductId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WarehouseId(pub String);

impl std::fmt::Display for WarehouseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Travel-cost weights: one zone crossing outweighs any shelf or bin step
/// within a zone.
const ZONE_COST: f64 = 50.0;
const SHELF_COST: f64 = 3.0;
const BIN_COST: f64 = 1.0;

/// Composite human-readable slot code: zone letter, shelf number, bin number,
/// rendered as `A-03-12`. Unique within a warehouse.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotCode {
    pub zone: char,
    pub shelf: u32,
    pub bin: u32,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SlotCodeParseError {
    #[error("slot code `{0}` is not in ZONE-SHELF-BIN form")]
    Malformed(String),
    #[error("slot code `{0}` has a zone outside A-Z")]
    InvalidZone(String),
    #[error("slot code `{code}` has a non-numeric segment: {segment}")]
    InvalidSegment { code: String, segment: String },
}

impl SlotCode {
    pub fn new(zone: char, shelf: u32, bin: u32) -> Self {
        Self { zone: zone.to_ascii_uppercase(), shelf, bin }
    }

    pub fn parse(value: &str) -> Result<Self, SlotCodeParseError> {
        let mut parts = value.trim().split('-');
        let (zone_part, shelf_part, bin_part) = match (parts.next(), parts.next(), parts.next()) {
            (Some(zone), Some(shelf), Some(bin)) if parts.next().is_none() => (zone, shelf, bin),
            _ => return Err(SlotCodeParseError::Malformed(value.to_string())),
        };

        let mut zone_chars = zone_part.chars();
        let zone = match (zone_chars.next(), zone_chars.next()) {
            (Some(zone), None) if zone.is_ascii_alphabetic() => zone.to_ascii_uppercase(),
            _ => return Err(SlotCodeParseError::InvalidZone(value.to_string())),
        };

        let shelf = parse_segment(value, shelf_part)?;
        let bin = parse_segment(value, bin_part)?;
        Ok(Self { zone, shelf, bin })
    }

    /// Normalized travel-cost proxy from the shipping dock to this slot.
    /// Zone A shelf 1 bin 1 is the closest position to the dock; cost grows
    /// monotonically with zone, then shelf, then bin.
    pub fn travel_cost(&self) -> f64 {
        let zone_offset = (self.zone as u8).saturating_sub(b'A') as f64;
        zone_offset * ZONE_COST
            + self.shelf.saturating_sub(1) as f64 * SHELF_COST
            + self.bin.saturating_sub(1) as f64 * BIN_COST
    }
}

fn parse_segment(code: &str, segment: &str) -> Result<u32, SlotCodeParseError> {
    segment.parse::<u32>().map_err(|_| SlotCodeParseError::InvalidSegment {
        code: code.to_string(),
        segment: segment.to_string(),
    })
}

impl std::fmt::Display for SlotCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}-{:02}", self.zone, self.shelf, self.bin)
    }
}

impl Serialize for SlotCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SlotCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SlotCode::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A physical storage location. A slot holds at most one assigned product;
/// unassigned slots are the candidate targets for relocation recommendations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageSlot {
    pub warehouse_id: WarehouseId,
    pub code: SlotCode,
    pub assigned_product: Option<ProductId>,
    pub capacity: Option<u32>,
}

impl StorageSlot {
    pub fn is_available(&self) -> bool {
        self.assigned_product.is_none() && self.capacity.map(|units| units > 0).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::{SlotCode, SlotCodeParseError, StorageSlot, WarehouseId};
    use crate::domain::product::ProductId;

    #[test]
    fn slot_code_round_trips_through_display() {
        let code = SlotCode::new('b', 3, 12);
        assert_eq!(code.to_string(), "B-03-12");
        assert_eq!(SlotCode::parse("B-03-12"), Ok(code));
    }

    #[test]
    fn slot_code_parse_rejects_malformed_input() {
        assert!(matches!(SlotCode::parse("A-01"), Err(SlotCodeParseError::Malformed(_))));
        assert!(matches!(SlotCode::parse("AB-01-01"), Err(SlotCodeParseError::InvalidZone(_))));
        assert!(matches!(
            SlotCode::parse("A-x-01"),
            Err(SlotCodeParseError::InvalidSegment { .. })
        ));
    }

    #[test]
    fn travel_cost_grows_with_zone_then_shelf_then_bin() {
        let dock_side = SlotCode::new('A', 1, 1);
        let far_bin = SlotCode::new('A', 1, 5);
        let far_shelf = SlotCode::new('A', 4, 1);
        let far_zone = SlotCode::new('C', 1, 1);

        assert_eq!(dock_side.travel_cost(), 0.0);
        assert!(far_bin.travel_cost() < far_shelf.travel_cost());
        assert!(far_shelf.travel_cost() < far_zone.travel_cost());
    }

    #[test]
    fn unassigned_slot_with_capacity_is_available() {
        let mut slot = StorageSlot {
            warehouse_id: WarehouseId("wh-main".to_string()),
            code: SlotCode::new('A', 1, 2),
            assigned_product: None,
            capacity: Some(10),
        };
        assert!(slot.is_available());

        slot.assigned_product = Some(ProductId("prod-1".to_string()));
        assert!(!slot.is_available());
    }
}
