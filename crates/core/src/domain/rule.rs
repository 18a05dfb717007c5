use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;
use crate::domain::slot::{SlotCode, WarehouseId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl RuleId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Warehouse-scoped placement constraint consulted by the scorer when it
/// filters candidate target slots. Rules constrain recommendations; they
/// never mutate analytics or slots themselves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    /// Confine the listed products to the given zones (e.g. hazardous goods
    /// restricted to zone H). The highest-priority restriction naming a
    /// product wins.
    ZoneRestriction { products: Vec<ProductId>, allowed_zones: Vec<char> },
    /// Remove specific slots from consideration for every product (e.g.
    /// slots reserved for staging).
    SlotExclusion { codes: Vec<SlotCode> },
}

impl RuleKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ZoneRestriction { .. } => "zone_restriction",
            Self::SlotExclusion { .. } => "slot_exclusion",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlottingRule {
    pub id: RuleId,
    pub warehouse_id: WarehouseId,
    pub kind: RuleKind,
    pub priority: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SlottingRule {
    /// True when this rule forbids placing `product` into `slot`.
    pub fn forbids(&self, product: &ProductId, slot: &SlotCode) -> bool {
        if !self.active {
            return false;
        }
        match &self.kind {
            RuleKind::ZoneRestriction { products, allowed_zones } => {
                products.contains(product) && !allowed_zones.contains(&slot.zone)
            }
            RuleKind::SlotExclusion { codes } => codes.contains(slot),
        }
    }
}

/// Applies the rule set for one product: exclusions always hold, and among
/// zone restrictions only the highest-priority rule naming the product is
/// binding. `rules` must already be scoped to the warehouse.
pub fn placement_allowed(rules: &[SlottingRule], product: &ProductId, slot: &SlotCode) -> bool {
    let excluded = rules.iter().any(|rule| {
        rule.active
            && matches!(&rule.kind, RuleKind::SlotExclusion { codes } if codes.contains(slot))
    });
    if excluded {
        return false;
    }

    let binding_restriction = rules
        .iter()
        .filter(|rule| {
            rule.active
                && matches!(&rule.kind, RuleKind::ZoneRestriction { products, .. } if products.contains(product))
        })
        .max_by_key(|rule| rule.priority);

    match binding_restriction {
        Some(rule) => !rule.forbids(product, slot),
        None => true,
    }
}
