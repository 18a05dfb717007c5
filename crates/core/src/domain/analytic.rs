use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;
use crate::domain::slot::{SlotCode, WarehouseId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalyticId(pub String);

impl AnalyticId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticStatus {
    Pending,
    Approved,
    Rejected,
}

impl AnalyticStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Terminal rows are immutable to batch recomputation until reset.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

/// Current scoring snapshot for one (product, warehouse) pair. Exactly one
/// row is authoritative per pair; fresh computation passes overwrite only
/// rows still in `pending`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlottingAnalytic {
    pub id: AnalyticId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub current_location: SlotCode,
    pub recommended_location: Option<SlotCode>,
    pub rotation_frequency: u64,
    pub picking_distance: f64,
    pub affinity_score: f64,
    pub seasonality_factor: f64,
    pub improvement_potential: f64,
    pub status: AnalyticStatus,
    pub last_optimized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SlottingAnalytic {
    /// Operator acceptance. Idempotent when already approved; a rejected row
    /// must be reset before it can be approved.
    pub fn approve(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        match self.status {
            AnalyticStatus::Approved => Ok(()),
            AnalyticStatus::Pending => {
                self.status = AnalyticStatus::Approved;
                self.last_optimized_at = Some(now);
                self.updated_at = now;
                Ok(())
            }
            AnalyticStatus::Rejected => Err(DomainError::InvalidAnalyticTransition {
                from: AnalyticStatus::Rejected,
                to: AnalyticStatus::Approved,
            }),
        }
    }

    pub fn reject(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        match self.status {
            AnalyticStatus::Rejected => Ok(()),
            AnalyticStatus::Pending => {
                self.status = AnalyticStatus::Rejected;
                self.updated_at = now;
                Ok(())
            }
            AnalyticStatus::Approved => Err(DomainError::InvalidAnalyticTransition {
                from: AnalyticStatus::Approved,
                to: AnalyticStatus::Rejected,
            }),
        }
    }

    /// Returns a terminal row to `pending` so the next batch pass may
    /// re-evaluate it. No-op on rows already pending.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        if self.status.is_terminal() {
            self.status = AnalyticStatus::Pending;
            self.updated_at = now;
        }
    }
}
