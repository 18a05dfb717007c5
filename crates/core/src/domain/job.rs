use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;
use crate::domain::slot::WarehouseId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Full layout pass over every product stored in the warehouse.
    Layout,
    /// Restricted pass over the active picking set: only products with
    /// in-window movement are re-scored.
    PickingRoute,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Layout => "layout",
            Self::PickingRoute => "picking_route",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "layout" => Some(Self::Layout),
            "picking_route" => Some(Self::PickingRoute),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The product appears in order history but has no slot assignment in
    /// the target warehouse; a recommendation needs a baseline location.
    NoCurrentLocation,
    /// The analytic row is in a terminal state and batch passes must not
    /// clobber an operator decision.
    LockedByOperatorDecision,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedProduct {
    pub product_id: ProductId,
    pub reason: SkipReason,
}

/// Structured result payload recorded on a completed job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobMetrics {
    pub products_analyzed: u64,
    pub recommendations_generated: u64,
    pub pairs_computed: u64,
    pub orders_scanned: u64,
    pub oversize_orders_skipped: u64,
    pub skipped_products: Vec<SkippedProduct>,
    pub estimated_distance_reduction_pct: f64,
    pub duration_ms: u64,
}

/// A unit-of-work record for one full recomputation pass. Append-only
/// history: jobs are never re-opened, and execution is single-shot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizationJob {
    pub id: JobId,
    pub job_type: JobType,
    pub warehouse_id: WarehouseId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub metrics: Option<JobMetrics>,
    pub failure_reason: Option<String>,
}

impl OptimizationJob {
    pub fn create(job_type: JobType, warehouse_id: WarehouseId, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::generate(),
            job_type,
            warehouse_id,
            status: JobStatus::Pending,
            created_at: now,
            started_at: None,
            finished_at: None,
            metrics: None,
            failure_reason: None,
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        match self.status {
            JobStatus::Pending => {
                self.status = JobStatus::Running;
                self.started_at = Some(now);
                Ok(())
            }
            from => Err(DomainError::InvalidJobState { job_id: self.id.clone(), from }),
        }
    }

    pub fn complete(&mut self, metrics: JobMetrics, now: DateTime<Utc>) -> Result<(), DomainError> {
        match self.status {
            JobStatus::Running => {
                self.status = JobStatus::Completed;
                self.metrics = Some(metrics);
                self.finished_at = Some(now);
                Ok(())
            }
            from => Err(DomainError::InvalidJobState { job_id: self.id.clone(), from }),
        }
    }

    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), DomainError> {
        match self.status {
            JobStatus::Running => {
                self.status = JobStatus::Failed;
                self.failure_reason = Some(reason.into());
                self.finished_at = Some(now);
                Ok(())
            }
            from => Err(DomainError::InvalidJobState { job_id: self.id.clone(), from }),
        }
    }
}
