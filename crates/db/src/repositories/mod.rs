use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use slotwise_core::domain::affinity::ProductAffinity;
use slotwise_core::domain::analytic::{AnalyticId, AnalyticStatus, SlottingAnalytic};
use slotwise_core::domain::job::{JobId, JobMetrics, JobStatus, OptimizationJob};
use slotwise_core::domain::product::ProductId;
use slotwise_core::domain::rule::{RuleId, SlottingRule};
use slotwise_core::domain::slot::{StorageSlot, WarehouseId};
use slotwise_core::engine::frequency::FrequencyWindow;
use slotwise_core::engine::OrderLineRecord;

pub mod affinities;
pub mod analytics;
pub mod jobs;
pub mod memory;
pub mod orders;
pub mod rules;
pub mod slots;

pub use affinities::SqlAffinityRepository;
pub use analytics::SqlAnalyticsRepository;
pub use jobs::SqlJobRepository;
pub use memory::{
    InMemoryAffinityRepository, InMemoryAnalyticsRepository, InMemoryJobRepository,
    InMemoryOrderHistory, InMemoryRuleRepository, InMemorySlotRepository,
};
pub use orders::SqlOrderHistory;
pub use rules::SqlRuleRepository;
pub use slots::SqlSlotRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnalyticsFilter {
    pub warehouse_id: Option<WarehouseId>,
    pub product_id: Option<ProductId>,
    pub status: Option<AnalyticStatus>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AffinityFilter {
    pub product_id: Option<ProductId>,
    pub min_co_occurrence: Option<u64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Outcome of the storage-level admission check for job execution. The
/// conditional transition is what makes the single-job-per-warehouse guard
/// hold across processes.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecutionAdmission {
    Started(OptimizationJob),
    Missing,
    NotPending(JobStatus),
    WarehouseBusy { warehouse_id: WarehouseId, running_job_id: Option<JobId> },
}

/// Read-only access to the order-management subsystem's history.
#[async_trait]
pub trait OrderHistorySource: Send + Sync {
    /// All lines of completed orders for the warehouse whose creation
    /// timestamp falls inside the window.
    async fn completed_lines(
        &self,
        warehouse_id: &WarehouseId,
        window: &FrequencyWindow,
    ) -> Result<Vec<OrderLineRecord>, RepositoryError>;
}

#[async_trait]
pub trait SlotRepository: Send + Sync {
    async fn list_for_warehouse(
        &self,
        warehouse_id: &WarehouseId,
    ) -> Result<Vec<StorageSlot>, RepositoryError>;
    async fn save(&self, slot: StorageSlot, now: DateTime<Utc>) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    async fn find_by_id(&self, id: &AnalyticId)
        -> Result<Option<SlottingAnalytic>, RepositoryError>;
    async fn find_for_product(
        &self,
        warehouse_id: &WarehouseId,
        product_id: &ProductId,
    ) -> Result<Option<SlottingAnalytic>, RepositoryError>;
    async fn list(&self, filter: AnalyticsFilter)
        -> Result<Vec<SlottingAnalytic>, RepositoryError>;
    /// Replace-or-insert a whole computation pass atomically, keyed by
    /// (product, warehouse). The update arm only fires while the stored row
    /// is still `pending`; terminal rows keep operator decisions.
    async fn upsert_pending_batch(
        &self,
        analytics: Vec<SlottingAnalytic>,
    ) -> Result<(), RepositoryError>;
    /// Full-row save by id, used by lifecycle transitions.
    async fn save(&self, analytic: SlottingAnalytic) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AffinityRepository: Send + Sync {
    /// Replace-or-insert every pair of one calculation batch atomically.
    async fn upsert_batch(&self, affinities: Vec<ProductAffinity>) -> Result<(), RepositoryError>;
    async fn list(&self, filter: AffinityFilter) -> Result<Vec<ProductAffinity>, RepositoryError>;
}

#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn save(&self, rule: SlottingRule) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &RuleId) -> Result<Option<SlottingRule>, RepositoryError>;
    async fn list_for_warehouse(
        &self,
        warehouse_id: &WarehouseId,
        only_active: bool,
    ) -> Result<Vec<SlottingRule>, RepositoryError>;
    async fn delete(&self, id: &RuleId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: OptimizationJob) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &JobId) -> Result<Option<OptimizationJob>, RepositoryError>;
    async fn list(
        &self,
        warehouse_id: Option<&WarehouseId>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<OptimizationJob>, RepositoryError>;
    /// Atomically admit a pending job for execution unless its warehouse
    /// already has a running one.
    async fn try_begin(
        &self,
        id: &JobId,
        now: DateTime<Utc>,
    ) -> Result<ExecutionAdmission, RepositoryError>;
    async fn record_completion(
        &self,
        id: &JobId,
        metrics: &JobMetrics,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    async fn record_failure(
        &self,
        id: &JobId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}
