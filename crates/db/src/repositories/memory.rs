use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use slotwise_core::domain::affinity::{PairKey, ProductAffinity};
use slotwise_core::domain::analytic::{AnalyticId, AnalyticStatus, SlottingAnalytic};
use slotwise_core::domain::job::{JobId, JobMetrics, JobStatus, OptimizationJob};
use slotwise_core::domain::product::ProductId;
use slotwise_core::domain::rule::{RuleId, SlottingRule};
use slotwise_core::domain::slot::{StorageSlot, WarehouseId};
use slotwise_core::engine::frequency::FrequencyWindow;
use slotwise_core::engine::OrderLineRecord;

use super::{
    AffinityFilter, AffinityRepository, AnalyticsFilter, AnalyticsRepository, ExecutionAdmission,
    JobRepository, OrderHistorySource, RepositoryError, RuleRepository, SlotRepository,
};

/// Fixed order-history fixture for engine and runner tests.
#[derive(Default)]
pub struct InMemoryOrderHistory {
    lines: RwLock<Vec<OrderLineRecord>>,
    /// When set, reads fail as if the upstream source were unreachable.
    unreachable: RwLock<bool>,
}

impl InMemoryOrderHistory {
    pub async fn push_lines(&self, records: Vec<OrderLineRecord>) {
        self.lines.write().await.extend(records);
    }

    pub async fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.write().await = unreachable;
    }
}

#[async_trait::async_trait]
impl OrderHistorySource for InMemoryOrderHistory {
    async fn completed_lines(
        &self,
        _warehouse_id: &WarehouseId,
        window: &FrequencyWindow,
    ) -> Result<Vec<OrderLineRecord>, RepositoryError> {
        if *self.unreachable.read().await {
            return Err(RepositoryError::Decode("order history source unreachable".to_string()));
        }
        let lines = self.lines.read().await;
        Ok(lines
            .iter()
            .filter(|line| line.completed && window.contains(line.ordered_at))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemorySlotRepository {
    slots: RwLock<HashMap<(String, String), StorageSlot>>,
}

#[async_trait::async_trait]
impl SlotRepository for InMemorySlotRepository {
    async fn list_for_warehouse(
        &self,
        warehouse_id: &WarehouseId,
    ) -> Result<Vec<StorageSlot>, RepositoryError> {
        let slots = self.slots.read().await;
        let mut matched: Vec<StorageSlot> = slots
            .values()
            .filter(|slot| &slot.warehouse_id == warehouse_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(matched)
    }

    async fn save(&self, slot: StorageSlot, _now: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut slots = self.slots.write().await;
        slots.insert((slot.warehouse_id.0.clone(), slot.code.to_string()), slot);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAnalyticsRepository {
    analytics: RwLock<HashMap<(String, String), SlottingAnalytic>>,
}

#[async_trait::async_trait]
impl AnalyticsRepository for InMemoryAnalyticsRepository {
    async fn find_by_id(
        &self,
        id: &AnalyticId,
    ) -> Result<Option<SlottingAnalytic>, RepositoryError> {
        let analytics = self.analytics.read().await;
        Ok(analytics.values().find(|analytic| &analytic.id == id).cloned())
    }

    async fn find_for_product(
        &self,
        warehouse_id: &WarehouseId,
        product_id: &ProductId,
    ) -> Result<Option<SlottingAnalytic>, RepositoryError> {
        let analytics = self.analytics.read().await;
        Ok(analytics.get(&(product_id.0.clone(), warehouse_id.0.clone())).cloned())
    }

    async fn list(
        &self,
        filter: AnalyticsFilter,
    ) -> Result<Vec<SlottingAnalytic>, RepositoryError> {
        let analytics = self.analytics.read().await;
        let mut matched: Vec<SlottingAnalytic> = analytics
            .values()
            .filter(|analytic| {
                filter
                    .warehouse_id
                    .as_ref()
                    .map(|warehouse| &analytic.warehouse_id == warehouse)
                    .unwrap_or(true)
                    && filter
                        .product_id
                        .as_ref()
                        .map(|product| &analytic.product_id == product)
                        .unwrap_or(true)
                    && filter.status.map(|status| analytic.status == status).unwrap_or(true)
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            b.improvement_potential
                .partial_cmp(&a.improvement_potential)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });

        let offset = filter.offset.unwrap_or(0) as usize;
        let limit = filter.limit.unwrap_or(100) as usize;
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    async fn upsert_pending_batch(
        &self,
        batch: Vec<SlottingAnalytic>,
    ) -> Result<(), RepositoryError> {
        let mut analytics = self.analytics.write().await;
        for analytic in batch {
            let key = (analytic.product_id.0.clone(), analytic.warehouse_id.0.clone());
            match analytics.get(&key) {
                Some(existing) if existing.status != AnalyticStatus::Pending => {}
                Some(existing) => {
                    let mut replacement = analytic;
                    replacement.id = existing.id.clone();
                    replacement.created_at = existing.created_at;
                    analytics.insert(key, replacement);
                }
                None => {
                    analytics.insert(key, analytic);
                }
            }
        }
        Ok(())
    }

    async fn save(&self, analytic: SlottingAnalytic) -> Result<(), RepositoryError> {
        let mut analytics = self.analytics.write().await;
        let key = (analytic.product_id.0.clone(), analytic.warehouse_id.0.clone());
        analytics.insert(key, analytic);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAffinityRepository {
    affinities: RwLock<HashMap<PairKey, ProductAffinity>>,
}

#[async_trait::async_trait]
impl AffinityRepository for InMemoryAffinityRepository {
    async fn upsert_batch(
        &self,
        affinities: Vec<ProductAffinity>,
    ) -> Result<(), RepositoryError> {
        let mut stored = self.affinities.write().await;
        for affinity in affinities {
            stored.insert(affinity.pair.clone(), affinity);
        }
        Ok(())
    }

    async fn list(&self, filter: AffinityFilter) -> Result<Vec<ProductAffinity>, RepositoryError> {
        let affinities = self.affinities.read().await;
        let mut matched: Vec<ProductAffinity> = affinities
            .values()
            .filter(|affinity| {
                filter
                    .product_id
                    .as_ref()
                    .map(|product| affinity.pair.involves(product))
                    .unwrap_or(true)
                    && filter
                        .min_co_occurrence
                        .map(|minimum| affinity.co_occurrence >= minimum)
                        .unwrap_or(true)
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            b.affinity_score
                .partial_cmp(&a.affinity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.pair.cmp(&b.pair))
        });

        let offset = filter.offset.unwrap_or(0) as usize;
        let limit = filter.limit.unwrap_or(100) as usize;
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }
}

#[derive(Default)]
pub struct InMemoryRuleRepository {
    rules: RwLock<HashMap<String, SlottingRule>>,
}

#[async_trait::async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn save(&self, rule: SlottingRule) -> Result<(), RepositoryError> {
        let mut rules = self.rules.write().await;
        rules.insert(rule.id.0.clone(), rule);
        Ok(())
    }

    async fn find_by_id(&self, id: &RuleId) -> Result<Option<SlottingRule>, RepositoryError> {
        let rules = self.rules.read().await;
        Ok(rules.get(&id.0).cloned())
    }

    async fn list_for_warehouse(
        &self,
        warehouse_id: &WarehouseId,
        only_active: bool,
    ) -> Result<Vec<SlottingRule>, RepositoryError> {
        let rules = self.rules.read().await;
        let mut matched: Vec<SlottingRule> = rules
            .values()
            .filter(|rule| &rule.warehouse_id == warehouse_id && (!only_active || rule.active))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(matched)
    }

    async fn delete(&self, id: &RuleId) -> Result<bool, RepositoryError> {
        let mut rules = self.rules.write().await;
        Ok(rules.remove(&id.0).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<String, OptimizationJob>>,
}

#[async_trait::async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, job: OptimizationJob) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id.0.clone(), job);
        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<OptimizationJob>, RepositoryError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(&id.0).cloned())
    }

    async fn list(
        &self,
        warehouse_id: Option<&WarehouseId>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<OptimizationJob>, RepositoryError> {
        let jobs = self.jobs.read().await;
        let mut matched: Vec<OptimizationJob> = jobs
            .values()
            .filter(|job| warehouse_id.map(|id| &job.warehouse_id == id).unwrap_or(true))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.0.cmp(&b.id.0)));

        let offset = offset.unwrap_or(0) as usize;
        let limit = limit.unwrap_or(50) as usize;
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    async fn try_begin(
        &self,
        id: &JobId,
        now: DateTime<Utc>,
    ) -> Result<ExecutionAdmission, RepositoryError> {
        let mut jobs = self.jobs.write().await;

        let Some(job) = jobs.get(&id.0) else {
            return Ok(ExecutionAdmission::Missing);
        };
        if job.status != JobStatus::Pending {
            return Ok(ExecutionAdmission::NotPending(job.status));
        }

        let running = jobs
            .values()
            .find(|other| {
                other.warehouse_id == job.warehouse_id && other.status == JobStatus::Running
            })
            .map(|other| other.id.clone());
        if let Some(running_job_id) = running {
            return Ok(ExecutionAdmission::WarehouseBusy {
                warehouse_id: job.warehouse_id.clone(),
                running_job_id: Some(running_job_id),
            });
        }

        let mut admitted = job.clone();
        admitted.status = JobStatus::Running;
        admitted.started_at = Some(now);
        jobs.insert(id.0.clone(), admitted.clone());
        Ok(ExecutionAdmission::Started(admitted))
    }

    async fn record_completion(
        &self,
        id: &JobId,
        metrics: &JobMetrics,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&id.0) {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Completed;
                job.metrics = Some(metrics.clone());
                job.finished_at = Some(now);
            }
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        id: &JobId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&id.0) {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Failed;
                job.failure_reason = Some(reason.to_string());
                job.finished_at = Some(now);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use slotwise_core::domain::job::{JobStatus, JobType, OptimizationJob};
    use slotwise_core::domain::slot::WarehouseId;

    use super::InMemoryJobRepository;
    use crate::repositories::{ExecutionAdmission, JobRepository};

    #[tokio::test]
    async fn in_memory_guard_mirrors_the_sql_admission_semantics() {
        let repository = InMemoryJobRepository::default();
        let warehouse = WarehouseId("wh-main".to_string());

        let first = OptimizationJob::create(JobType::Layout, warehouse.clone(), Utc::now());
        let second = OptimizationJob::create(JobType::Layout, warehouse, Utc::now());
        repository.create(first.clone()).await.expect("create first");
        repository.create(second.clone()).await.expect("create second");

        assert!(matches!(
            repository.try_begin(&first.id, Utc::now()).await.expect("admit"),
            ExecutionAdmission::Started(_)
        ));
        assert_eq!(
            repository.try_begin(&second.id, Utc::now()).await.expect("refuse"),
            ExecutionAdmission::WarehouseBusy {
                warehouse_id: WarehouseId("wh-main".to_string()),
                running_job_id: Some(first.id.clone()),
            }
        );
        assert_eq!(
            repository.try_begin(&first.id, Utc::now()).await.expect("re-admit"),
            ExecutionAdmission::NotPending(JobStatus::Running)
        );
    }
}
