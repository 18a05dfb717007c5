//! Optimization job runner: wraps one full recomputation pass (pick
//! frequency, affinity, scoring) as a trackable unit of work. Admission is
//! storage-backed (one running job per warehouse, single-shot execution)
//! and the whole computation runs under a wall-clock budget; nothing is
//! persisted for a pass that times out or fails.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};

use slotwise_core::config::OptimizationConfig;
use slotwise_core::domain::affinity::ProductAffinity;
use slotwise_core::domain::analytic::{AnalyticId, AnalyticStatus, SlottingAnalytic};
use slotwise_core::domain::job::{
    JobId, JobMetrics, JobType, OptimizationJob, SkipReason, SkippedProduct,
};
use slotwise_core::domain::product::ProductId;
use slotwise_core::domain::slot::{SlotCode, WarehouseId};
use slotwise_core::engine::affinity::AffinityCalculator;
use slotwise_core::engine::frequency::{aggregate_pick_frequency, FrequencyWindow};
use slotwise_core::engine::scorer::{ScoreInputs, SlottingScorer};
use slotwise_core::errors::{ApplicationError, DomainError};
use slotwise_db::repositories::{
    AffinityRepository, AnalyticsFilter, AnalyticsRepository, ExecutionAdmission, JobRepository,
    OrderHistorySource, RepositoryError, RuleRepository, SlotRepository, SqlAffinityRepository,
    SqlAnalyticsRepository, SqlJobRepository, SqlOrderHistory, SqlRuleRepository,
    SqlSlotRepository,
};
use slotwise_db::DbPool;

pub struct OptimizationRunner {
    config: OptimizationConfig,
    orders: Arc<dyn OrderHistorySource>,
    slots: Arc<dyn SlotRepository>,
    analytics: Arc<dyn AnalyticsRepository>,
    affinities: Arc<dyn AffinityRepository>,
    rules: Arc<dyn RuleRepository>,
    jobs: Arc<dyn JobRepository>,
}

/// Result of one scoring pass after persistence.
#[derive(Clone, Debug)]
pub struct CalculationOutcome {
    pub analytics: Vec<SlottingAnalytic>,
    pub skipped: Vec<SkippedProduct>,
    pub metrics: JobMetrics,
}

/// Result of an affinity-only recalculation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AffinityOutcome {
    pub pairs_computed: u64,
    pub orders_scanned: u64,
    pub oversize_orders_skipped: u64,
}

/// Everything a pass produced, computed before any write happens.
struct ComputedPass {
    analytics: Vec<SlottingAnalytic>,
    affinities: Vec<ProductAffinity>,
    skipped: Vec<SkippedProduct>,
    orders_scanned: u64,
    oversize_orders_skipped: u64,
    estimated_distance_reduction_pct: f64,
}

impl ComputedPass {
    fn metrics(&self, duration_ms: u64) -> JobMetrics {
        JobMetrics {
            products_analyzed: self.analytics.len() as u64,
            recommendations_generated: self
                .analytics
                .iter()
                .filter(|analytic| {
                    analytic.recommended_location.as_ref() != Some(&analytic.current_location)
                })
                .count() as u64,
            pairs_computed: self.affinities.len() as u64,
            orders_scanned: self.orders_scanned,
            oversize_orders_skipped: self.oversize_orders_skipped,
            skipped_products: self.skipped.clone(),
            estimated_distance_reduction_pct: self.estimated_distance_reduction_pct,
            duration_ms,
        }
    }
}

impl OptimizationRunner {
    pub fn new(
        config: OptimizationConfig,
        orders: Arc<dyn OrderHistorySource>,
        slots: Arc<dyn SlotRepository>,
        analytics: Arc<dyn AnalyticsRepository>,
        affinities: Arc<dyn AffinityRepository>,
        rules: Arc<dyn RuleRepository>,
        jobs: Arc<dyn JobRepository>,
    ) -> Self {
        Self { config, orders, slots, analytics, affinities, rules, jobs }
    }

    pub fn from_pool(config: OptimizationConfig, pool: DbPool) -> Self {
        Self::new(
            config,
            Arc::new(SqlOrderHistory::new(pool.clone())),
            Arc::new(SqlSlotRepository::new(pool.clone())),
            Arc::new(SqlAnalyticsRepository::new(pool.clone())),
            Arc::new(SqlAffinityRepository::new(pool.clone())),
            Arc::new(SqlRuleRepository::new(pool.clone())),
            Arc::new(SqlJobRepository::new(pool)),
        )
    }

    /// Runs a previously created job. Admission failures (unknown id,
    /// non-pending job, busy warehouse) surface as errors without touching
    /// any state; pipeline failures mark the job `failed` and are reported
    /// through the returned job record.
    pub async fn execute_job(&self, job_id: &JobId) -> Result<OptimizationJob, ApplicationError> {
        let admission = self.jobs.try_begin(job_id, Utc::now()).await.map_err(persistence)?;
        let job = match admission {
            ExecutionAdmission::Started(job) => job,
            ExecutionAdmission::Missing => {
                return Err(ApplicationError::NotFound(format!("optimization job {job_id}")))
            }
            ExecutionAdmission::NotPending(status) => {
                return Err(
                    DomainError::InvalidJobState { job_id: job_id.clone(), from: status }.into()
                )
            }
            ExecutionAdmission::WarehouseBusy { warehouse_id, running_job_id } => {
                return Err(ApplicationError::WarehouseBusy { warehouse_id, running_job_id })
            }
        };

        info!(
            event_name = "optimization.job.started",
            job_id = %job.id,
            warehouse_id = %job.warehouse_id,
            job_type = job.job_type.as_str(),
            "optimization job admitted for execution"
        );

        let started = Instant::now();
        let budget = Duration::from_secs(self.config.job_timeout_secs);
        let computed =
            tokio::time::timeout(budget, self.compute_pass(&job.warehouse_id, None, job.job_type))
                .await;

        match computed {
            Err(_elapsed) => {
                let reason = ApplicationError::Timeout {
                    job_id: job_id.clone(),
                    budget_secs: self.config.job_timeout_secs,
                }
                .to_string();
                self.jobs.record_failure(job_id, &reason, Utc::now()).await.map_err(persistence)?;
                warn!(
                    event_name = "optimization.job.timeout",
                    job_id = %job.id,
                    warehouse_id = %job.warehouse_id,
                    budget_secs = self.config.job_timeout_secs,
                    "optimization job exceeded its wall-clock budget"
                );
            }
            Ok(Err(error)) => {
                self.jobs
                    .record_failure(job_id, &error.to_string(), Utc::now())
                    .await
                    .map_err(persistence)?;
                warn!(
                    event_name = "optimization.job.failed",
                    job_id = %job.id,
                    warehouse_id = %job.warehouse_id,
                    error = %error,
                    "optimization pipeline failed"
                );
            }
            Ok(Ok(pass)) => {
                let metrics = pass.metrics(started.elapsed().as_millis() as u64);
                match self.persist_pass(pass).await {
                    Err(error) => {
                        self.jobs
                            .record_failure(job_id, &error.to_string(), Utc::now())
                            .await
                            .map_err(persistence)?;
                        warn!(
                            event_name = "optimization.job.persist_failed",
                            job_id = %job.id,
                            warehouse_id = %job.warehouse_id,
                            error = %error,
                            "optimization results could not be persisted"
                        );
                    }
                    Ok(()) => {
                        self.jobs
                            .record_completion(job_id, &metrics, Utc::now())
                            .await
                            .map_err(persistence)?;
                        info!(
                            event_name = "optimization.job.completed",
                            job_id = %job.id,
                            warehouse_id = %job.warehouse_id,
                            products_analyzed = metrics.products_analyzed,
                            recommendations_generated = metrics.recommendations_generated,
                            duration_ms = metrics.duration_ms,
                            "optimization job completed"
                        );
                    }
                }
            }
        }

        self.jobs
            .find_by_id(job_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| ApplicationError::NotFound(format!("optimization job {job_id}")))
    }

    /// Synchronous scoring pass without job bookkeeping, used by the
    /// trigger-calculation API operation.
    pub async fn calculate_analytics(
        &self,
        warehouse_id: &WarehouseId,
        product_ids: Option<Vec<ProductId>>,
    ) -> Result<CalculationOutcome, ApplicationError> {
        let scope: Option<HashSet<ProductId>> =
            product_ids.map(|products| products.into_iter().collect());

        let started = Instant::now();
        let pass = self.compute_pass(warehouse_id, scope.as_ref(), JobType::Layout).await?;
        let metrics = pass.metrics(started.elapsed().as_millis() as u64);
        let analytics = pass.analytics.clone();
        let skipped = pass.skipped.clone();
        self.persist_pass(pass).await?;

        Ok(CalculationOutcome { analytics, skipped, metrics })
    }

    /// Affinity-only recalculation over an explicit trailing window.
    pub async fn calculate_affinities(
        &self,
        warehouse_id: &WarehouseId,
        window_days: Option<i64>,
    ) -> Result<AffinityOutcome, ApplicationError> {
        let now = Utc::now();
        let days = window_days.unwrap_or(self.config.window_days);
        let window = FrequencyWindow::trailing_days(now, days);

        let lines = self
            .orders
            .completed_lines(warehouse_id, &window)
            .await
            .map_err(|error| ApplicationError::DataUnavailable(error.to_string()))?;

        let batch =
            AffinityCalculator::new(self.config.affinity_config()).calculate(&lines, &window);
        let outcome = AffinityOutcome {
            pairs_computed: batch.pairs.len() as u64,
            orders_scanned: batch.orders_scanned,
            oversize_orders_skipped: batch.oversize_orders_skipped,
        };

        let rows: Vec<ProductAffinity> = batch
            .pairs
            .into_iter()
            .map(|entry| ProductAffinity {
                pair: entry.pair,
                co_occurrence: entry.co_occurrence,
                affinity_score: entry.affinity_score,
                confidence: entry.confidence,
                computed_at: now,
            })
            .collect();
        self.affinities.upsert_batch(rows).await.map_err(persistence)?;

        Ok(outcome)
    }

    /// Pure computation stage: reads order history, slots, rules, and the
    /// current analytics snapshot, then produces every row the pass would
    /// write. No persistence happens here, so a timeout discards everything.
    async fn compute_pass(
        &self,
        warehouse_id: &WarehouseId,
        scope: Option<&HashSet<ProductId>>,
        job_type: JobType,
    ) -> Result<ComputedPass, ApplicationError> {
        let now = Utc::now();
        let window = FrequencyWindow::trailing_days(now, self.config.window_days);

        let lines = self
            .orders
            .completed_lines(warehouse_id, &window)
            .await
            .map_err(|error| ApplicationError::DataUnavailable(error.to_string()))?;

        let movement = aggregate_pick_frequency(&lines, &window, scope);
        let affinity_batch =
            AffinityCalculator::new(self.config.affinity_config()).calculate(&lines, &window);

        let slots = self.slots.list_for_warehouse(warehouse_id).await.map_err(persistence)?;
        let rules =
            self.rules.list_for_warehouse(warehouse_id, true).await.map_err(persistence)?;
        let existing: HashMap<ProductId, SlottingAnalytic> = self
            .analytics
            .list(AnalyticsFilter {
                warehouse_id: Some(warehouse_id.clone()),
                limit: Some(u32::MAX),
                ..AnalyticsFilter::default()
            })
            .await
            .map_err(persistence)?
            .into_iter()
            .map(|analytic| (analytic.product_id.clone(), analytic))
            .collect();

        let mut products: BTreeSet<ProductId> =
            slots.iter().filter_map(|slot| slot.assigned_product.clone()).collect();
        products.extend(movement.keys().cloned());
        if let Some(scope) = scope {
            products.retain(|product| scope.contains(product));
        }
        if job_type == JobType::PickingRoute {
            // Picking-route passes only revisit the active picking set.
            products.retain(|product| movement.contains_key(product));
        }

        let slot_of_product: HashMap<&ProductId, &SlotCode> = slots
            .iter()
            .filter_map(|slot| slot.assigned_product.as_ref().map(|product| (product, &slot.code)))
            .collect();

        let scorer = SlottingScorer::new(self.config.scorer_config());
        let top_n = scorer.config().top_affinity_count;

        struct Draft {
            product: ProductId,
            current: SlotCode,
            inputs: ScoreInputs,
            potential: f64,
        }

        let mut drafts: Vec<Draft> = Vec::new();
        let mut skipped: Vec<SkippedProduct> = Vec::new();

        for product in &products {
            if let Some(row) = existing.get(product) {
                if row.status.is_terminal() {
                    skipped.push(SkippedProduct {
                        product_id: product.clone(),
                        reason: SkipReason::LockedByOperatorDecision,
                    });
                    continue;
                }
            }

            let Some(current) = slot_of_product.get(product).map(|code| (*code).clone()) else {
                skipped.push(SkippedProduct {
                    product_id: product.clone(),
                    reason: SkipReason::NoCurrentLocation,
                });
                continue;
            };

            let inputs = ScoreInputs {
                rotation_frequency: movement.get(product).copied().unwrap_or(0),
                picking_distance: current.travel_cost(),
                affinity_signal: affinity_batch.signal_for(product, top_n),
                seasonality_factor: existing
                    .get(product)
                    .map(|row| row.seasonality_factor)
                    .unwrap_or(1.0),
            };
            let potential = scorer.improvement_potential(&inputs);
            drafts.push(Draft { product: product.clone(), current, inputs, potential });
        }

        // Highest-potential products pick their target slots first so one
        // pass never promises the same slot twice.
        drafts.sort_by(|a, b| {
            b.potential
                .partial_cmp(&a.potential)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.product.cmp(&b.product))
        });

        let mut claimed: Vec<SlotCode> = Vec::new();
        let mut analytics_rows: Vec<SlottingAnalytic> = Vec::new();
        let mut current_cost = 0.0;
        let mut target_cost = 0.0;

        for draft in drafts {
            let outcome = scorer.score_product(
                &draft.product,
                warehouse_id,
                Some(&draft.current),
                &draft.inputs,
                &slots,
                &rules,
                &claimed,
            )?;

            if outcome.relocate {
                claimed.push(outcome.recommended_location.clone());
                current_cost += draft.current.travel_cost();
                target_cost += outcome.recommended_location.travel_cost();
            }

            analytics_rows.push(SlottingAnalytic {
                id: AnalyticId::generate(),
                product_id: draft.product,
                warehouse_id: warehouse_id.clone(),
                current_location: draft.current,
                recommended_location: Some(outcome.recommended_location),
                rotation_frequency: draft.inputs.rotation_frequency,
                picking_distance: draft.inputs.picking_distance,
                affinity_score: draft.inputs.affinity_signal,
                seasonality_factor: draft.inputs.seasonality_factor,
                improvement_potential: outcome.improvement_potential,
                status: AnalyticStatus::Pending,
                last_optimized_at: None,
                created_at: now,
                updated_at: now,
            });
        }

        let estimated_distance_reduction_pct = if current_cost > 0.0 {
            (current_cost - target_cost) / current_cost * 100.0
        } else {
            0.0
        };

        let affinities: Vec<ProductAffinity> = affinity_batch
            .pairs
            .into_iter()
            .map(|entry| ProductAffinity {
                pair: entry.pair,
                co_occurrence: entry.co_occurrence,
                affinity_score: entry.affinity_score,
                confidence: entry.confidence,
                computed_at: now,
            })
            .collect();

        Ok(ComputedPass {
            analytics: analytics_rows,
            affinities,
            skipped,
            orders_scanned: affinity_batch.orders_scanned,
            oversize_orders_skipped: affinity_batch.oversize_orders_skipped,
            estimated_distance_reduction_pct,
        })
    }

    async fn persist_pass(&self, pass: ComputedPass) -> Result<(), ApplicationError> {
        self.affinities.upsert_batch(pass.affinities).await.map_err(persistence)?;
        self.analytics.upsert_pending_batch(pass.analytics).await.map_err(persistence)?;
        Ok(())
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}
