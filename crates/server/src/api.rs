//! JSON control surface for the slotting engine.
//!
//! Endpoints (all under `/api/v1`):
//! - `GET  /analytics`                  — list scoring snapshots (filters + pagination)
//! - `POST /analytics/calculate`        — run a synchronous scoring pass
//! - `POST /analytics/{id}/approve`     — accept a pending recommendation
//! - `POST /analytics/{id}/reject`      — reject a pending recommendation
//! - `POST /analytics/{id}/reset`       — return a terminal row to pending
//! - `GET  /affinities`                 — list product affinities
//! - `POST /affinities/calculate`       — recompute affinities over a window
//! - `GET  /rules` / `POST /rules`      — list / create slotting rules
//! - `PUT  /rules/{id}` / `DELETE /rules/{id}` — update / remove a rule
//! - `POST /jobs`                       — create an optimization job
//! - `GET  /jobs` / `GET /jobs/{id}`    — job history / single job
//! - `POST /jobs/{id}/execute`          — run a pending job
//! - `GET  /layout/recommendations`     — ranked relocations + phased plan

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use slotwise_core::config::OptimizationConfig;
use slotwise_core::domain::affinity::ProductAffinity;
use slotwise_core::domain::analytic::{AnalyticId, AnalyticStatus, SlottingAnalytic};
use slotwise_core::domain::job::{JobId, JobType, OptimizationJob, SkippedProduct};
use slotwise_core::domain::product::ProductId;
use slotwise_core::domain::rule::{RuleId, RuleKind, SlottingRule};
use slotwise_core::domain::slot::WarehouseId;
use slotwise_core::errors::{ApplicationError, DomainError, InterfaceError};
use slotwise_db::repositories::{
    AffinityFilter, AffinityRepository, AnalyticsFilter, AnalyticsRepository, JobRepository,
    RepositoryError, RuleRepository, SqlAffinityRepository, SqlAnalyticsRepository,
    SqlJobRepository, SqlRuleRepository,
};
use slotwise_db::DbPool;

use crate::runner::OptimizationRunner;

const HIGH_PRIORITY_THRESHOLD: f64 = 75.0;
const MEDIUM_PRIORITY_THRESHOLD: f64 = 50.0;

#[derive(Clone)]
pub struct ApiState {
    analytics: Arc<dyn AnalyticsRepository>,
    affinities: Arc<dyn AffinityRepository>,
    rules: Arc<dyn RuleRepository>,
    jobs: Arc<dyn JobRepository>,
    runner: Arc<OptimizationRunner>,
}

impl ApiState {
    pub fn new(pool: DbPool, optimization: OptimizationConfig) -> Self {
        Self {
            analytics: Arc::new(SqlAnalyticsRepository::new(pool.clone())),
            affinities: Arc::new(SqlAffinityRepository::new(pool.clone())),
            rules: Arc::new(SqlRuleRepository::new(pool.clone())),
            jobs: Arc::new(SqlJobRepository::new(pool.clone())),
            runner: Arc::new(OptimizationRunner::from_pool(optimization, pool)),
        }
    }
}

pub fn router(pool: DbPool, optimization: OptimizationConfig) -> Router {
    let state = ApiState::new(pool, optimization);

    Router::new()
        .route("/api/v1/analytics", get(list_analytics))
        .route("/api/v1/analytics/calculate", post(calculate_analytics))
        .route("/api/v1/analytics/{id}/approve", post(approve_analytic))
        .route("/api/v1/analytics/{id}/reject", post(reject_analytic))
        .route("/api/v1/analytics/{id}/reset", post(reset_analytic))
        .route("/api/v1/affinities", get(list_affinities))
        .route("/api/v1/affinities/calculate", post(calculate_affinities))
        .route("/api/v1/rules", get(list_rules).post(create_rule))
        .route("/api/v1/rules/{id}", put(update_rule).delete(delete_rule))
        .route("/api/v1/jobs", get(list_jobs).post(create_job))
        .route("/api/v1/jobs/{id}", get(get_job))
        .route("/api/v1/jobs/{id}/execute", post(execute_job))
        .route("/api/v1/layout/recommendations", get(layout_recommendations))
        .with_state(state)
}

type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    detail: String,
    correlation_id: String,
}

fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

fn interface_error(error: InterfaceError) -> ApiError {
    let status = match &error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = ErrorBody {
        error: error.user_message(),
        detail: error.to_string(),
        correlation_id: error.correlation_id().to_string(),
    };
    (status, Json(body))
}

fn app_error(error: ApplicationError, correlation_id: &str) -> ApiError {
    interface_error(error.into_interface(correlation_id))
}

fn repo_error(error: RepositoryError, correlation_id: &str) -> ApiError {
    app_error(ApplicationError::Persistence(error.to_string()), correlation_id)
}

fn bad_request(message: String, correlation_id: &str) -> ApiError {
    app_error(
        ApplicationError::Domain(DomainError::InvariantViolation(message)),
        correlation_id,
    )
}

fn not_found(what: String, correlation_id: &str) -> ApiError {
    app_error(ApplicationError::NotFound(what), correlation_id)
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AnalyticsQuery {
    warehouse_id: Option<String>,
    product_id: Option<String>,
    status: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn list_analytics(
    State(state): State<ApiState>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<Vec<SlottingAnalytic>>> {
    let correlation_id = new_correlation_id();

    let status = query
        .status
        .as_deref()
        .map(|raw| {
            AnalyticStatus::parse(raw)
                .ok_or_else(|| bad_request(format!("unknown status `{raw}`"), &correlation_id))
        })
        .transpose()?;

    let analytics = state
        .analytics
        .list(AnalyticsFilter {
            warehouse_id: query.warehouse_id.map(WarehouseId),
            product_id: query.product_id.map(ProductId),
            status,
            limit: query.limit,
            offset: query.offset,
        })
        .await
        .map_err(|error| repo_error(error, &correlation_id))?;

    Ok(Json(analytics))
}

#[derive(Debug, Deserialize)]
struct CalculateAnalyticsRequest {
    warehouse_id: String,
    product_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct CalculateAnalyticsResponse {
    calculated: u64,
    recommendations: Vec<SlottingAnalytic>,
    average_improvement_potential: f64,
    estimated_distance_reduction_pct: f64,
    skipped: Vec<SkippedProduct>,
}

async fn calculate_analytics(
    State(state): State<ApiState>,
    Json(request): Json<CalculateAnalyticsRequest>,
) -> ApiResult<Json<CalculateAnalyticsResponse>> {
    let correlation_id = new_correlation_id();
    let warehouse_id = WarehouseId(request.warehouse_id);
    let product_ids =
        request.product_ids.map(|ids| ids.into_iter().map(ProductId).collect::<Vec<_>>());

    let outcome = state
        .runner
        .calculate_analytics(&warehouse_id, product_ids)
        .await
        .map_err(|error| app_error(error, &correlation_id))?;

    info!(
        event_name = "slotting.analytics.calculated",
        correlation_id = %correlation_id,
        warehouse_id = %warehouse_id,
        calculated = outcome.metrics.products_analyzed,
        "analytics calculation pass finished"
    );

    let average_improvement_potential = if outcome.analytics.is_empty() {
        0.0
    } else {
        outcome.analytics.iter().map(|analytic| analytic.improvement_potential).sum::<f64>()
            / outcome.analytics.len() as f64
    };
    let recommendations = outcome
        .analytics
        .iter()
        .filter(|analytic| {
            analytic.recommended_location.as_ref() != Some(&analytic.current_location)
        })
        .cloned()
        .collect();

    Ok(Json(CalculateAnalyticsResponse {
        calculated: outcome.metrics.products_analyzed,
        recommendations,
        average_improvement_potential,
        estimated_distance_reduction_pct: outcome.metrics.estimated_distance_reduction_pct,
        skipped: outcome.skipped,
    }))
}

async fn approve_analytic(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SlottingAnalytic>> {
    transition_analytic(state, id, AnalyticTransition::Approve).await
}

async fn reject_analytic(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SlottingAnalytic>> {
    transition_analytic(state, id, AnalyticTransition::Reject).await
}

async fn reset_analytic(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SlottingAnalytic>> {
    transition_analytic(state, id, AnalyticTransition::Reset).await
}

enum AnalyticTransition {
    Approve,
    Reject,
    Reset,
}

impl AnalyticTransition {
    fn event_name(&self) -> &'static str {
        match self {
            Self::Approve => "slotting.analytic.approved",
            Self::Reject => "slotting.analytic.rejected",
            Self::Reset => "slotting.analytic.reset",
        }
    }
}

async fn transition_analytic(
    state: ApiState,
    id: String,
    transition: AnalyticTransition,
) -> ApiResult<Json<SlottingAnalytic>> {
    let correlation_id = new_correlation_id();
    let analytic_id = AnalyticId(id);

    let mut analytic = state
        .analytics
        .find_by_id(&analytic_id)
        .await
        .map_err(|error| repo_error(error, &correlation_id))?
        .ok_or_else(|| {
            not_found(format!("slotting analytic {}", analytic_id.0), &correlation_id)
        })?;

    let now = Utc::now();
    match transition {
        AnalyticTransition::Approve => analytic
            .approve(now)
            .map_err(|error| app_error(error.into(), &correlation_id))?,
        AnalyticTransition::Reject => analytic
            .reject(now)
            .map_err(|error| app_error(error.into(), &correlation_id))?,
        AnalyticTransition::Reset => analytic.reset(now),
    }

    state
        .analytics
        .save(analytic.clone())
        .await
        .map_err(|error| repo_error(error, &correlation_id))?;

    info!(
        event_name = transition.event_name(),
        correlation_id = %correlation_id,
        warehouse_id = %analytic.warehouse_id,
        product_id = %analytic.product_id,
        "analytic lifecycle transition applied"
    );

    Ok(Json(analytic))
}

// ---------------------------------------------------------------------------
// Affinities
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AffinityQuery {
    product_id: Option<String>,
    min_co_occurrence: Option<u64>,
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn list_affinities(
    State(state): State<ApiState>,
    Query(query): Query<AffinityQuery>,
) -> ApiResult<Json<Vec<ProductAffinity>>> {
    let correlation_id = new_correlation_id();

    let affinities = state
        .affinities
        .list(AffinityFilter {
            product_id: query.product_id.map(ProductId),
            min_co_occurrence: query.min_co_occurrence,
            limit: query.limit,
            offset: query.offset,
        })
        .await
        .map_err(|error| repo_error(error, &correlation_id))?;

    Ok(Json(affinities))
}

#[derive(Debug, Deserialize)]
struct CalculateAffinitiesRequest {
    warehouse_id: String,
    window_days: Option<i64>,
}

#[derive(Debug, Serialize)]
struct CalculateAffinitiesResponse {
    pairs_computed: u64,
    orders_scanned: u64,
    oversize_orders_skipped: u64,
}

async fn calculate_affinities(
    State(state): State<ApiState>,
    Json(request): Json<CalculateAffinitiesRequest>,
) -> ApiResult<Json<CalculateAffinitiesResponse>> {
    let correlation_id = new_correlation_id();
    let warehouse_id = WarehouseId(request.warehouse_id);

    if let Some(days) = request.window_days {
        if !(1..=365).contains(&days) {
            return Err(bad_request(
                format!("window_days must be in range 1..=365, got {days}"),
                &correlation_id,
            ));
        }
    }

    let outcome = state
        .runner
        .calculate_affinities(&warehouse_id, request.window_days)
        .await
        .map_err(|error| app_error(error, &correlation_id))?;

    info!(
        event_name = "slotting.affinities.calculated",
        correlation_id = %correlation_id,
        warehouse_id = %warehouse_id,
        pairs_computed = outcome.pairs_computed,
        "affinity recalculation finished"
    );

    Ok(Json(CalculateAffinitiesResponse {
        pairs_computed: outcome.pairs_computed,
        orders_scanned: outcome.orders_scanned,
        oversize_orders_skipped: outcome.oversize_orders_skipped,
    }))
}

// ---------------------------------------------------------------------------
// Slotting rules
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RulesQuery {
    warehouse_id: String,
    include_inactive: Option<bool>,
}

async fn list_rules(
    State(state): State<ApiState>,
    Query(query): Query<RulesQuery>,
) -> ApiResult<Json<Vec<SlottingRule>>> {
    let correlation_id = new_correlation_id();

    let rules = state
        .rules
        .list_for_warehouse(
            &WarehouseId(query.warehouse_id),
            !query.include_inactive.unwrap_or(false),
        )
        .await
        .map_err(|error| repo_error(error, &correlation_id))?;

    Ok(Json(rules))
}

#[derive(Debug, Deserialize)]
struct CreateRuleRequest {
    warehouse_id: String,
    kind: RuleKind,
    priority: Option<i32>,
    active: Option<bool>,
}

async fn create_rule(
    State(state): State<ApiState>,
    Json(request): Json<CreateRuleRequest>,
) -> ApiResult<(StatusCode, Json<SlottingRule>)> {
    let correlation_id = new_correlation_id();
    let now = Utc::now();

    let rule = SlottingRule {
        id: RuleId::generate(),
        warehouse_id: WarehouseId(request.warehouse_id),
        kind: request.kind,
        priority: request.priority.unwrap_or(0),
        active: request.active.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };

    state.rules.save(rule.clone()).await.map_err(|error| repo_error(error, &correlation_id))?;

    info!(
        event_name = "slotting.rule.created",
        correlation_id = %correlation_id,
        warehouse_id = %rule.warehouse_id,
        rule_type = rule.kind.type_name(),
        "slotting rule created"
    );

    Ok((StatusCode::CREATED, Json(rule)))
}

#[derive(Debug, Deserialize)]
struct UpdateRuleRequest {
    kind: Option<RuleKind>,
    priority: Option<i32>,
    active: Option<bool>,
}

async fn update_rule(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateRuleRequest>,
) -> ApiResult<Json<SlottingRule>> {
    let correlation_id = new_correlation_id();
    let rule_id = RuleId(id);

    let mut rule = state
        .rules
        .find_by_id(&rule_id)
        .await
        .map_err(|error| repo_error(error, &correlation_id))?
        .ok_or_else(|| not_found(format!("slotting rule {}", rule_id.0), &correlation_id))?;

    if let Some(kind) = request.kind {
        rule.kind = kind;
    }
    if let Some(priority) = request.priority {
        rule.priority = priority;
    }
    if let Some(active) = request.active {
        rule.active = active;
    }
    rule.updated_at = Utc::now();

    state.rules.save(rule.clone()).await.map_err(|error| repo_error(error, &correlation_id))?;

    Ok(Json(rule))
}

async fn delete_rule(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let correlation_id = new_correlation_id();
    let rule_id = RuleId(id);

    let removed = state
        .rules
        .delete(&rule_id)
        .await
        .map_err(|error| repo_error(error, &correlation_id))?;

    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("slotting rule {}", rule_id.0), &correlation_id))
    }
}

// ---------------------------------------------------------------------------
// Optimization jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateJobRequest {
    job_type: String,
    warehouse_id: String,
}

async fn create_job(
    State(state): State<ApiState>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<OptimizationJob>)> {
    let correlation_id = new_correlation_id();

    let job_type = JobType::parse(&request.job_type).ok_or_else(|| {
        bad_request(
            format!("unknown job type `{}` (expected layout|picking_route)", request.job_type),
            &correlation_id,
        )
    })?;

    let job = OptimizationJob::create(job_type, WarehouseId(request.warehouse_id), Utc::now());
    state.jobs.create(job.clone()).await.map_err(|error| repo_error(error, &correlation_id))?;

    info!(
        event_name = "optimization.job.created",
        correlation_id = %correlation_id,
        job_id = %job.id,
        warehouse_id = %job.warehouse_id,
        job_type = job.job_type.as_str(),
        "optimization job created"
    );

    Ok((StatusCode::CREATED, Json(job)))
}

#[derive(Debug, Deserialize)]
struct JobsQuery {
    warehouse_id: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn list_jobs(
    State(state): State<ApiState>,
    Query(query): Query<JobsQuery>,
) -> ApiResult<Json<Vec<OptimizationJob>>> {
    let correlation_id = new_correlation_id();
    let warehouse_id = query.warehouse_id.map(WarehouseId);

    let jobs = state
        .jobs
        .list(warehouse_id.as_ref(), query.limit, query.offset)
        .await
        .map_err(|error| repo_error(error, &correlation_id))?;

    Ok(Json(jobs))
}

async fn get_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<OptimizationJob>> {
    let correlation_id = new_correlation_id();
    let job_id = JobId(id);

    let job = state
        .jobs
        .find_by_id(&job_id)
        .await
        .map_err(|error| repo_error(error, &correlation_id))?
        .ok_or_else(|| not_found(format!("optimization job {job_id}"), &correlation_id))?;

    Ok(Json(job))
}

async fn execute_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<OptimizationJob>> {
    let correlation_id = new_correlation_id();
    let job_id = JobId(id);

    let job = state
        .runner
        .execute_job(&job_id)
        .await
        .map_err(|error| app_error(error, &correlation_id))?;

    Ok(Json(job))
}

// ---------------------------------------------------------------------------
// Layout recommendations
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LayoutQuery {
    warehouse_id: String,
    priority: Option<String>,
}

#[derive(Debug, Serialize)]
struct RankedRecommendation {
    #[serde(flatten)]
    analytic: SlottingAnalytic,
    priority: &'static str,
}

#[derive(Debug, Serialize)]
struct ImplementationPhase {
    phase: u32,
    description: &'static str,
    product_count: usize,
}

#[derive(Debug, Serialize)]
struct LayoutRecommendationsResponse {
    warehouse_id: String,
    recommendations: Vec<RankedRecommendation>,
    implementation_plan: Vec<ImplementationPhase>,
}

fn priority_band(improvement_potential: f64) -> &'static str {
    if improvement_potential >= HIGH_PRIORITY_THRESHOLD {
        "high"
    } else if improvement_potential >= MEDIUM_PRIORITY_THRESHOLD {
        "medium"
    } else {
        "low"
    }
}

async fn layout_recommendations(
    State(state): State<ApiState>,
    Query(query): Query<LayoutQuery>,
) -> ApiResult<Json<LayoutRecommendationsResponse>> {
    let correlation_id = new_correlation_id();

    if let Some(priority) = query.priority.as_deref() {
        if !matches!(priority, "high" | "medium" | "low") {
            return Err(bad_request(
                format!("unknown priority `{priority}` (expected high|medium|low)"),
                &correlation_id,
            ));
        }
    }

    let pending = state
        .analytics
        .list(AnalyticsFilter {
            warehouse_id: Some(WarehouseId(query.warehouse_id.clone())),
            status: Some(AnalyticStatus::Pending),
            limit: Some(u32::MAX),
            ..AnalyticsFilter::default()
        })
        .await
        .map_err(|error| repo_error(error, &correlation_id))?;

    // Only rows that actually propose a move belong in the plan.
    let relocations: Vec<SlottingAnalytic> = pending
        .into_iter()
        .filter(|analytic| {
            analytic.recommended_location.as_ref() != Some(&analytic.current_location)
        })
        .collect();

    let counts = |band: &str| {
        relocations
            .iter()
            .filter(|analytic| priority_band(analytic.improvement_potential) == band)
            .count()
    };
    let implementation_plan = vec![
        ImplementationPhase {
            phase: 1,
            description: "relocate high-impact products into the fast zone",
            product_count: counts("high"),
        },
        ImplementationPhase {
            phase: 2,
            description: "consolidate medium-impact products near their affinity partners",
            product_count: counts("medium"),
        },
        ImplementationPhase {
            phase: 3,
            description: "review remaining low-impact placements opportunistically",
            product_count: counts("low"),
        },
    ];

    let recommendations = relocations
        .into_iter()
        .map(|analytic| {
            let priority = priority_band(analytic.improvement_potential);
            RankedRecommendation { analytic, priority }
        })
        .filter(|entry| query.priority.as_deref().map(|p| p == entry.priority).unwrap_or(true))
        .collect();

    Ok(Json(LayoutRecommendationsResponse {
        warehouse_id: query.warehouse_id,
        recommendations,
        implementation_plan,
    }))
}
