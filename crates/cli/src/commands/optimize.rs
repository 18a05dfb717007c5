use chrono::Utc;

use crate::commands::CommandResult;
use slotwise_core::config::{AppConfig, LoadOptions};
use slotwise_core::domain::job::{JobStatus, JobType, OptimizationJob};
use slotwise_core::domain::slot::WarehouseId;
use slotwise_db::repositories::{JobRepository, SqlJobRepository};
use slotwise_db::{connect_with_settings, migrations};
use slotwise_server::OptimizationRunner;

/// Creates and immediately executes an optimization job from the terminal,
/// mirroring the create + execute API operations.
pub fn run(warehouse: &str, job_type: &str) -> CommandResult {
    let Some(job_type) = JobType::parse(job_type) else {
        return CommandResult::failure(
            "optimize",
            "invalid_argument",
            format!("unknown job type `{job_type}` (expected layout|picking_route)"),
            2,
        );
    };

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "optimize",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "optimize",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let optimization = config.optimization.clone();
    let warehouse_id = WarehouseId(warehouse.to_string());

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let jobs = SqlJobRepository::new(pool.clone());
        let job = OptimizationJob::create(job_type, warehouse_id, Utc::now());
        jobs.create(job.clone())
            .await
            .map_err(|error| ("job_creation", error.to_string(), 5u8))?;

        let runner = OptimizationRunner::from_pool(optimization, pool.clone());
        let executed = runner
            .execute_job(&job.id)
            .await
            .map_err(|error| ("job_execution", error.to_string(), 6u8))?;

        pool.close().await;
        Ok::<OptimizationJob, (&'static str, String, u8)>(executed)
    });

    match result {
        Ok(job) => match job.status {
            JobStatus::Completed => {
                let metrics = job.metrics.as_ref();
                CommandResult::success(
                    "optimize",
                    format!(
                        "job {} completed: {} products analyzed, {} recommendations, {:.1}% estimated distance reduction",
                        job.id,
                        metrics.map(|m| m.products_analyzed).unwrap_or(0),
                        metrics.map(|m| m.recommendations_generated).unwrap_or(0),
                        metrics.map(|m| m.estimated_distance_reduction_pct).unwrap_or(0.0),
                    ),
                )
            }
            _ => CommandResult::failure(
                "optimize",
                "job_failed",
                format!(
                    "job {} finished in state {} ({})",
                    job.id,
                    job.status.as_str(),
                    job.failure_reason.as_deref().unwrap_or("no reason recorded")
                ),
                6,
            ),
        },
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("optimize", error_class, message, exit_code)
        }
    }
}
