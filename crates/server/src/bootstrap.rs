use thiserror::Error;
use tracing::info;

use slotwise_core::config::{AppConfig, ConfigError, LoadOptions};
use slotwise_db::{connect_with_settings, migrations, DbPool};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    Ok(Application { config, db_pool })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use slotwise_core::config::{ConfigOverrides, LoadOptions};
    use slotwise_core::domain::job::{JobStatus, JobType, OptimizationJob};
    use slotwise_core::domain::slot::WarehouseId;
    use slotwise_db::repositories::{JobRepository, SqlJobRepository};
    use slotwise_db::SeedDataset;

    use crate::bootstrap::bootstrap;
    use crate::runner::OptimizationRunner;

    fn memory_overrides() -> LoadOptions {
        // Shared cache keeps every pooled connection on the same in-memory
        // database.
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_connects_and_applies_migrations() {
        let app = bootstrap(memory_overrides()).await.expect("bootstrap succeeds");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN \
             ('storage_slot', 'slotting_analytic', 'product_affinity', \
              'slotting_rule', 'optimization_job')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("baseline tables available after bootstrap");
        assert_eq!(table_count, 5, "bootstrap should expose the slotting schema");

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn integration_smoke_covers_seed_optimize_and_job_checkpoints() {
        let app = bootstrap(memory_overrides()).await.expect("bootstrap succeeds");

        SeedDataset::load(&app.db_pool).await.expect("seed fixture loads");
        let verification = SeedDataset::verify(&app.db_pool).await.expect("verify runs");
        assert!(verification.passed, "seed verification failures: {:?}", verification.failures);

        let jobs = SqlJobRepository::new(app.db_pool.clone());
        let job = OptimizationJob::create(
            JobType::Layout,
            WarehouseId("wh-main".to_string()),
            Utc::now(),
        );
        jobs.create(job.clone()).await.expect("create job");

        let runner = OptimizationRunner::from_pool(
            app.config.optimization.clone(),
            app.db_pool.clone(),
        );
        let completed = runner.execute_job(&job.id).await.expect("job executes");

        assert_eq!(completed.status, JobStatus::Completed);
        let metrics = completed.metrics.expect("metrics recorded");
        assert!(metrics.products_analyzed > 0, "seeded products should be scored");
        assert!(metrics.pairs_computed > 0, "seeded orders should produce affinities");

        app.db_pool.close().await;
    }
}
