use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row};

use slotwise_core::domain::job::{JobId, JobMetrics, JobStatus, JobType, OptimizationJob};
use slotwise_core::domain::slot::WarehouseId;

use super::orders::{decode, parse_timestamp};
use super::{ExecutionAdmission, JobRepository, RepositoryError};
use crate::DbPool;

const SELECT_COLUMNS: &str = "id, job_type, warehouse_id, status, created_at, started_at, \
     finished_at, metrics_json, failure_reason";

pub struct SqlJobRepository {
    pool: DbPool,
}

impl SqlJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn running_job_for_warehouse(
        &self,
        warehouse_id: &WarehouseId,
    ) -> Result<Option<JobId>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id FROM optimization_job WHERE warehouse_id = ? AND status = 'running' LIMIT 1",
        )
        .bind(&warehouse_id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(|row| row.try_get::<String, _>("id").map(JobId).map_err(decode))
            .transpose()?)
    }
}

#[async_trait::async_trait]
impl JobRepository for SqlJobRepository {
    async fn create(&self, job: OptimizationJob) -> Result<(), RepositoryError> {
        let metrics_json = job
            .metrics
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO optimization_job (
                id, job_type, warehouse_id, status, created_at, started_at,
                finished_at, metrics_json, failure_reason
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&job.id.0)
        .bind(job.job_type.as_str())
        .bind(&job.warehouse_id.0)
        .bind(job.status.as_str())
        .bind(job.created_at.to_rfc3339())
        .bind(job.started_at.map(|value| value.to_rfc3339()))
        .bind(job.finished_at.map(|value| value.to_rfc3339()))
        .bind(metrics_json)
        .bind(job.failure_reason.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<OptimizationJob>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM optimization_job WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(job_from_row).transpose()
    }

    async fn list(
        &self,
        warehouse_id: Option<&WarehouseId>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<OptimizationJob>, RepositoryError> {
        let mut builder =
            QueryBuilder::new(format!("SELECT {SELECT_COLUMNS} FROM optimization_job WHERE 1 = 1"));

        if let Some(warehouse_id) = warehouse_id {
            builder.push(" AND warehouse_id = ").push_bind(warehouse_id.0.clone());
        }

        builder.push(" ORDER BY created_at DESC, id ASC");
        builder.push(" LIMIT ").push_bind(i64::from(limit.unwrap_or(50)));
        builder.push(" OFFSET ").push_bind(i64::from(offset.unwrap_or(0)));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(job_from_row).collect()
    }

    async fn try_begin(
        &self,
        id: &JobId,
        now: DateTime<Utc>,
    ) -> Result<ExecutionAdmission, RepositoryError> {
        // The NOT EXISTS guard makes pending->running conditional on the
        // warehouse having no running job; SQLite serializes writers, so two
        // processes cannot both pass it.
        let result = sqlx::query(
            "UPDATE optimization_job
             SET status = 'running', started_at = ?2
             WHERE id = ?1
               AND status = 'pending'
               AND NOT EXISTS (
                    SELECT 1 FROM optimization_job other
                    WHERE other.warehouse_id = optimization_job.warehouse_id
                      AND other.status = 'running'
               )",
        )
        .bind(&id.0)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            let job = self
                .find_by_id(id)
                .await?
                .ok_or_else(|| RepositoryError::Decode(format!("admitted job {id} vanished")))?;
            return Ok(ExecutionAdmission::Started(job));
        }

        let Some(job) = self.find_by_id(id).await? else {
            return Ok(ExecutionAdmission::Missing);
        };
        if job.status != JobStatus::Pending {
            return Ok(ExecutionAdmission::NotPending(job.status));
        }
        let running_job_id = self.running_job_for_warehouse(&job.warehouse_id).await?;
        Ok(ExecutionAdmission::WarehouseBusy { warehouse_id: job.warehouse_id, running_job_id })
    }

    async fn record_completion(
        &self,
        id: &JobId,
        metrics: &JobMetrics,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let metrics_json = serde_json::to_string(metrics)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "UPDATE optimization_job
             SET status = 'completed', finished_at = ?, metrics_json = ?
             WHERE id = ? AND status = 'running'",
        )
        .bind(now.to_rfc3339())
        .bind(metrics_json)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_failure(
        &self,
        id: &JobId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE optimization_job
             SET status = 'failed', finished_at = ?, failure_reason = ?
             WHERE id = ? AND status = 'running'",
        )
        .bind(now.to_rfc3339())
        .bind(reason)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn job_from_row(row: SqliteRow) -> Result<OptimizationJob, RepositoryError> {
    let job_type: String = row.try_get("job_type").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let started_at: Option<String> = row.try_get("started_at").map_err(decode)?;
    let finished_at: Option<String> = row.try_get("finished_at").map_err(decode)?;
    let metrics_json: Option<String> = row.try_get("metrics_json").map_err(decode)?;

    Ok(OptimizationJob {
        id: JobId(row.try_get("id").map_err(decode)?),
        job_type: JobType::parse(&job_type)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown job type `{job_type}`")))?,
        warehouse_id: WarehouseId(row.try_get("warehouse_id").map_err(decode)?),
        status: JobStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown job status `{status}`")))?,
        created_at: parse_timestamp(&created_at)?,
        started_at: started_at.as_deref().map(parse_timestamp).transpose()?,
        finished_at: finished_at.as_deref().map(parse_timestamp).transpose()?,
        metrics: metrics_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|error| RepositoryError::Decode(format!("bad metrics payload: {error}")))?,
        failure_reason: row.try_get("failure_reason").map_err(decode)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use slotwise_core::domain::job::{JobStatus, JobType, OptimizationJob};
    use slotwise_core::domain::slot::WarehouseId;

    use super::{ExecutionAdmission, JobRepository, SqlJobRepository};
    use crate::{connect_with_settings, migrations};

    fn warehouse() -> WarehouseId {
        WarehouseId("wh-main".to_string())
    }

    #[tokio::test]
    async fn try_begin_admits_a_pending_job_once() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let repository = SqlJobRepository::new(pool.clone());

        let job = OptimizationJob::create(JobType::Layout, warehouse(), Utc::now());
        repository.create(job.clone()).await.expect("create");

        let first = repository.try_begin(&job.id, Utc::now()).await.expect("first admission");
        assert!(matches!(first, ExecutionAdmission::Started(_)));

        let second = repository.try_begin(&job.id, Utc::now()).await.expect("second admission");
        assert_eq!(second, ExecutionAdmission::NotPending(JobStatus::Running));

        pool.close().await;
    }

    #[tokio::test]
    async fn second_job_for_a_busy_warehouse_is_refused() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let repository = SqlJobRepository::new(pool.clone());

        let first = OptimizationJob::create(JobType::Layout, warehouse(), Utc::now());
        let second = OptimizationJob::create(JobType::PickingRoute, warehouse(), Utc::now());
        repository.create(first.clone()).await.expect("create first");
        repository.create(second.clone()).await.expect("create second");

        repository.try_begin(&first.id, Utc::now()).await.expect("admit first");
        let refused = repository.try_begin(&second.id, Utc::now()).await.expect("refuse second");

        assert_eq!(
            refused,
            ExecutionAdmission::WarehouseBusy {
                warehouse_id: warehouse(),
                running_job_id: Some(first.id.clone()),
            }
        );

        // Finishing the first job frees the warehouse for the second.
        repository
            .record_failure(&first.id, "synthetic failure", Utc::now())
            .await
            .expect("finish first");
        let admitted = repository.try_begin(&second.id, Utc::now()).await.expect("admit second");
        assert!(matches!(admitted, ExecutionAdmission::Started(_)));

        pool.close().await;
    }

    #[tokio::test]
    async fn jobs_in_another_warehouse_do_not_block_admission() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let repository = SqlJobRepository::new(pool.clone());

        let busy = OptimizationJob::create(JobType::Layout, warehouse(), Utc::now());
        let other = OptimizationJob::create(
            JobType::Layout,
            WarehouseId("wh-north".to_string()),
            Utc::now(),
        );
        repository.create(busy.clone()).await.expect("create busy");
        repository.create(other.clone()).await.expect("create other");

        repository.try_begin(&busy.id, Utc::now()).await.expect("admit busy warehouse job");
        let admitted = repository.try_begin(&other.id, Utc::now()).await.expect("other warehouse");

        assert!(matches!(admitted, ExecutionAdmission::Started(_)));

        pool.close().await;
    }

    #[tokio::test]
    async fn completion_round_trips_metrics() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let repository = SqlJobRepository::new(pool.clone());

        let job = OptimizationJob::create(JobType::Layout, warehouse(), Utc::now());
        repository.create(job.clone()).await.expect("create");
        repository.try_begin(&job.id, Utc::now()).await.expect("admit");

        let metrics = slotwise_core::domain::job::JobMetrics {
            products_analyzed: 8,
            recommendations_generated: 3,
            pairs_computed: 11,
            orders_scanned: 27,
            oversize_orders_skipped: 1,
            skipped_products: Vec::new(),
            estimated_distance_reduction_pct: 21.3,
            duration_ms: 640,
        };
        repository.record_completion(&job.id, &metrics, Utc::now()).await.expect("complete");

        let stored = repository.find_by_id(&job.id).await.expect("query").expect("exists");
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.metrics, Some(metrics));
        assert!(stored.finished_at.is_some());

        pool.close().await;
    }

    #[tokio::test]
    async fn missing_job_is_reported_as_missing() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let repository = SqlJobRepository::new(pool.clone());

        let admission = repository
            .try_begin(&slotwise_core::domain::job::JobId("job-ghost".to_string()), Utc::now())
            .await
            .expect("query");

        assert_eq!(admission, ExecutionAdmission::Missing);

        pool.close().await;
    }
}
