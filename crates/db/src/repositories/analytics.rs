use sqlx::{sqlite::SqliteRow, QueryBuilder, Row};

use slotwise_core::domain::analytic::{AnalyticId, AnalyticStatus, SlottingAnalytic};
use slotwise_core::domain::product::ProductId;
use slotwise_core::domain::slot::{SlotCode, WarehouseId};

use super::orders::{decode, parse_timestamp};
use super::{AnalyticsFilter, AnalyticsRepository, RepositoryError};
use crate::DbPool;

const SELECT_COLUMNS: &str = "id, product_id, warehouse_id, current_location, \
     recommended_location, rotation_frequency, picking_distance, affinity_score, \
     seasonality_factor, improvement_potential, status, last_optimized_at, \
     created_at, updated_at";

pub struct SqlAnalyticsRepository {
    pool: DbPool,
}

impl SqlAnalyticsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AnalyticsRepository for SqlAnalyticsRepository {
    async fn find_by_id(
        &self,
        id: &AnalyticId,
    ) -> Result<Option<SlottingAnalytic>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM slotting_analytic WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(analytic_from_row).transpose()
    }

    async fn find_for_product(
        &self,
        warehouse_id: &WarehouseId,
        product_id: &ProductId,
    ) -> Result<Option<SlottingAnalytic>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM slotting_analytic \
             WHERE warehouse_id = ? AND product_id = ?"
        ))
        .bind(&warehouse_id.0)
        .bind(&product_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(analytic_from_row).transpose()
    }

    async fn list(
        &self,
        filter: AnalyticsFilter,
    ) -> Result<Vec<SlottingAnalytic>, RepositoryError> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {SELECT_COLUMNS} FROM slotting_analytic WHERE 1 = 1"
        ));

        if let Some(warehouse_id) = &filter.warehouse_id {
            builder.push(" AND warehouse_id = ").push_bind(warehouse_id.0.clone());
        }
        if let Some(product_id) = &filter.product_id {
            builder.push(" AND product_id = ").push_bind(product_id.0.clone());
        }
        if let Some(status) = &filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }

        builder.push(" ORDER BY improvement_potential DESC, product_id ASC");
        builder.push(" LIMIT ").push_bind(i64::from(filter.limit.unwrap_or(100)));
        builder.push(" OFFSET ").push_bind(i64::from(filter.offset.unwrap_or(0)));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(analytic_from_row).collect()
    }

    async fn upsert_pending_batch(
        &self,
        analytics: Vec<SlottingAnalytic>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for analytic in analytics {
            // The WHERE clause on the update arm is the storage-level
            // backstop for the skip policy: terminal rows keep the
            // operator's decision even if a racing pass reaches this
            // statement.
            sqlx::query(
                "INSERT INTO slotting_analytic (
                    id, product_id, warehouse_id, current_location, recommended_location,
                    rotation_frequency, picking_distance, affinity_score, seasonality_factor,
                    improvement_potential, status, last_optimized_at, created_at, updated_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(product_id, warehouse_id) DO UPDATE SET
                    current_location = excluded.current_location,
                    recommended_location = excluded.recommended_location,
                    rotation_frequency = excluded.rotation_frequency,
                    picking_distance = excluded.picking_distance,
                    affinity_score = excluded.affinity_score,
                    seasonality_factor = excluded.seasonality_factor,
                    improvement_potential = excluded.improvement_potential,
                    status = excluded.status,
                    updated_at = excluded.updated_at
                 WHERE slotting_analytic.status = 'pending'",
            )
            .bind(&analytic.id.0)
            .bind(&analytic.product_id.0)
            .bind(&analytic.warehouse_id.0)
            .bind(analytic.current_location.to_string())
            .bind(analytic.recommended_location.as_ref().map(ToString::to_string))
            .bind(analytic.rotation_frequency as i64)
            .bind(analytic.picking_distance)
            .bind(analytic.affinity_score)
            .bind(analytic.seasonality_factor)
            .bind(analytic.improvement_potential)
            .bind(analytic.status.as_str())
            .bind(analytic.last_optimized_at.map(|value| value.to_rfc3339()))
            .bind(analytic.created_at.to_rfc3339())
            .bind(analytic.updated_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn save(&self, analytic: SlottingAnalytic) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE slotting_analytic SET
                current_location = ?,
                recommended_location = ?,
                rotation_frequency = ?,
                picking_distance = ?,
                affinity_score = ?,
                seasonality_factor = ?,
                improvement_potential = ?,
                status = ?,
                last_optimized_at = ?,
                updated_at = ?
             WHERE id = ?",
        )
        .bind(analytic.current_location.to_string())
        .bind(analytic.recommended_location.as_ref().map(ToString::to_string))
        .bind(analytic.rotation_frequency as i64)
        .bind(analytic.picking_distance)
        .bind(analytic.affinity_score)
        .bind(analytic.seasonality_factor)
        .bind(analytic.improvement_potential)
        .bind(analytic.status.as_str())
        .bind(analytic.last_optimized_at.map(|value| value.to_rfc3339()))
        .bind(analytic.updated_at.to_rfc3339())
        .bind(&analytic.id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn analytic_from_row(row: SqliteRow) -> Result<SlottingAnalytic, RepositoryError> {
    let current_location: String = row.try_get("current_location").map_err(decode)?;
    let recommended_location: Option<String> =
        row.try_get("recommended_location").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    let rotation_frequency: i64 = row.try_get("rotation_frequency").map_err(decode)?;
    let last_optimized_at: Option<String> = row.try_get("last_optimized_at").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode)?;

    Ok(SlottingAnalytic {
        id: AnalyticId(row.try_get("id").map_err(decode)?),
        product_id: ProductId(row.try_get("product_id").map_err(decode)?),
        warehouse_id: WarehouseId(row.try_get("warehouse_id").map_err(decode)?),
        current_location: SlotCode::parse(&current_location)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        recommended_location: recommended_location
            .map(|code| {
                SlotCode::parse(&code).map_err(|error| RepositoryError::Decode(error.to_string()))
            })
            .transpose()?,
        rotation_frequency: u64::try_from(rotation_frequency).map_err(|_| {
            RepositoryError::Decode(format!("negative rotation frequency {rotation_frequency}"))
        })?,
        picking_distance: row.try_get("picking_distance").map_err(decode)?,
        affinity_score: row.try_get("affinity_score").map_err(decode)?,
        seasonality_factor: row.try_get("seasonality_factor").map_err(decode)?,
        improvement_potential: row.try_get("improvement_potential").map_err(decode)?,
        status: AnalyticStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown analytic status `{status}`")))?,
        last_optimized_at: last_optimized_at.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use slotwise_core::domain::analytic::{AnalyticId, AnalyticStatus, SlottingAnalytic};
    use slotwise_core::domain::product::ProductId;
    use slotwise_core::domain::slot::{SlotCode, WarehouseId};

    use super::{AnalyticsFilter, AnalyticsRepository, SqlAnalyticsRepository};
    use crate::{connect_with_settings, migrations};

    fn analytic(product: &str, potential: f64) -> SlottingAnalytic {
        let now = Utc::now();
        SlottingAnalytic {
            id: AnalyticId::generate(),
            product_id: ProductId(product.to_string()),
            warehouse_id: WarehouseId("wh-main".to_string()),
            current_location: SlotCode::new('C', 2, 1),
            recommended_location: Some(SlotCode::new('A', 1, 1)),
            rotation_frequency: 12,
            picking_distance: 103.0,
            affinity_score: 1.5,
            seasonality_factor: 1.0,
            improvement_potential: potential,
            status: AnalyticStatus::Pending,
            last_optimized_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_pending_rows_by_natural_key() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let repository = SqlAnalyticsRepository::new(pool.clone());

        repository.upsert_pending_batch(vec![analytic("prod-1", 40.0)]).await.expect("insert");
        repository.upsert_pending_batch(vec![analytic("prod-1", 72.0)]).await.expect("overwrite");

        let rows = repository
            .list(AnalyticsFilter {
                warehouse_id: Some(WarehouseId("wh-main".to_string())),
                ..AnalyticsFilter::default()
            })
            .await
            .expect("list");

        assert_eq!(rows.len(), 1, "one authoritative row per (product, warehouse)");
        assert_eq!(rows[0].improvement_potential, 72.0);

        pool.close().await;
    }

    #[tokio::test]
    async fn upsert_never_touches_terminal_rows() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let repository = SqlAnalyticsRepository::new(pool.clone());

        let mut approved = analytic("prod-1", 55.0);
        repository.upsert_pending_batch(vec![approved.clone()]).await.expect("insert");
        approved.approve(Utc::now()).expect("pending -> approved");
        repository.save(approved.clone()).await.expect("persist approval");

        repository.upsert_pending_batch(vec![analytic("prod-1", 99.0)]).await.expect("recompute pass");

        let stored = repository
            .find_for_product(
                &WarehouseId("wh-main".to_string()),
                &ProductId("prod-1".to_string()),
            )
            .await
            .expect("query")
            .expect("row exists");

        assert_eq!(stored.status, AnalyticStatus::Approved);
        assert_eq!(stored.improvement_potential, 55.0, "recompute must not clobber approval");

        pool.close().await;
    }

    #[tokio::test]
    async fn list_orders_by_improvement_and_honors_pagination() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let repository = SqlAnalyticsRepository::new(pool.clone());

        for (product, potential) in [("prod-1", 20.0), ("prod-2", 80.0), ("prod-3", 50.0)] {
            repository.upsert_pending_batch(vec![analytic(product, potential)]).await.expect("insert");
        }

        let top = repository
            .list(AnalyticsFilter { limit: Some(2), ..AnalyticsFilter::default() })
            .await
            .expect("list");

        assert_eq!(top.len(), 2);
        assert_eq!(top[0].product_id.0, "prod-2");
        assert_eq!(top[1].product_id.0, "prod-3");

        pool.close().await;
    }
}
