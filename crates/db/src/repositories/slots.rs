use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use slotwise_core::domain::product::ProductId;
use slotwise_core::domain::slot::{SlotCode, StorageSlot, WarehouseId};

use super::orders::decode;
use super::{RepositoryError, SlotRepository};
use crate::DbPool;

pub struct SqlSlotRepository {
    pool: DbPool,
}

impl SqlSlotRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SlotRepository for SqlSlotRepository {
    async fn list_for_warehouse(
        &self,
        warehouse_id: &WarehouseId,
    ) -> Result<Vec<StorageSlot>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT warehouse_id, code, assigned_product, capacity
             FROM storage_slot
             WHERE warehouse_id = ?
             ORDER BY code",
        )
        .bind(&warehouse_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(slot_from_row).collect()
    }

    async fn save(&self, slot: StorageSlot, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO storage_slot (warehouse_id, code, assigned_product, capacity, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(warehouse_id, code) DO UPDATE SET
                assigned_product = excluded.assigned_product,
                capacity = excluded.capacity,
                updated_at = excluded.updated_at",
        )
        .bind(&slot.warehouse_id.0)
        .bind(slot.code.to_string())
        .bind(slot.assigned_product.as_ref().map(|product| product.0.as_str()))
        .bind(slot.capacity.map(i64::from))
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn slot_from_row(row: SqliteRow) -> Result<StorageSlot, RepositoryError> {
    let code: String = row.try_get("code").map_err(decode)?;
    let capacity: Option<i64> = row.try_get("capacity").map_err(decode)?;

    Ok(StorageSlot {
        warehouse_id: WarehouseId(row.try_get("warehouse_id").map_err(decode)?),
        code: SlotCode::parse(&code)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        assigned_product: row
            .try_get::<Option<String>, _>("assigned_product")
            .map_err(decode)?
            .map(ProductId),
        capacity: capacity
            .map(|value| {
                u32::try_from(value)
                    .map_err(|_| RepositoryError::Decode(format!("negative capacity {value}")))
            })
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use slotwise_core::domain::product::ProductId;
    use slotwise_core::domain::slot::{SlotCode, StorageSlot, WarehouseId};

    use super::{SlotRepository, SqlSlotRepository};
    use crate::{connect_with_settings, migrations};

    fn slot(code: SlotCode, assigned: Option<&str>) -> StorageSlot {
        StorageSlot {
            warehouse_id: WarehouseId("wh-main".to_string()),
            code,
            assigned_product: assigned.map(|id| ProductId(id.to_string())),
            capacity: Some(1),
        }
    }

    #[tokio::test]
    async fn save_upserts_by_warehouse_and_code() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let repository = SqlSlotRepository::new(pool.clone());

        let code = SlotCode::new('A', 1, 1);
        repository.save(slot(code.clone(), None), Utc::now()).await.expect("insert");
        repository
            .save(slot(code.clone(), Some("prod-1")), Utc::now())
            .await
            .expect("update same key");

        let slots = repository
            .list_for_warehouse(&WarehouseId("wh-main".to_string()))
            .await
            .expect("list");
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].assigned_product, Some(ProductId("prod-1".to_string())));

        pool.close().await;
    }
}
