use sqlx::{sqlite::SqliteRow, Row};

use slotwise_core::domain::rule::{RuleId, RuleKind, SlottingRule};
use slotwise_core::domain::slot::WarehouseId;

use super::orders::{decode, parse_timestamp};
use super::{RepositoryError, RuleRepository};
use crate::DbPool;

pub struct SqlRuleRepository {
    pool: DbPool,
}

impl SqlRuleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RuleRepository for SqlRuleRepository {
    async fn save(&self, rule: SlottingRule) -> Result<(), RepositoryError> {
        let params_json = serde_json::to_string(&rule.kind)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO slotting_rule (
                id, warehouse_id, rule_type, params_json, priority, active, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                warehouse_id = excluded.warehouse_id,
                rule_type = excluded.rule_type,
                params_json = excluded.params_json,
                priority = excluded.priority,
                active = excluded.active,
                updated_at = excluded.updated_at",
        )
        .bind(&rule.id.0)
        .bind(&rule.warehouse_id.0)
        .bind(rule.kind.type_name())
        .bind(params_json)
        .bind(i64::from(rule.priority))
        .bind(rule.active)
        .bind(rule.created_at.to_rfc3339())
        .bind(rule.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &RuleId) -> Result<Option<SlottingRule>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, warehouse_id, params_json, priority, active, created_at, updated_at
             FROM slotting_rule WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(rule_from_row).transpose()
    }

    async fn list_for_warehouse(
        &self,
        warehouse_id: &WarehouseId,
        only_active: bool,
    ) -> Result<Vec<SlottingRule>, RepositoryError> {
        let rows = if only_active {
            sqlx::query(
                "SELECT id, warehouse_id, params_json, priority, active, created_at, updated_at
                 FROM slotting_rule
                 WHERE warehouse_id = ? AND active = 1
                 ORDER BY priority DESC, id ASC",
            )
            .bind(&warehouse_id.0)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT id, warehouse_id, params_json, priority, active, created_at, updated_at
                 FROM slotting_rule
                 WHERE warehouse_id = ?
                 ORDER BY priority DESC, id ASC",
            )
            .bind(&warehouse_id.0)
            .fetch_all(&self.pool)
            .await?
        };

        rows.into_iter().map(rule_from_row).collect()
    }

    async fn delete(&self, id: &RuleId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM slotting_rule WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn rule_from_row(row: SqliteRow) -> Result<SlottingRule, RepositoryError> {
    let params_json: String = row.try_get("params_json").map_err(decode)?;
    let priority: i64 = row.try_get("priority").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode)?;

    let kind: RuleKind = serde_json::from_str(&params_json)
        .map_err(|error| RepositoryError::Decode(format!("bad rule params: {error}")))?;

    Ok(SlottingRule {
        id: RuleId(row.try_get("id").map_err(decode)?),
        warehouse_id: WarehouseId(row.try_get("warehouse_id").map_err(decode)?),
        kind,
        priority: i32::try_from(priority)
            .map_err(|_| RepositoryError::Decode(format!("priority out of range: {priority}")))?,
        active: row.try_get("active").map_err(decode)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use slotwise_core::domain::product::ProductId;
    use slotwise_core::domain::rule::{RuleId, RuleKind, SlottingRule};
    use slotwise_core::domain::slot::WarehouseId;

    use super::{RuleRepository, SqlRuleRepository};
    use crate::{connect_with_settings, migrations};

    fn rule(priority: i32, active: bool) -> SlottingRule {
        let now = Utc::now();
        SlottingRule {
            id: RuleId::generate(),
            warehouse_id: WarehouseId("wh-main".to_string()),
            kind: RuleKind::ZoneRestriction {
                products: vec![ProductId("prod-solvent".to_string())],
                allowed_zones: vec!['H'],
            },
            priority,
            active,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn rules_round_trip_including_kind_parameters() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let repository = SqlRuleRepository::new(pool.clone());

        let stored = rule(5, true);
        repository.save(stored.clone()).await.expect("save");

        let loaded = repository.find_by_id(&stored.id).await.expect("query").expect("exists");
        assert_eq!(loaded.kind, stored.kind);
        assert_eq!(loaded.priority, 5);

        pool.close().await;
    }

    #[tokio::test]
    async fn active_filter_and_priority_ordering_hold() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let repository = SqlRuleRepository::new(pool.clone());

        repository.save(rule(1, true)).await.expect("save low");
        repository.save(rule(9, true)).await.expect("save high");
        repository.save(rule(5, false)).await.expect("save inactive");

        let active = repository
            .list_for_warehouse(&WarehouseId("wh-main".to_string()), true)
            .await
            .expect("list active");

        assert_eq!(active.len(), 2);
        assert_eq!(active[0].priority, 9, "highest priority first");

        pool.close().await;
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_was_removed() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let repository = SqlRuleRepository::new(pool.clone());

        let stored = rule(1, true);
        repository.save(stored.clone()).await.expect("save");

        assert!(repository.delete(&stored.id).await.expect("delete existing"));
        assert!(!repository.delete(&stored.id).await.expect("delete missing"));

        pool.close().await;
    }
}
