use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_WAREHOUSE: &str = "wh-main";
const SEED_SLOT_COUNT: i64 = 8;
const SEED_COMPLETED_ORDER_COUNT: i64 = 6;
const SEED_RULE_IDS: &[&str] = &["rule-seed-staging"];

/// Deterministic demo dataset: one warehouse with a small slot grid, an
/// exclusion rule, and a month of completed order history whose products
/// co-occur enough to exercise the affinity and scoring paths.
pub struct SeedDataset;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub warehouse_id: &'static str,
    pub slots_seeded: i64,
    pub orders_seeded: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub passed: bool,
    pub failures: Vec<String>,
}

impl SeedDataset {
    /// SQL fixture content, embedded so the CLI seed command works from any
    /// working directory.
    pub const SQL: &'static str = include_str!("../../../config/fixtures/seed_data.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            warehouse_id: SEED_WAREHOUSE,
            slots_seeded: SEED_SLOT_COUNT,
            orders_seeded: SEED_COMPLETED_ORDER_COUNT,
        })
    }

    /// Checks that the fixture rows exist and match the seed contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut failures = Vec::new();

        let slot_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM storage_slot WHERE warehouse_id = ?",
        )
        .bind(SEED_WAREHOUSE)
        .fetch_one(pool)
        .await?;
        if slot_count != SEED_SLOT_COUNT {
            failures.push(format!("expected {SEED_SLOT_COUNT} seeded slots, found {slot_count}"));
        }

        let completed_orders: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM order_header WHERE warehouse_id = ? AND status = 'completed'",
        )
        .bind(SEED_WAREHOUSE)
        .fetch_one(pool)
        .await?;
        if completed_orders != SEED_COMPLETED_ORDER_COUNT {
            failures.push(format!(
                "expected {SEED_COMPLETED_ORDER_COUNT} completed seed orders, found {completed_orders}"
            ));
        }

        let orphan_lines: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM order_line
             WHERE order_id NOT IN (SELECT id FROM order_header)",
        )
        .fetch_one(pool)
        .await?;
        if orphan_lines != 0 {
            failures.push(format!("found {orphan_lines} order lines without a header"));
        }

        for rule_id in SEED_RULE_IDS {
            let present: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM slotting_rule WHERE id = ?")
                    .bind(rule_id)
                    .fetch_one(pool)
                    .await?;
            if present != 1 {
                failures.push(format!("seed rule `{rule_id}` is missing"));
            }
        }

        Ok(VerificationResult { passed: failures.is_empty(), failures })
    }
}

#[cfg(test)]
mod tests {
    use super::SeedDataset;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn seed_loads_and_verifies_on_a_fresh_database() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");

        let result = SeedDataset::load(&pool).await.expect("load seed");
        assert_eq!(result.warehouse_id, "wh-main");

        let verification = SeedDataset::verify(&pool).await.expect("verify seed");
        assert!(verification.passed, "failures: {:?}", verification.failures);

        pool.close().await;
    }

    #[tokio::test]
    async fn seed_load_is_idempotent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");

        SeedDataset::load(&pool).await.expect("first load");
        SeedDataset::load(&pool).await.expect("second load");

        let verification = SeedDataset::verify(&pool).await.expect("verify seed");
        assert!(verification.passed, "failures: {:?}", verification.failures);

        pool.close().await;
    }
}
