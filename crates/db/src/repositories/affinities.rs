use sqlx::{sqlite::SqliteRow, QueryBuilder, Row};

use slotwise_core::domain::affinity::{PairKey, ProductAffinity};
use slotwise_core::domain::product::ProductId;

use super::orders::{decode, parse_timestamp};
use super::{AffinityFilter, AffinityRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAffinityRepository {
    pool: DbPool,
}

impl SqlAffinityRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AffinityRepository for SqlAffinityRepository {
    async fn upsert_batch(
        &self,
        affinities: Vec<ProductAffinity>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for affinity in affinities {
            sqlx::query(
                "INSERT INTO product_affinity (
                    product_a, product_b, co_occurrence, affinity_score, confidence, computed_at
                 ) VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(product_a, product_b) DO UPDATE SET
                    co_occurrence = excluded.co_occurrence,
                    affinity_score = excluded.affinity_score,
                    confidence = excluded.confidence,
                    computed_at = excluded.computed_at",
            )
            .bind(&affinity.pair.product_a().0)
            .bind(&affinity.pair.product_b().0)
            .bind(affinity.co_occurrence as i64)
            .bind(affinity.affinity_score)
            .bind(affinity.confidence)
            .bind(affinity.computed_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list(&self, filter: AffinityFilter) -> Result<Vec<ProductAffinity>, RepositoryError> {
        let mut builder = QueryBuilder::new(
            "SELECT product_a, product_b, co_occurrence, affinity_score, confidence, computed_at
             FROM product_affinity WHERE 1 = 1",
        );

        if let Some(product_id) = &filter.product_id {
            builder
                .push(" AND (product_a = ")
                .push_bind(product_id.0.clone())
                .push(" OR product_b = ")
                .push_bind(product_id.0.clone())
                .push(")");
        }
        if let Some(min_co_occurrence) = filter.min_co_occurrence {
            builder.push(" AND co_occurrence >= ").push_bind(min_co_occurrence as i64);
        }

        builder.push(" ORDER BY affinity_score DESC, product_a ASC, product_b ASC");
        builder.push(" LIMIT ").push_bind(i64::from(filter.limit.unwrap_or(100)));
        builder.push(" OFFSET ").push_bind(i64::from(filter.offset.unwrap_or(0)));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(affinity_from_row).collect()
    }
}

fn affinity_from_row(row: SqliteRow) -> Result<ProductAffinity, RepositoryError> {
    let product_a: String = row.try_get("product_a").map_err(decode)?;
    let product_b: String = row.try_get("product_b").map_err(decode)?;
    let co_occurrence: i64 = row.try_get("co_occurrence").map_err(decode)?;
    let computed_at: String = row.try_get("computed_at").map_err(decode)?;

    let pair = PairKey::new(ProductId(product_a.clone()), ProductId(product_b.clone()))
        .ok_or_else(|| {
            RepositoryError::Decode(format!("stored self-pair ({product_a}, {product_b})"))
        })?;

    Ok(ProductAffinity {
        pair,
        co_occurrence: u64::try_from(co_occurrence).map_err(|_| {
            RepositoryError::Decode(format!("negative co-occurrence {co_occurrence}"))
        })?,
        affinity_score: row.try_get("affinity_score").map_err(decode)?,
        confidence: row.try_get("confidence").map_err(decode)?,
        computed_at: parse_timestamp(&computed_at)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use slotwise_core::domain::affinity::{PairKey, ProductAffinity};
    use slotwise_core::domain::product::ProductId;

    use super::{AffinityFilter, AffinityRepository, SqlAffinityRepository};
    use crate::{connect_with_settings, migrations};

    fn affinity(a: &str, b: &str, co_occurrence: u64) -> ProductAffinity {
        ProductAffinity {
            pair: PairKey::new(ProductId(a.to_string()), ProductId(b.to_string()))
                .expect("distinct products"),
            co_occurrence,
            affinity_score: (co_occurrence as f64 * 0.5).min(5.0),
            confidence: (co_occurrence as f64 / 10.0).min(1.0),
            computed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn batch_upsert_replaces_prior_values() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let repository = SqlAffinityRepository::new(pool.clone());

        repository
            .upsert_batch(vec![affinity("prod-a", "prod-b", 2), affinity("prod-a", "prod-c", 1)])
            .await
            .expect("first batch");
        repository
            .upsert_batch(vec![affinity("prod-a", "prod-b", 5)])
            .await
            .expect("second batch");

        let rows = repository.list(AffinityFilter::default()).await.expect("list");

        assert_eq!(rows.len(), 2);
        let ab = rows
            .iter()
            .find(|row| row.pair.product_b().0 == "prod-b")
            .expect("pair (a, b) exists");
        assert_eq!(ab.co_occurrence, 5);

        pool.close().await;
    }

    #[tokio::test]
    async fn list_can_filter_by_product_and_minimum_co_occurrence() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let repository = SqlAffinityRepository::new(pool.clone());

        repository
            .upsert_batch(vec![
                affinity("prod-a", "prod-b", 4),
                affinity("prod-b", "prod-c", 1),
                affinity("prod-c", "prod-d", 9),
            ])
            .await
            .expect("seed");

        let for_b = repository
            .list(AffinityFilter {
                product_id: Some(ProductId("prod-b".to_string())),
                ..AffinityFilter::default()
            })
            .await
            .expect("filter by product");
        assert_eq!(for_b.len(), 2);

        let frequent = repository
            .list(AffinityFilter { min_co_occurrence: Some(4), ..AffinityFilter::default() })
            .await
            .expect("filter by count");
        assert_eq!(frequent.len(), 2);

        pool.close().await;
    }
}
