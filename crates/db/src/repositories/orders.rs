use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use slotwise_core::domain::product::ProductId;
use slotwise_core::domain::slot::WarehouseId;
use slotwise_core::engine::frequency::FrequencyWindow;
use slotwise_core::engine::OrderLineRecord;

use super::{OrderHistorySource, RepositoryError};
use crate::DbPool;

/// Reads the order subsystem's reference tables. The upstream source of
/// truth marks fulfilled orders with status `completed`.
pub struct SqlOrderHistory {
    pool: DbPool,
}

impl SqlOrderHistory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OrderHistorySource for SqlOrderHistory {
    async fn completed_lines(
        &self,
        warehouse_id: &WarehouseId,
        window: &FrequencyWindow,
    ) -> Result<Vec<OrderLineRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                line.order_id,
                line.product_id,
                line.quantity,
                header.created_at,
                header.status
             FROM order_line AS line
             JOIN order_header AS header ON header.id = line.order_id
             WHERE header.warehouse_id = ?
               AND header.status = 'completed'
               AND header.created_at >= ?
               AND header.created_at < ?
             ORDER BY line.order_id, line.product_id",
        )
        .bind(&warehouse_id.0)
        .bind(window.start.to_rfc3339())
        .bind(window.end.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(line_from_row).collect()
    }
}

fn line_from_row(row: SqliteRow) -> Result<OrderLineRecord, RepositoryError> {
    let quantity: i64 = row.try_get("quantity").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;

    Ok(OrderLineRecord {
        order_id: row.try_get("order_id").map_err(decode)?,
        product_id: ProductId(row.try_get("product_id").map_err(decode)?),
        quantity: u32::try_from(quantity)
            .map_err(|_| RepositoryError::Decode(format!("negative quantity {quantity}")))?,
        ordered_at: parse_timestamp(&created_at)?,
        completed: status == "completed",
    })
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("bad timestamp `{raw}`: {error}")))
}

pub(crate) fn decode(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}
