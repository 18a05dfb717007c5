use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::domain::product::ProductId;
use crate::engine::OrderLineRecord;

/// Trailing time window over order creation timestamps. Half-open:
/// `start <= t < end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrequencyWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FrequencyWindow {
    pub fn trailing_days(end: DateTime<Utc>, days: i64) -> Self {
        Self { start: end - chrono::Duration::days(days), end }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Movement count per product: the sum of order-line quantities across
/// completed orders created inside the window, optionally restricted to a
/// product set. Products without in-window movement are absent from the
/// map; callers treat absence as zero, a valid signal rather than a fault.
pub fn aggregate_pick_frequency(
    lines: &[OrderLineRecord],
    window: &FrequencyWindow,
    products: Option<&HashSet<ProductId>>,
) -> HashMap<ProductId, u64> {
    let mut movement: HashMap<ProductId, u64> = HashMap::new();

    for line in lines {
        if !line.completed || !window.contains(line.ordered_at) {
            continue;
        }
        if let Some(scope) = products {
            if !scope.contains(&line.product_id) {
                continue;
            }
        }
        *movement.entry(line.product_id.clone()).or_insert(0) += u64::from(line.quantity);
    }

    movement
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{TimeZone, Utc};

    use super::{aggregate_pick_frequency, FrequencyWindow};
    use crate::domain::product::ProductId;
    use crate::engine::OrderLineRecord;

    fn line(order: &str, product: &str, quantity: u32, day: u32, completed: bool) -> OrderLineRecord {
        OrderLineRecord {
            order_id: order.to_string(),
            product_id: ProductId(product.to_string()),
            quantity,
            ordered_at: Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap(),
            completed,
        }
    }

    fn march_window() -> FrequencyWindow {
        FrequencyWindow {
            start: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn sums_quantities_across_completed_orders_in_window() {
        let lines = vec![
            line("ord-1", "prod-a", 3, 5, true),
            line("ord-2", "prod-a", 2, 12, true),
            line("ord-3", "prod-b", 1, 20, true),
        ];

        let movement = aggregate_pick_frequency(&lines, &march_window(), None);

        assert_eq!(movement.get(&ProductId("prod-a".into())), Some(&5));
        assert_eq!(movement.get(&ProductId("prod-b".into())), Some(&1));
    }

    #[test]
    fn ignores_incomplete_orders_and_lines_outside_window() {
        let mut outside = line("ord-4", "prod-a", 9, 5, true);
        outside.ordered_at = Utc.with_ymd_and_hms(2024, 2, 5, 12, 0, 0).unwrap();

        let lines = vec![line("ord-5", "prod-a", 4, 10, false), outside];
        let movement = aggregate_pick_frequency(&lines, &march_window(), None);

        assert!(movement.is_empty(), "nothing qualifies, absence of movement is the signal");
    }

    #[test]
    fn product_scope_restricts_the_result() {
        let lines = vec![line("ord-6", "prod-a", 2, 8, true), line("ord-6", "prod-b", 2, 8, true)];
        let scope: HashSet<ProductId> = [ProductId("prod-b".into())].into_iter().collect();

        let movement = aggregate_pick_frequency(&lines, &march_window(), Some(&scope));

        assert_eq!(movement.len(), 1);
        assert_eq!(movement.get(&ProductId("prod-b".into())), Some(&2));
    }
}
