use std::collections::{BTreeMap, BTreeSet};

use crate::domain::affinity::PairKey;
use crate::domain::product::ProductId;
use crate::engine::frequency::FrequencyWindow;
use crate::engine::OrderLineRecord;

/// Tunables for the co-occurrence scan. The saturation count is the number
/// of joint appearances at which a pair is treated as statistically
/// reliable (confidence 1.0); the score weight scales raw counts into the
/// bounded score range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffinityConfig {
    pub saturation_count: u32,
    pub score_weight: f64,
    pub max_score: f64,
    /// Orders with more distinct products than this are skipped outright:
    /// pair generation is quadratic in order size and anomalous bulk orders
    /// would dominate the scan.
    pub max_items_per_order: usize,
}

impl AffinityConfig {
    pub const DEFAULT_SATURATION_COUNT: u32 = 10;
    pub const DEFAULT_SCORE_WEIGHT: f64 = 0.5;
    pub const DEFAULT_MAX_SCORE: f64 = 5.0;
    pub const DEFAULT_MAX_ITEMS_PER_ORDER: usize = 50;
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            saturation_count: Self::DEFAULT_SATURATION_COUNT,
            score_weight: Self::DEFAULT_SCORE_WEIGHT,
            max_score: Self::DEFAULT_MAX_SCORE,
            max_items_per_order: Self::DEFAULT_MAX_ITEMS_PER_ORDER,
        }
    }
}

/// One computed pair, not yet stamped with a persistence timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct ComputedAffinity {
    pub pair: PairKey,
    pub co_occurrence: u64,
    pub affinity_score: f64,
    pub confidence: f64,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct AffinityBatch {
    /// Canonically sorted by pair key; identical input yields identical
    /// output, byte for byte.
    pub pairs: Vec<ComputedAffinity>,
    pub orders_scanned: u64,
    pub oversize_orders_skipped: u64,
}

impl AffinityBatch {
    /// Mean of the product's strongest pair scores, the aggregate affinity
    /// signal consumed by the scorer. Zero when the product has no pairs.
    pub fn signal_for(&self, product: &ProductId, top_n: usize) -> f64 {
        if top_n == 0 {
            return 0.0;
        }
        let mut scores: Vec<f64> = self
            .pairs
            .iter()
            .filter(|entry| entry.pair.involves(product))
            .map(|entry| entry.affinity_score)
            .collect();
        if scores.is_empty() {
            return 0.0;
        }
        scores.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        scores.truncate(top_n);
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

#[derive(Clone, Debug, Default)]
pub struct AffinityCalculator {
    config: AffinityConfig,
}

impl AffinityCalculator {
    pub fn new(config: AffinityConfig) -> Self {
        Self { config }
    }

    /// Scans completed in-window orders and produces one affinity entry per
    /// unordered pair of products that appeared together. Orders with a
    /// single distinct product contribute no pairs. The whole computation
    /// is a deterministic function of the input rows.
    pub fn calculate(&self, lines: &[OrderLineRecord], window: &FrequencyWindow) -> AffinityBatch {
        let mut orders: BTreeMap<&str, BTreeSet<&ProductId>> = BTreeMap::new();
        for line in lines {
            if !line.completed || !window.contains(line.ordered_at) {
                continue;
            }
            orders.entry(line.order_id.as_str()).or_default().insert(&line.product_id);
        }

        let mut co_occurrence: BTreeMap<PairKey, u64> = BTreeMap::new();
        let mut orders_scanned = 0u64;
        let mut oversize_orders_skipped = 0u64;

        for products in orders.values() {
            if products.len() > self.config.max_items_per_order {
                oversize_orders_skipped += 1;
                continue;
            }
            orders_scanned += 1;

            let members: Vec<&ProductId> = products.iter().copied().collect();
            for (index, first) in members.iter().enumerate() {
                for second in &members[index + 1..] {
                    if let Some(pair) = PairKey::new((*first).clone(), (*second).clone()) {
                        *co_occurrence.entry(pair).or_insert(0) += 1;
                    }
                }
            }
        }

        let pairs = co_occurrence
            .into_iter()
            .map(|(pair, count)| ComputedAffinity {
                pair,
                co_occurrence: count,
                affinity_score: self.score(count),
                confidence: self.confidence(count),
            })
            .collect();

        AffinityBatch { pairs, orders_scanned, oversize_orders_skipped }
    }

    fn score(&self, co_occurrence: u64) -> f64 {
        (co_occurrence as f64 * self.config.score_weight).min(self.config.max_score)
    }

    fn confidence(&self, co_occurrence: u64) -> f64 {
        (co_occurrence as f64 / f64::from(self.config.saturation_count)).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{AffinityCalculator, AffinityConfig};
    use crate::domain::affinity::PairKey;
    use crate::domain::product::ProductId;
    use crate::engine::frequency::FrequencyWindow;
    use crate::engine::OrderLineRecord;

    fn line(order: &str, product: &str) -> OrderLineRecord {
        OrderLineRecord {
            order_id: order.to_string(),
            product_id: ProductId(product.to_string()),
            quantity: 1,
            ordered_at: Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap(),
            completed: true,
        }
    }

    fn window() -> FrequencyWindow {
        FrequencyWindow {
            start: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
        }
    }

    fn pair(a: &str, b: &str) -> PairKey {
        PairKey::new(ProductId(a.to_string()), ProductId(b.to_string())).unwrap()
    }

    #[test]
    fn co_occurrence_counts_match_the_order_scenario() {
        // Order 1: [A, B]; order 2: [A, B, C]; order 3: [D].
        let lines = vec![
            line("ord-1", "A"),
            line("ord-1", "B"),
            line("ord-2", "A"),
            line("ord-2", "B"),
            line("ord-2", "C"),
            line("ord-3", "D"),
        ];

        let batch = AffinityCalculator::default().calculate(&lines, &window());

        let by_pair = |key: PairKey| {
            batch.pairs.iter().find(|entry| entry.pair == key).map(|entry| entry.co_occurrence)
        };
        assert_eq!(by_pair(pair("A", "B")), Some(2));
        assert_eq!(by_pair(pair("A", "C")), Some(1));
        assert_eq!(by_pair(pair("B", "C")), Some(1));
        assert_eq!(batch.pairs.len(), 3, "no pair may involve the lone product D");
        assert_eq!(batch.orders_scanned, 3);
    }

    #[test]
    fn single_item_orders_contribute_no_pairs() {
        let lines = vec![line("ord-1", "A"), line("ord-2", "B")];
        let batch = AffinityCalculator::default().calculate(&lines, &window());
        assert!(batch.pairs.is_empty());
    }

    #[test]
    fn recomputation_is_deterministic() {
        let lines = vec![
            line("ord-1", "A"),
            line("ord-1", "C"),
            line("ord-2", "B"),
            line("ord-2", "A"),
            line("ord-3", "C"),
            line("ord-3", "B"),
            line("ord-3", "A"),
        ];
        let calculator = AffinityCalculator::default();

        let first = calculator.calculate(&lines, &window());
        let second = calculator.calculate(&lines, &window());

        assert_eq!(first, second);
    }

    #[test]
    fn scores_and_confidence_are_bounded() {
        let mut lines = Vec::new();
        for order in 0..25 {
            lines.push(line(&format!("ord-{order}"), "A"));
            lines.push(line(&format!("ord-{order}"), "B"));
        }

        let config = AffinityConfig::default();
        let batch = AffinityCalculator::new(config).calculate(&lines, &window());
        let entry = &batch.pairs[0];

        assert_eq!(entry.co_occurrence, 25);
        assert_eq!(entry.affinity_score, config.max_score);
        assert_eq!(entry.confidence, 1.0);
    }

    #[test]
    fn confidence_saturates_at_the_configured_count() {
        let lines = vec![
            line("ord-1", "A"),
            line("ord-1", "B"),
            line("ord-2", "A"),
            line("ord-2", "B"),
        ];
        let config = AffinityConfig { saturation_count: 4, ..AffinityConfig::default() };

        let batch = AffinityCalculator::new(config).calculate(&lines, &window());

        assert_eq!(batch.pairs[0].confidence, 0.5);
    }

    #[test]
    fn oversize_orders_are_skipped_and_counted() {
        let mut lines = Vec::new();
        for item in 0..4 {
            lines.push(line("ord-bulk", &format!("prod-{item}")));
        }
        lines.push(line("ord-small", "prod-0"));
        lines.push(line("ord-small", "prod-1"));

        let config = AffinityConfig { max_items_per_order: 3, ..AffinityConfig::default() };
        let batch = AffinityCalculator::new(config).calculate(&lines, &window());

        assert_eq!(batch.oversize_orders_skipped, 1);
        assert_eq!(batch.orders_scanned, 1);
        assert_eq!(batch.pairs.len(), 1, "only the small order contributes a pair");
    }

    #[test]
    fn signal_for_averages_the_top_scores() {
        let lines = vec![
            line("ord-1", "A"),
            line("ord-1", "B"),
            line("ord-2", "A"),
            line("ord-2", "B"),
            line("ord-3", "A"),
            line("ord-3", "C"),
        ];

        let batch = AffinityCalculator::default().calculate(&lines, &window());

        // A-B scores 1.0 (2 co-occurrences * 0.5), A-C scores 0.5.
        assert_eq!(batch.signal_for(&ProductId("A".into()), 3), 0.75);
        assert_eq!(batch.signal_for(&ProductId("A".into()), 1), 1.0);
        assert_eq!(batch.signal_for(&ProductId("D".into()), 3), 0.0);
    }
}
