use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;

/// Canonical key for an unordered product pair. Construction sorts the two
/// ids lexicographically and refuses self-pairs, so `(X, Y)` and `(Y, X)`
/// always address the same row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    product_a: ProductId,
    product_b: ProductId,
}

impl PairKey {
    pub fn new(first: ProductId, second: ProductId) -> Option<Self> {
        if first == second {
            return None;
        }
        if first < second {
            Some(Self { product_a: first, product_b: second })
        } else {
            Some(Self { product_a: second, product_b: first })
        }
    }

    pub fn product_a(&self) -> &ProductId {
        &self.product_a
    }

    pub fn product_b(&self) -> &ProductId {
        &self.product_b
    }

    pub fn involves(&self, product: &ProductId) -> bool {
        &self.product_a == product || &self.product_b == product
    }
}

/// Pairwise affinity derived from order co-occurrence. One row per
/// unordered pair; each recalculation window replaces the prior values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductAffinity {
    pub pair: PairKey,
    pub co_occurrence: u64,
    pub affinity_score: f64,
    pub confidence: f64,
    pub computed_at: DateTime<Utc>,
}
