use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;
use crate::domain::rule::{placement_allowed, SlottingRule};
use crate::domain::slot::{SlotCode, StorageSlot, WarehouseId};
use crate::errors::DomainError;

/// Relative contribution of each signal to the improvement-potential score.
/// Rotation rewards products that move a lot (more to gain by shortening
/// travel), distance rewards products currently stored far from the dock,
/// and affinity rewards products that ship together with others.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub rotation: f64,
    pub distance: f64,
    pub affinity: f64,
}

impl ScoringWeights {
    pub const DEFAULT_ROTATION: f64 = 0.3;
    pub const DEFAULT_DISTANCE: f64 = 0.4;
    pub const DEFAULT_AFFINITY: f64 = 0.3;
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            rotation: Self::DEFAULT_ROTATION,
            distance: Self::DEFAULT_DISTANCE,
            affinity: Self::DEFAULT_AFFINITY,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScorerConfig {
    pub weights: ScoringWeights,
    /// Movement count at which the rotation term saturates.
    pub rotation_scale: f64,
    /// Travel cost at which the distance term saturates.
    pub distance_scale: f64,
    /// Affinity signal at which the affinity term saturates; matches the
    /// affinity engine's maximum score.
    pub affinity_scale: f64,
    /// Improvement potential above which relocation into the fast zone is
    /// recommended instead of retaining the current slot.
    pub relocation_threshold: f64,
    /// Zone closest to the shipping dock.
    pub fast_zone: char,
    /// How many of a product's strongest pair scores feed its affinity
    /// signal.
    pub top_affinity_count: usize,
}

impl ScorerConfig {
    pub const DEFAULT_ROTATION_SCALE: f64 = 100.0;
    pub const DEFAULT_DISTANCE_SCALE: f64 = 100.0;
    pub const DEFAULT_RELOCATION_THRESHOLD: f64 = 50.0;
    pub const DEFAULT_FAST_ZONE: char = 'A';
    pub const DEFAULT_TOP_AFFINITY_COUNT: usize = 3;
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            rotation_scale: Self::DEFAULT_ROTATION_SCALE,
            distance_scale: Self::DEFAULT_DISTANCE_SCALE,
            affinity_scale: super::affinity::AffinityConfig::DEFAULT_MAX_SCORE,
            relocation_threshold: Self::DEFAULT_RELOCATION_THRESHOLD,
            fast_zone: Self::DEFAULT_FAST_ZONE,
            top_affinity_count: Self::DEFAULT_TOP_AFFINITY_COUNT,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScoreInputs {
    pub rotation_frequency: u64,
    pub picking_distance: f64,
    pub affinity_signal: f64,
    pub seasonality_factor: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScoringOutcome {
    pub improvement_potential: f64,
    pub recommended_location: SlotCode,
    /// True when the recommendation differs from the current slot.
    pub relocate: bool,
}

#[derive(Clone, Debug, Default)]
pub struct SlottingScorer {
    config: ScorerConfig,
}

impl SlottingScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Bounded [0,100] estimate of the operational benefit of relocating a
    /// product: a weighted sum of saturating rotation, distance, and
    /// affinity terms, scaled by the seasonality multiplier.
    pub fn improvement_potential(&self, inputs: &ScoreInputs) -> f64 {
        let weights = &self.config.weights;
        let rotation = saturate(inputs.rotation_frequency as f64, self.config.rotation_scale);
        let distance = saturate(inputs.picking_distance, self.config.distance_scale);
        let affinity = saturate(inputs.affinity_signal, self.config.affinity_scale);

        let combined =
            weights.rotation * rotation + weights.distance * distance + weights.affinity * affinity;
        (combined.clamp(0.0, 1.0) * inputs.seasonality_factor * 100.0).clamp(0.0, 100.0)
    }

    /// Scores one product and picks a deterministic target slot. `current`
    /// must be the product's existing slot in the warehouse; a product
    /// without a baseline yields `NoCurrentLocation` rather than a guess.
    ///
    /// `candidates` are the warehouse's slots; only available ones that the
    /// rule set permits for this product are considered, and `claimed`
    /// excludes slots already promised to higher-ranked products within the
    /// same pass.
    pub fn score_product(
        &self,
        product: &ProductId,
        warehouse_id: &WarehouseId,
        current: Option<&SlotCode>,
        inputs: &ScoreInputs,
        candidates: &[StorageSlot],
        rules: &[SlottingRule],
        claimed: &[SlotCode],
    ) -> Result<ScoringOutcome, DomainError> {
        let current = current.ok_or_else(|| DomainError::NoCurrentLocation {
            product_id: product.clone(),
            warehouse_id: warehouse_id.clone(),
        })?;

        let improvement_potential = self.improvement_potential(inputs);
        if improvement_potential < self.config.relocation_threshold {
            return Ok(ScoringOutcome {
                improvement_potential,
                recommended_location: current.clone(),
                relocate: false,
            });
        }

        let mut permitted: Vec<&StorageSlot> = candidates
            .iter()
            .filter(|slot| {
                slot.is_available()
                    && slot.code != *current
                    && !claimed.contains(&slot.code)
                    && placement_allowed(rules, product, &slot.code)
            })
            .collect();
        permitted.sort_by(|a, b| {
            a.code
                .travel_cost()
                .partial_cmp(&b.code.travel_cost())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.code.cmp(&b.code))
        });

        let fast_zone = self.config.fast_zone;
        let target = permitted
            .iter()
            .find(|slot| slot.code.zone == fast_zone)
            .or_else(|| {
                permitted.iter().find(|slot| slot.code.travel_cost() < current.travel_cost())
            })
            .map(|slot| slot.code.clone());

        match target {
            Some(code) => Ok(ScoringOutcome {
                improvement_potential,
                recommended_location: code,
                relocate: true,
            }),
            // Nothing better is free: retain the current slot.
            None => Ok(ScoringOutcome {
                improvement_potential,
                recommended_location: current.clone(),
                relocate: false,
            }),
        }
    }
}

fn saturate(value: f64, scale: f64) -> f64 {
    if scale <= 0.0 {
        return 0.0;
    }
    (value / scale).clamp(0.0, 1.0)
}
