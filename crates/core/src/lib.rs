pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;

pub use domain::affinity::{PairKey, ProductAffinity};
pub use domain::analytic::{AnalyticId, AnalyticStatus, SlottingAnalytic};
pub use domain::job::{
    JobId, JobMetrics, JobStatus, JobType, OptimizationJob, SkippedProduct, SkipReason,
};
pub use domain::product::ProductId;
pub use domain::rule::{RuleId, RuleKind, SlottingRule};
pub use domain::slot::{SlotCode, SlotCodeParseError, StorageSlot, WarehouseId};
pub use engine::affinity::{AffinityBatch, AffinityCalculator, AffinityConfig, ComputedAffinity};
pub use engine::frequency::{aggregate_pick_frequency, FrequencyWindow};
pub use engine::scorer::{ScoreInputs, ScorerConfig, ScoringOutcome, ScoringWeights, SlottingScorer};
pub use engine::OrderLineRecord;
pub use errors::{ApplicationError, DomainError, InterfaceError};
