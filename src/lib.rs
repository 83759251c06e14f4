// Estimate Reconciliation Engine - Core Library
// Compares an original repair estimate against its supplement: classifies
// line items, matches them across revisions, and computes variances,
// statistics, discrepancies, and a composite risk score.

pub mod model;          // Line-item data model and stable keys
pub mod error;          // Engine errors and per-item warnings
pub mod config;         // Explicit per-invocation configuration
pub mod classifier;     // Cost-category rules as data
pub mod reconciliation; // Multi-stage item matching
pub mod variance;       // Deltas and significance tiers
pub mod statistics;     // Subtotals, distributions, data quality
pub mod discrepancy;    // Anomaly checks
pub mod risk;           // Composite risk scoring
pub mod analysis;       // Pipeline orchestration
pub mod ingest;         // CSV loading for the CLI

// Re-export commonly used types
pub use model::{
    ClassifiedLineItem, CostCategory, DocumentSide, RawLineItem,
    normalize_description,
};
pub use error::{EngineError, ItemWarning, Result};
pub use config::{
    AnalysisConfig, DetectorConfig, FuzzyConfig, QualityWeights, RiskWeights,
    SignificanceThresholds,
};
pub use classifier::{CategoryRule, Classification, Classifier};
pub use reconciliation::{
    MatchSignals, MatchStage, MatchedItemPair, ReconciliationResult, Reconciler,
    ResidualItem, ResidualKind,
};
pub use variance::{ChangeKind, ItemVariance, Significance, VarianceCalculator};
pub use statistics::{
    CategorySubtotal, ChangeDistribution, DataQualityScore, DescriptiveStats,
    GrandTotal, StatisticsAggregator, VarianceStatistics,
};
pub use discrepancy::{
    Discrepancy, DiscrepancyDetector, DiscrepancySeverity, DiscrepancyType,
};
pub use risk::{RiskAssessment, RiskLevel, RiskScorer};
pub use analysis::{AnalysisEngine, ComparisonAnalysis, ProcessingMetadata};
pub use ingest::load_csv;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
