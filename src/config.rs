// ⚙️ Analysis Configuration - Explicit, fully enumerated settings
// Every tunable lives here with a documented default and is validated at the
// entry point; there is no hidden global state.

use anyhow::{Context as AnyhowContext, Result as AnyhowResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::classifier::CategoryRule;
use crate::error::{EngineError, Result};

// ============================================================================
// FUZZY MATCHING
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyConfig {
    /// Skip the fuzzy stage entirely when false.
    pub enabled: bool,

    /// Minimum normalized description similarity for a candidate pair.
    /// Source documents disagree between 0.6 and 0.8; 0.70 is the tunable
    /// default, not a behavioral guarantee.
    pub similarity_threshold: f64,

    /// Allow fuzzy pairs across cost categories. Off by default; such pairs
    /// get no category bonus and must clear the threshold on description
    /// similarity alone.
    pub allow_cross_category: bool,

    /// Composite score weights. description_weight + category_bonus +
    /// price_bonus must not exceed 1.0 so the composite stays in [0, 1].
    pub description_weight: f64,
    pub category_bonus: f64,
    pub price_bonus: f64,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        FuzzyConfig {
            enabled: true,
            similarity_threshold: 0.70,
            allow_cross_category: false,
            description_weight: 0.70,
            category_bonus: 0.15,
            price_bonus: 0.15,
        }
    }
}

// ============================================================================
// SIGNIFICANCE THRESHOLDS
// ============================================================================

/// Two independent ladders: a variance is elevated to a tier when EITHER its
/// percentage change or its absolute dollar change crosses the bound. A small
/// percentage on a large amount matters as much as the reverse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignificanceThresholds {
    pub minor_pct: f64,
    pub moderate_pct: f64,
    pub major_pct: f64,
    pub extreme_pct: f64,

    pub minor_amount: f64,
    pub moderate_amount: f64,
    pub major_amount: f64,
    pub extreme_amount: f64,
}

impl Default for SignificanceThresholds {
    fn default() -> Self {
        SignificanceThresholds {
            minor_pct: 5.0,
            moderate_pct: 15.0,
            major_pct: 50.0,
            extreme_pct: 100.0,
            minor_amount: 50.0,
            moderate_amount: 250.0,
            major_amount: 1000.0,
            extreme_amount: 5000.0,
        }
    }
}

// ============================================================================
// DISCREPANCY DETECTION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Tolerance for |quantity × price − total| before it counts as a
    /// calculation error. Also used for the consistency quality check.
    pub calculation_tolerance: f64,

    /// Normalized description similarity above which two same-priced items
    /// in one document are treated as a duplicate candidate.
    pub duplicate_similarity: f64,

    /// Fraction of round-number prices considered normal; a higher observed
    /// rate flags round-number bias.
    pub round_number_baseline: f64,

    /// Minimum priced items before the round-number check has any power.
    pub round_number_min_items: usize,

    /// Z-score beyond which a unit price is a markup outlier within its
    /// category.
    pub markup_z_threshold: f64,

    /// Minimum original category total before missing supplement coverage is
    /// worth surfacing.
    pub missing_category_floor: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            calculation_tolerance: 0.01,
            duplicate_similarity: 0.92,
            round_number_baseline: 0.40,
            round_number_min_items: 5,
            markup_z_threshold: 3.0,
            missing_category_floor: 100.0,
        }
    }
}

// ============================================================================
// RISK & QUALITY WEIGHTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub variance: f64,
    pub discrepancy: f64,
    pub anomaly: f64,
    /// Summed discrepancy severity points are capped here before
    /// normalization.
    pub severity_cap: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        RiskWeights {
            variance: 0.50,
            discrepancy: 0.35,
            anomaly: 0.15,
            severity_cap: 20.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub completeness: f64,
    pub consistency: f64,
    pub confidence: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        QualityWeights {
            completeness: 0.40,
            consistency: 0.40,
            confidence: 0.20,
        }
    }
}

// ============================================================================
// ANALYSIS CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub fuzzy: FuzzyConfig,
    pub significance: SignificanceThresholds,
    pub detector: DetectorConfig,
    pub risk: RiskWeights,
    pub quality: QualityWeights,

    /// Relative price tolerance for the category-and-price fallback stage.
    pub fallback_price_tolerance: f64,

    /// Decimal places for monetary rounding in the output.
    pub money_scale: i64,

    /// Override for the built-in classification rule table.
    pub rules: Option<Vec<CategoryRule>>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            fuzzy: FuzzyConfig::default(),
            significance: SignificanceThresholds::default(),
            detector: DetectorConfig::default(),
            risk: RiskWeights::default(),
            quality: QualityWeights::default(),
            fallback_price_tolerance: 0.10,
            money_scale: 2,
            rules: None,
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from a JSON file. Missing fields fall back to the
    /// documented defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AnyhowResult<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: AnalysisConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        Ok(config)
    }

    /// Validate at the entry point, before any stage runs.
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f64| -> Result<()> {
            if !(0.0..=1.0).contains(&v) || !v.is_finite() {
                return Err(EngineError::Validation(format!(
                    "{} must be in [0, 1], got {}",
                    name, v
                )));
            }
            Ok(())
        };

        unit("fuzzy.similarity_threshold", self.fuzzy.similarity_threshold)?;
        unit("fuzzy.description_weight", self.fuzzy.description_weight)?;
        unit("fuzzy.category_bonus", self.fuzzy.category_bonus)?;
        unit("fuzzy.price_bonus", self.fuzzy.price_bonus)?;
        unit("detector.duplicate_similarity", self.detector.duplicate_similarity)?;
        unit("detector.round_number_baseline", self.detector.round_number_baseline)?;
        unit("quality.completeness", self.quality.completeness)?;
        unit("quality.consistency", self.quality.consistency)?;
        unit("quality.confidence", self.quality.confidence)?;

        let weight_sum = self.fuzzy.description_weight
            + self.fuzzy.category_bonus
            + self.fuzzy.price_bonus;
        if weight_sum > 1.0 + f64::EPSILON {
            return Err(EngineError::Validation(format!(
                "fuzzy weights must sum to at most 1.0, got {}",
                weight_sum
            )));
        }

        let pct = &self.significance;
        if !(pct.minor_pct < pct.moderate_pct
            && pct.moderate_pct < pct.major_pct
            && pct.major_pct < pct.extreme_pct)
        {
            return Err(EngineError::Validation(
                "significance percentage thresholds must be strictly increasing".to_string(),
            ));
        }
        if !(pct.minor_amount < pct.moderate_amount
            && pct.moderate_amount < pct.major_amount
            && pct.major_amount < pct.extreme_amount)
        {
            return Err(EngineError::Validation(
                "significance amount thresholds must be strictly increasing".to_string(),
            ));
        }

        if self.fallback_price_tolerance < 0.0 || !self.fallback_price_tolerance.is_finite() {
            return Err(EngineError::Validation(format!(
                "fallback_price_tolerance must be non-negative, got {}",
                self.fallback_price_tolerance
            )));
        }

        if !(0..=8).contains(&self.money_scale) {
            return Err(EngineError::Validation(format!(
                "money_scale must be between 0 and 8, got {}",
                self.money_scale
            )));
        }

        let risk_sum = self.risk.variance + self.risk.discrepancy + self.risk.anomaly;
        if risk_sum <= 0.0 || self.risk.variance < 0.0 || self.risk.discrepancy < 0.0 || self.risk.anomaly < 0.0 {
            return Err(EngineError::Validation(
                "risk weights must be non-negative with a positive sum".to_string(),
            ));
        }
        if self.risk.severity_cap <= 0.0 {
            return Err(EngineError::Validation(
                "risk.severity_cap must be positive".to_string(),
            ));
        }

        let quality_sum =
            self.quality.completeness + self.quality.consistency + self.quality.confidence;
        if quality_sum <= 0.0 {
            return Err(EngineError::Validation(
                "quality weights must have a positive sum".to_string(),
            ));
        }

        if self.detector.calculation_tolerance < 0.0 {
            return Err(EngineError::Validation(
                "detector.calculation_tolerance must be non-negative".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
