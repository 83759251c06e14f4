// 🧮 Comparison Analysis - The full pipeline, one invocation, one result
// Classify → reconcile → variance → statistics → discrepancies → risk.
// Every stage is a pure transformation; the result object is built once and
// never mutated by consumers.

use std::time::Instant;

use bigdecimal::{BigDecimal, FromPrimitive, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::Classifier;
use crate::config::AnalysisConfig;
use crate::discrepancy::{Discrepancy, DiscrepancyDetector};
use crate::error::{EngineError, ItemWarning, Result};
use crate::model::{
    item_key, normalize_description, ClassifiedLineItem, DocumentSide, RawLineItem,
};
use crate::reconciliation::{ReconciliationResult, Reconciler};
use crate::risk::{RiskAssessment, RiskScorer};
use crate::statistics::{StatisticsAggregator, VarianceStatistics};
use crate::variance::{ItemVariance, VarianceCalculator};

/// Malformed items keep flowing through matching, but never with more
/// classification confidence than this.
const WARNED_CONFIDENCE_CEILING: f64 = 0.30;

// ============================================================================
// RESULT OBJECT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub analyzed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub engine_version: String,
}

/// The root output: everything a review dashboard or report generator needs
/// without re-running any matching or statistics logic.
///
/// Deterministic in every field except `metadata` (timestamp and duration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonAnalysis {
    pub original_items: Vec<ClassifiedLineItem>,
    pub supplement_items: Vec<ClassifiedLineItem>,
    pub reconciliation: ReconciliationResult,
    pub variances: Vec<ItemVariance>,
    pub statistics: VarianceStatistics,
    pub discrepancies: Vec<Discrepancy>,
    pub risk: RiskAssessment,
    pub metadata: ProcessingMetadata,
}

impl ComparisonAnalysis {
    pub fn summary(&self) -> String {
        format!(
            "{} original vs {} supplement items: {} matched, {} removed, {} new | net change {} | {} discrepancies | risk {:.0} ({:?})",
            self.original_items.len(),
            self.supplement_items.len(),
            self.reconciliation.matched.len(),
            self.reconciliation.unmatched_original.len(),
            self.reconciliation.new_supplement.len(),
            self.statistics.grand_total.net_change,
            self.discrepancies.len(),
            self.risk.score,
            self.risk.level,
        )
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct AnalysisEngine {
    config: AnalysisConfig,
    classifier: Classifier,
}

impl AnalysisEngine {
    /// Validates the configuration up front; a bad config never reaches a
    /// stage.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let classifier = match &config.rules {
            Some(rules) => Classifier::from_rules(rules.clone()),
            None => Classifier::new(),
        };
        Ok(AnalysisEngine { config, classifier })
    }

    /// Engine with the documented default configuration.
    pub fn with_defaults() -> Self {
        AnalysisEngine {
            config: AnalysisConfig::default(),
            classifier: Classifier::new(),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run the full pipeline over two raw item lists.
    pub fn analyze(
        &self,
        original: &[RawLineItem],
        supplement: &[RawLineItem],
    ) -> Result<ComparisonAnalysis> {
        let started = Instant::now();
        tracing::info!(
            original = original.len(),
            supplement = supplement.len(),
            "starting comparison analysis"
        );

        let original_items = self.prepare(DocumentSide::Original, original)?;
        let supplement_items = self.prepare(DocumentSide::Supplement, supplement)?;

        let reconciler = Reconciler::new(
            self.config.fuzzy.clone(),
            self.config.fallback_price_tolerance,
        );
        let reconciliation = reconciler.reconcile(&original_items, &supplement_items)?;

        let variances = VarianceCalculator::new(
            self.config.significance.clone(),
            self.config.money_scale,
        )
        .annotate(&reconciliation);

        let statistics = StatisticsAggregator::new(
            self.config.quality.clone(),
            self.config.detector.calculation_tolerance,
            self.config.money_scale,
        )
        .aggregate(&original_items, &supplement_items, &variances);

        let discrepancies = DiscrepancyDetector::new(
            self.config.detector.clone(),
            self.config.money_scale,
        )
        .detect(&original_items, &supplement_items, &reconciliation);

        let risk = RiskScorer::new(self.config.risk.clone()).assess(
            &statistics,
            &variances,
            &discrepancies,
        );

        self.assert_net_change(&statistics, &variances, &original_items, &supplement_items)?;

        let analysis = ComparisonAnalysis {
            original_items,
            supplement_items,
            reconciliation,
            variances,
            statistics,
            discrepancies,
            risk,
            metadata: ProcessingMetadata {
                analyzed_at: Utc::now(),
                duration_ms: started.elapsed().as_millis() as u64,
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        tracing::info!("{}", analysis.summary());
        Ok(analysis)
    }

    // ------------------------------------------------------------------------
    // Shape and range validation plus classification. Item-level defects
    // become warnings and a confidence ceiling; only structurally impossible
    // input is fatal.
    // ------------------------------------------------------------------------
    fn prepare(
        &self,
        side: DocumentSide,
        items: &[RawLineItem],
    ) -> Result<Vec<ClassifiedLineItem>> {
        let tolerance = BigDecimal::from_f64(self.config.detector.calculation_tolerance)
            .unwrap_or_else(BigDecimal::zero);

        items
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                if raw.quantity < BigDecimal::zero() {
                    return Err(EngineError::Validation(format!(
                        "{} item {} has negative quantity {}",
                        side.name(),
                        index + 1,
                        raw.quantity,
                    )));
                }

                let mut warnings = Vec::new();
                if raw.description.trim().is_empty() {
                    warnings.push(ItemWarning::new("description", "description is empty"));
                }
                let expected = &raw.quantity * &raw.unit_price;
                if (&expected - &raw.total).abs() > tolerance {
                    warnings.push(ItemWarning::new(
                        "total",
                        format!(
                            "quantity × price = {} disagrees with stated total {}",
                            expected, raw.total,
                        ),
                    ));
                }

                let classification = self.classifier.classify(raw);
                let confidence = if warnings.is_empty() {
                    classification.confidence
                } else {
                    classification.confidence.min(WARNED_CONFIDENCE_CEILING)
                };

                let normalized = normalize_description(&raw.description);
                Ok(ClassifiedLineItem {
                    key: item_key(side, index, &normalized),
                    side,
                    index,
                    raw: raw.clone(),
                    normalized,
                    category: classification.category,
                    confidence,
                    warnings,
                })
            })
            .collect()
    }

    /// Net-change reconstruction: the grand total computed top-down must
    /// equal the sum of per-item signed variances bottom-up, within a cent.
    fn assert_net_change(
        &self,
        statistics: &VarianceStatistics,
        variances: &[ItemVariance],
        original: &[ClassifiedLineItem],
        supplement: &[ClassifiedLineItem],
    ) -> Result<()> {
        let bottom_up: BigDecimal = variances.iter().map(|v| &v.total_delta).sum();
        let gap = (&bottom_up - &statistics.grand_total.net_change).abs();
        let tolerance = BigDecimal::from_f64(0.01).unwrap_or_else(BigDecimal::zero);

        if gap > tolerance {
            return Err(EngineError::Reconciliation {
                message: format!(
                    "net change {} cannot be reconstructed from per-item variances ({})",
                    statistics.grand_total.net_change, bottom_up,
                ),
                original_count: original.len(),
                supplement_count: supplement.len(),
            });
        }
        Ok(())
    }
}

impl Default for AnalysisEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciliation::MatchStage;
    use crate::risk::RiskLevel;
    use crate::variance::ChangeKind;
    use std::str::FromStr;

    fn raw(description: &str, quantity: &str, unit_price: &str, total: &str) -> RawLineItem {
        RawLineItem::new(
            description,
            BigDecimal::from_str(quantity).unwrap(),
            BigDecimal::from_str(unit_price).unwrap(),
            BigDecimal::from_str(total).unwrap(),
        )
    }

    fn engine() -> AnalysisEngine {
        AnalysisEngine::with_defaults()
    }

    /// The analysis serialized without its (intentionally varying) metadata.
    fn analytical_json(analysis: &ComparisonAnalysis) -> String {
        let mut value = serde_json::to_value(analysis).unwrap();
        value.as_object_mut().unwrap().remove("metadata");
        serde_json::to_string(&value).unwrap()
    }

    fn rich_original() -> Vec<RawLineItem> {
        vec![
            raw("Replace front bumper cover", "1", "350.00", "350.00"),
            raw("Refinish hood", "2", "90.00", "180.00"),
            raw("Paint supplies kit", "1", "100.00", "100.00"),
            raw("Front bumper cover", "1", "389.50", "389.50"),
            raw("Hazardous waste disposal", "1", "15.00", "15.00"),
        ]
    }

    fn rich_supplement() -> Vec<RawLineItem> {
        vec![
            raw("Refinish hood", "2", "90.00", "180.00"),
            raw("Replace frnt bumper cvr", "1", "362.00", "362.00"),
            raw("Primer and sealant pack", "1", "104.00", "104.00"),
            raw("Additional diagnostic service", "1", "120.00", "120.00"),
            raw("Front bumper cover", "1", "389.50", "389.50"),
        ]
    }

    #[test]
    fn test_scenario_a_price_increase() {
        let original = [raw("Engine Oil Change", "1", "50.00", "50.00")];
        let supplement = [raw("Engine Oil Change", "1", "75.00", "75.00")];

        let analysis = engine().analyze(&original, &supplement).unwrap();

        assert_eq!(analysis.reconciliation.matched.len(), 1);
        assert_eq!(analysis.reconciliation.matched[0].stage, MatchStage::Exact);

        let v = &analysis.variances[0];
        assert_eq!(v.total_delta, BigDecimal::from_str("25.00").unwrap());
        assert_eq!(v.total_pct, Some(50.0));
        assert_eq!(
            analysis.statistics.grand_total.net_change,
            BigDecimal::from_str("25.00").unwrap()
        );
    }

    #[test]
    fn test_scenario_b_new_item() {
        let original = [raw("Refinish hood", "1", "180.00", "180.00")];
        let supplement = [
            raw("Refinish hood", "1", "180.00", "180.00"),
            raw("Additional Diagnostic Service", "1", "120.00", "120.00"),
        ];

        let analysis = engine().analyze(&original, &supplement).unwrap();

        assert_eq!(analysis.reconciliation.new_supplement.len(), 1);
        let new_row = analysis
            .variances
            .iter()
            .find(|v| v.change == ChangeKind::New)
            .unwrap();
        assert_eq!(new_row.total_delta, BigDecimal::from_str("120.00").unwrap());
        assert_eq!(new_row.total_pct, None);
    }

    #[test]
    fn test_scenario_c_total_coverage_loss() {
        let original = [
            raw("Replace front bumper cover", "1", "400.00", "400.00"),
            raw("Refinish hood", "2", "175.00", "350.00"),
            raw("Paint supplies kit", "1", "250.00", "250.00"),
        ];

        let analysis = engine().analyze(&original, &[]).unwrap();

        assert_eq!(analysis.reconciliation.unmatched_original.len(), 3);
        assert_eq!(
            analysis.statistics.grand_total.net_change,
            BigDecimal::from_str("-1000.00").unwrap()
        );
        assert!(analysis.risk.score >= 50.0);
        assert!(analysis.risk.level >= RiskLevel::Moderate);
    }

    #[test]
    fn test_scenario_d_duplicate_supplement_lines() {
        let supplement = [
            raw("Refinish hood", "1", "180.00", "180.00"),
            raw("Refinish hood", "1", "180.00", "180.00"),
        ];

        let analysis = engine().analyze(&[], &supplement).unwrap();

        // Flagged, not merged: both lines stay in the partition.
        assert_eq!(analysis.reconciliation.new_supplement.len(), 2);
        assert!(analysis
            .discrepancies
            .iter()
            .any(|d| d.discrepancy_type
                == crate::discrepancy::DiscrepancyType::DuplicateItem));
    }

    #[test]
    fn test_partition_completeness() {
        let analysis = engine()
            .analyze(&rich_original(), &rich_supplement())
            .unwrap();

        let r = &analysis.reconciliation;
        assert_eq!(
            r.matched.len() + r.unmatched_original.len(),
            analysis.original_items.len()
        );
        assert_eq!(
            r.matched.len() + r.new_supplement.len(),
            analysis.supplement_items.len()
        );

        // No key appears in two partitions.
        let mut seen = std::collections::BTreeSet::new();
        for pair in &r.matched {
            assert!(seen.insert(pair.original.key.clone()));
            assert!(seen.insert(pair.supplement.key.clone()));
        }
        for residual in r.unmatched_original.iter().chain(r.new_supplement.iter()) {
            assert!(seen.insert(residual.item.key.clone()));
        }
    }

    #[test]
    fn test_net_change_reconstruction() {
        let analysis = engine()
            .analyze(&rich_original(), &rich_supplement())
            .unwrap();

        let bottom_up: BigDecimal = analysis
            .variances
            .iter()
            .map(|v| &v.total_delta)
            .sum();
        let gap = (&bottom_up - &analysis.statistics.grand_total.net_change).abs();
        assert!(gap <= BigDecimal::from_str("0.01").unwrap());
    }

    #[test]
    fn test_null_percentage_law() {
        let mut original = rich_original();
        original.push(raw("Masking materials", "1", "0.00", "0.00"));
        let mut supplement = rich_supplement();
        supplement.push(raw("Masking materials", "1", "12.00", "12.00"));

        let analysis = engine().analyze(&original, &supplement).unwrap();

        for v in &analysis.variances {
            match v.change {
                ChangeKind::New | ChangeKind::Removed => {
                    assert_eq!(v.total_pct, None);
                    assert_eq!(v.price_pct, None);
                    assert_eq!(v.quantity_pct, None);
                }
                _ => {
                    let pair = analysis
                        .reconciliation
                        .matched
                        .iter()
                        .find(|p| Some(&p.original.key) == v.original_key.as_ref())
                        .unwrap();
                    assert_eq!(v.total_pct.is_none(), pair.original.total().is_zero());
                    assert_eq!(
                        v.price_pct.is_none(),
                        pair.original.unit_price().is_zero()
                    );
                    assert_eq!(
                        v.quantity_pct.is_none(),
                        pair.original.quantity().is_zero()
                    );
                }
            }
        }
    }

    #[test]
    fn test_determinism_bit_identical_output() {
        let original = rich_original();
        let supplement = rich_supplement();

        let first = engine().analyze(&original, &supplement).unwrap();
        let second = engine().analyze(&original, &supplement).unwrap();

        assert_eq!(analytical_json(&first), analytical_json(&second));
    }

    #[test]
    fn test_negative_quantity_is_fatal() {
        let original = [raw("Refinish hood", "-1", "180.00", "-180.00")];

        let err = engine().analyze(&original, &[]).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_malformed_item_degrades_not_aborts() {
        let original = [
            raw("", "1", "100.00", "100.00"),
            raw("Refinish hood", "1", "180.00", "180.00"),
        ];
        let supplement = [raw("Refinish hood", "1", "180.00", "180.00")];

        let analysis = engine().analyze(&original, &supplement).unwrap();

        let flagged = &analysis.original_items[0];
        assert!(flagged.has_warnings());
        assert!(flagged.confidence <= 0.30);
        assert!(analysis.statistics.data_quality.completeness < 1.0);
    }

    #[test]
    fn test_empty_both_sides() {
        let analysis = engine().analyze(&[], &[]).unwrap();

        assert!(analysis.variances.is_empty());
        assert!(analysis.statistics.grand_total.net_change.is_zero());
        assert_eq!(analysis.risk.level, RiskLevel::Minimal);
    }

    #[test]
    fn test_invalid_config_rejected_at_entry() {
        let mut config = AnalysisConfig::default();
        config.fuzzy.similarity_threshold = 2.0;

        assert!(AnalysisEngine::new(config).is_err());
    }

    #[test]
    fn test_summary_renders() {
        let analysis = engine()
            .analyze(&rich_original(), &rich_supplement())
            .unwrap();
        let summary = analysis.summary();

        assert!(summary.contains("matched"));
        assert!(summary.contains("net change"));
    }
}
