// 🔍 Discrepancy Detector - Calculation errors, duplicates, pricing anomalies
// Independent, composable checks over the reconciled item set. Each finding
// is flagged for review, never auto-resolved.

use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;

use crate::config::DetectorConfig;
use crate::model::{round_money, ClassifiedLineItem, CostCategory};
use crate::reconciliation::ReconciliationResult;

// ============================================================================
// DISCREPANCY TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscrepancyType {
    CalculationError,
    DuplicateItem,
    MissingItem,
    SuspiciousPricing,
    DataInconsistency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiscrepancySeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl DiscrepancySeverity {
    /// Points used by the risk scorer when summing severities.
    pub fn points(&self) -> f64 {
        match self {
            DiscrepancySeverity::Low => 1.0,
            DiscrepancySeverity::Medium => 2.0,
            DiscrepancySeverity::High => 4.0,
            DiscrepancySeverity::Critical => 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub discrepancy_type: DiscrepancyType,
    pub severity: DiscrepancySeverity,
    /// Stable keys of the implicated items.
    pub affected_items: Vec<String>,
    pub estimated_impact: BigDecimal,
    pub confidence: f64,
    pub description: String,
    pub recommended_action: String,
}

// ============================================================================
// DETECTOR
// ============================================================================

pub struct DiscrepancyDetector {
    config: DetectorConfig,
    money_scale: i64,
}

impl DiscrepancyDetector {
    pub fn new(config: DetectorConfig, money_scale: i64) -> Self {
        DiscrepancyDetector {
            config,
            money_scale,
        }
    }

    /// Run every check in fixed order, then sort by severity for review.
    /// The sort is stable, so equal severities keep detection order and the
    /// full list stays deterministic.
    pub fn detect(
        &self,
        original: &[ClassifiedLineItem],
        supplement: &[ClassifiedLineItem],
        reconciliation: &ReconciliationResult,
    ) -> Vec<Discrepancy> {
        let mut findings = Vec::new();

        self.check_calculation_errors(original, &mut findings);
        self.check_calculation_errors(supplement, &mut findings);
        self.check_data_inconsistencies(original, &mut findings);
        self.check_data_inconsistencies(supplement, &mut findings);
        self.check_duplicates(original, &mut findings);
        self.check_duplicates(supplement, &mut findings);
        self.check_round_number_bias(supplement, &mut findings);
        self.check_markup_outliers(original, supplement, &mut findings);
        self.check_missing_categories(original, supplement, reconciliation, &mut findings);

        tracing::debug!(count = findings.len(), "discrepancy checks complete");

        findings.sort_by(|a, b| b.severity.cmp(&a.severity));
        findings
    }

    // ------------------------------------------------------------------------
    // quantity × price must agree with the stated line total.
    // ------------------------------------------------------------------------
    fn check_calculation_errors(
        &self,
        items: &[ClassifiedLineItem],
        findings: &mut Vec<Discrepancy>,
    ) {
        let tolerance = BigDecimal::from_f64(self.config.calculation_tolerance)
            .unwrap_or_else(BigDecimal::zero);

        for item in items {
            let expected = item.quantity() * item.unit_price();
            let gap = (&expected - item.total()).abs();
            if gap <= tolerance {
                continue;
            }

            let impact = round_money(&gap, self.money_scale);
            findings.push(Discrepancy {
                discrepancy_type: DiscrepancyType::CalculationError,
                severity: severity_for(&impact, 1.0),
                affected_items: vec![item.key.clone()],
                estimated_impact: impact,
                confidence: 1.0,
                description: format!(
                    "{} line \"{}\": {} × {} = {}, but total is {}",
                    item.side.name(),
                    item.description(),
                    item.quantity(),
                    item.unit_price(),
                    round_money(&expected, self.money_scale),
                    item.total(),
                ),
                recommended_action: "Verify the arithmetic on this line and correct the total"
                    .to_string(),
            });
        }
    }

    // ------------------------------------------------------------------------
    // Items that arrived with ingest warnings (missing fields, bad shapes).
    // ------------------------------------------------------------------------
    fn check_data_inconsistencies(
        &self,
        items: &[ClassifiedLineItem],
        findings: &mut Vec<Discrepancy>,
    ) {
        for item in items {
            // Total mismatches already surface as calculation errors.
            let other: Vec<&crate::error::ItemWarning> = item
                .warnings
                .iter()
                .filter(|w| w.field != "total")
                .collect();
            if other.is_empty() {
                continue;
            }

            let notes: Vec<String> = other.iter().map(|w| w.to_string()).collect();
            findings.push(Discrepancy {
                discrepancy_type: DiscrepancyType::DataInconsistency,
                severity: DiscrepancySeverity::Low,
                affected_items: vec![item.key.clone()],
                estimated_impact: round_money(item.total(), self.money_scale).abs(),
                confidence: 0.9,
                description: format!(
                    "{} line {} has data problems: {}",
                    item.side.name(),
                    item.index + 1,
                    notes.join("; "),
                ),
                recommended_action: "Re-extract or manually correct this line item".to_string(),
            });
        }
    }

    // ------------------------------------------------------------------------
    // Two same-priced, near-identically described lines in one document.
    // A legitimate repeated operation looks the same, so this is flagged
    // for review rather than merged.
    // ------------------------------------------------------------------------
    fn check_duplicates(&self, items: &[ClassifiedLineItem], findings: &mut Vec<Discrepancy>) {
        for i in 0..items.len() {
            for j in (i + 1)..items.len() {
                let a = &items[i];
                let b = &items[j];

                if a.unit_price() != b.unit_price() {
                    continue;
                }

                let confidence = if a.normalized == b.normalized {
                    1.0
                } else {
                    let similarity = normalized_levenshtein(&a.normalized, &b.normalized);
                    if similarity < self.config.duplicate_similarity {
                        continue;
                    }
                    similarity
                };

                let impact = round_money(b.total(), self.money_scale).abs();
                findings.push(Discrepancy {
                    discrepancy_type: DiscrepancyType::DuplicateItem,
                    severity: severity_for(&impact, confidence),
                    affected_items: vec![a.key.clone(), b.key.clone()],
                    estimated_impact: impact,
                    confidence,
                    description: format!(
                        "{} lines {} and {} look like the same entry: \"{}\" / \"{}\" at equal price",
                        a.side.name(),
                        a.index + 1,
                        b.index + 1,
                        a.description(),
                        b.description(),
                    ),
                    recommended_action:
                        "Confirm whether this is a billed duplicate or a legitimately repeated operation"
                            .to_string(),
                });
            }
        }
    }

    // ------------------------------------------------------------------------
    // Round-number bias: too many prices that are exact multiples of 100.
    // ------------------------------------------------------------------------
    fn check_round_number_bias(
        &self,
        items: &[ClassifiedLineItem],
        findings: &mut Vec<Discrepancy>,
    ) {
        let hundred = BigDecimal::from(100);
        let priced: Vec<&ClassifiedLineItem> = items
            .iter()
            .filter(|i| !i.unit_price().is_zero())
            .collect();

        if priced.len() < self.config.round_number_min_items {
            return;
        }

        let round: Vec<&&ClassifiedLineItem> = priced
            .iter()
            .filter(|i| (i.unit_price().abs() % &hundred).is_zero())
            .collect();

        let rate = round.len() as f64 / priced.len() as f64;
        if rate <= self.config.round_number_baseline {
            return;
        }

        let impact_sum: BigDecimal = round.iter().map(|i| i.total()).sum();
        let impact = round_money(&impact_sum, self.money_scale).abs();
        let confidence =
            (rate - self.config.round_number_baseline) / (1.0 - self.config.round_number_baseline);

        findings.push(Discrepancy {
            discrepancy_type: DiscrepancyType::SuspiciousPricing,
            severity: severity_for(&impact, confidence),
            affected_items: round.iter().map(|i| i.key.clone()).collect(),
            estimated_impact: impact,
            confidence,
            description: format!(
                "{:.0}% of supplement prices are exact multiples of $100 ({} of {} priced lines)",
                rate * 100.0,
                round.len(),
                priced.len(),
            ),
            recommended_action: "Request itemized backup for round-priced lines".to_string(),
        });
    }

    // ------------------------------------------------------------------------
    // Markup far outside the category's observed distribution. Leave-one-out
    // so a single inflated line cannot hide inside its own statistics. Items
    // with ingest warnings stay out of the baseline.
    // ------------------------------------------------------------------------
    fn check_markup_outliers(
        &self,
        original: &[ClassifiedLineItem],
        supplement: &[ClassifiedLineItem],
        findings: &mut Vec<Discrepancy>,
    ) {
        for category in CostCategory::ALL {
            let baseline: Vec<f64> = original
                .iter()
                .chain(supplement.iter())
                .filter(|i| {
                    i.category == category && !i.has_warnings() && !i.unit_price().is_zero()
                })
                .filter_map(|i| i.unit_price().to_f64())
                .collect();

            for item in supplement {
                if item.category != category || item.unit_price().is_zero() {
                    continue;
                }
                let Some(price) = item.unit_price().to_f64() else {
                    continue;
                };

                // Exclude one instance of this price from its own baseline.
                let mut others = baseline.clone();
                if let Some(pos) = others.iter().position(|p| *p == price) {
                    others.remove(pos);
                }
                if others.len() < 3 {
                    continue;
                }

                let mean = others.iter().sum::<f64>() / others.len() as f64;
                let variance = others
                    .iter()
                    .map(|p| (p - mean) * (p - mean))
                    .sum::<f64>()
                    / others.len() as f64;
                let std = variance.sqrt();

                let outlier = if std == 0.0 {
                    (price - mean).abs() / mean.max(1.0) > 1.0
                } else {
                    (price - mean).abs() / std > self.config.markup_z_threshold
                };
                if !outlier {
                    continue;
                }

                let excess = BigDecimal::from_f64((price - mean).abs())
                    .unwrap_or_else(BigDecimal::zero)
                    * item.quantity();
                let impact = round_money(&excess, self.money_scale);
                findings.push(Discrepancy {
                    discrepancy_type: DiscrepancyType::SuspiciousPricing,
                    severity: severity_for(&impact, 0.7),
                    affected_items: vec![item.key.clone()],
                    estimated_impact: impact,
                    confidence: 0.7,
                    description: format!(
                        "\"{}\" is priced at {:.2}, far outside the {} range (mean {:.2})",
                        item.description(),
                        price,
                        category,
                        mean,
                    ),
                    recommended_action: format!(
                        "Compare this {} price against market rates before approval",
                        category
                    ),
                });
            }
        }
    }

    // ------------------------------------------------------------------------
    // A category with real original spend, zero supplement coverage, and no
    // removed residuals accounting for the loss points at a reconciliation
    // gap worth surfacing.
    // ------------------------------------------------------------------------
    fn check_missing_categories(
        &self,
        original: &[ClassifiedLineItem],
        supplement: &[ClassifiedLineItem],
        reconciliation: &ReconciliationResult,
        findings: &mut Vec<Discrepancy>,
    ) {
        let floor = BigDecimal::from_f64(self.config.missing_category_floor)
            .unwrap_or_else(BigDecimal::zero);

        for category in CostCategory::ALL {
            let original_total: BigDecimal = original
                .iter()
                .filter(|i| i.category == category)
                .map(|i| i.total())
                .sum();
            if original_total < floor {
                continue;
            }

            let has_supplement_coverage =
                supplement.iter().any(|i| i.category == category);
            if has_supplement_coverage {
                continue;
            }

            let removed_total: BigDecimal = reconciliation
                .unmatched_original
                .iter()
                .filter(|r| r.item.category == category)
                .map(|r| r.item.total())
                .sum();
            if removed_total >= original_total {
                // Fully explained by removed residuals.
                continue;
            }

            let unexplained = &original_total - &removed_total;
            let impact = round_money(&unexplained, self.money_scale);
            findings.push(Discrepancy {
                discrepancy_type: DiscrepancyType::MissingItem,
                severity: severity_for(&impact, 0.8),
                affected_items: original
                    .iter()
                    .filter(|i| i.category == category)
                    .map(|i| i.key.clone())
                    .collect(),
                estimated_impact: impact,
                confidence: 0.8,
                description: format!(
                    "{} had {} of original spend but no supplement coverage and no removal records for {}",
                    category,
                    round_money(&original_total, self.money_scale),
                    round_money(&unexplained, self.money_scale),
                ),
                recommended_action: format!(
                    "Confirm whether {} work was absorbed into other lines or dropped in error",
                    category
                ),
            });
        }
    }
}

/// Severity from monetary impact weighted by detection confidence.
fn severity_for(impact: &BigDecimal, confidence: f64) -> DiscrepancySeverity {
    let weighted = impact.abs().to_f64().unwrap_or(0.0) * confidence.clamp(0.0, 1.0);
    if weighted >= 1000.0 {
        DiscrepancySeverity::Critical
    } else if weighted >= 250.0 {
        DiscrepancySeverity::High
    } else if weighted >= 50.0 {
        DiscrepancySeverity::Medium
    } else {
        DiscrepancySeverity::Low
    }
}

// ============================================================================
// TESTS
// ============================================================================
