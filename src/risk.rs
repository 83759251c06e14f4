// 🚨 Risk Scorer - Composite 0-100 review priority
// Weighted blend of variance magnitude, discrepancy severity, and anomaly
// confidence, mapped to a categorical level with ranked recommendations.

use bigdecimal::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::config::RiskWeights;
use crate::discrepancy::{Discrepancy, DiscrepancySeverity, DiscrepancyType};
use crate::statistics::VarianceStatistics;
use crate::variance::ItemVariance;

// ============================================================================
// RISK TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Minimal,
    Low,
    Moderate,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub level: RiskLevel,
    /// Normalized [0, 1] inputs behind the score, kept for display.
    pub variance_component: f64,
    pub discrepancy_component: f64,
    pub anomaly_component: f64,
    /// Ranked by contribution, strongest factor first.
    pub recommendations: Vec<String>,
}

// ============================================================================
// SCORER
// ============================================================================

pub struct RiskScorer {
    weights: RiskWeights,
}

impl RiskScorer {
    pub fn new(weights: RiskWeights) -> Self {
        RiskScorer { weights }
    }

    pub fn assess(
        &self,
        statistics: &VarianceStatistics,
        variances: &[ItemVariance],
        discrepancies: &[Discrepancy],
    ) -> RiskAssessment {
        let variance_component = self.variance_component(statistics, variances);
        let discrepancy_component = self.discrepancy_component(discrepancies);
        let anomaly_component = anomaly_component(discrepancies);

        let w = &self.weights;
        let weight_sum = w.variance + w.discrepancy + w.anomaly;
        let score = 100.0
            * (variance_component * w.variance
                + discrepancy_component * w.discrepancy
                + anomaly_component * w.anomaly)
            / weight_sum;
        let score = score.clamp(0.0, 100.0);

        RiskAssessment {
            score,
            level: level_for(score),
            variance_component,
            discrepancy_component,
            anomaly_component,
            recommendations: self.recommendations(
                variance_component,
                discrepancy_component,
                anomaly_component,
                statistics,
                discrepancies,
            ),
        }
    }

    /// Gross absolute change relative to the original estimate value,
    /// capped at 1.0.
    fn variance_component(
        &self,
        statistics: &VarianceStatistics,
        variances: &[ItemVariance],
    ) -> f64 {
        let gross: f64 = variances
            .iter()
            .map(|v| v.total_delta.abs().to_f64().unwrap_or(0.0))
            .sum();
        let base = statistics
            .grand_total
            .original_total
            .abs()
            .to_f64()
            .unwrap_or(0.0)
            .max(1.0);
        (gross / base).min(1.0)
    }

    /// Summed severity points, capped, normalized to [0, 1].
    fn discrepancy_component(&self, discrepancies: &[Discrepancy]) -> f64 {
        let points: f64 = discrepancies.iter().map(|d| d.severity.points()).sum();
        points.min(self.weights.severity_cap) / self.weights.severity_cap
    }

    fn recommendations(
        &self,
        variance: f64,
        discrepancy: f64,
        anomaly: f64,
        statistics: &VarianceStatistics,
        discrepancies: &[Discrepancy],
    ) -> Vec<String> {
        let w = &self.weights;
        let mut ranked: Vec<(f64, String)> = Vec::new();

        if variance >= 0.5 {
            let mut text = format!(
                "Supplement shifts the estimate by {} against an original of {}; walk through every major variance line by line",
                statistics.grand_total.net_change, statistics.grand_total.original_total,
            );
            if statistics.grand_total.supplement_total.to_f64() == Some(0.0)
                && statistics.distribution.removed_items > 0
            {
                text = format!(
                    "All {} original items lost coverage in the supplement; confirm the claim was not truncated upstream",
                    statistics.distribution.removed_items,
                );
            }
            ranked.push((variance * w.variance, text));
        } else if variance >= 0.2 {
            ranked.push((
                variance * w.variance,
                "Spot-check the largest line variances before approval".to_string(),
            ));
        }

        let severe = discrepancies
            .iter()
            .filter(|d| d.severity >= DiscrepancySeverity::High)
            .count();
        if severe > 0 {
            ranked.push((
                discrepancy * w.discrepancy,
                format!(
                    "{} high-severity discrepancies need resolution before this supplement is approved",
                    severe,
                ),
            ));
        } else if discrepancy > 0.0 {
            ranked.push((
                discrepancy * w.discrepancy,
                "Review the flagged discrepancies; none are blocking on their own".to_string(),
            ));
        }

        let suspicious = discrepancies
            .iter()
            .filter(|d| {
                matches!(
                    d.discrepancy_type,
                    DiscrepancyType::SuspiciousPricing | DiscrepancyType::DuplicateItem
                )
            })
            .count();
        if suspicious > 0 {
            ranked.push((
                anomaly * w.anomaly,
                format!(
                    "{} pricing anomalies detected; request supporting documentation",
                    suspicious,
                ),
            ));
        }

        // Strongest contributing factor first; stable for equal weights.
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        if ranked.is_empty() {
            return vec!["No elevated risk indicators; routine review is sufficient".to_string()];
        }
        ranked.into_iter().map(|(_, text)| text).collect()
    }
}

/// Count and confidence of suspicious patterns, saturating at five.
fn anomaly_component(discrepancies: &[Discrepancy]) -> f64 {
    let weighted: f64 = discrepancies
        .iter()
        .filter(|d| {
            matches!(
                d.discrepancy_type,
                DiscrepancyType::SuspiciousPricing | DiscrepancyType::DuplicateItem
            )
        })
        .map(|d| d.confidence)
        .sum();
    (weighted / 5.0).min(1.0)
}

/// Fixed cut points.
pub(crate) fn level_for(score: f64) -> RiskLevel {
    if score < 20.0 {
        RiskLevel::Minimal
    } else if score < 40.0 {
        RiskLevel::Low
    } else if score < 60.0 {
        RiskLevel::Moderate
    } else if score < 80.0 {
        RiskLevel::High
    } else {
        RiskLevel::Critical
    }
}

// ============================================================================
// TESTS
// ============================================================================
