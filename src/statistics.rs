// 📈 Statistics Aggregator - Category subtotals and descriptive statistics
// All monetary summation is exact decimal arithmetic; rows are sorted by
// stable key before aggregation so output never depends on iteration order.

use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::config::QualityWeights;
use crate::model::{round_money, ClassifiedLineItem, CostCategory};
use crate::variance::{ChangeKind, ItemVariance, Significance};

// ============================================================================
// AGGREGATE TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrandTotal {
    pub original_total: BigDecimal,
    pub supplement_total: BigDecimal,
    pub net_change: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySubtotal {
    pub category: CostCategory,
    pub original_total: BigDecimal,
    pub supplement_total: BigDecimal,
    pub net_change: BigDecimal,
    pub item_count: usize,
    /// Rows at Moderate significance or above.
    pub significant_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeDistribution {
    pub increased: usize,
    pub decreased: usize,
    pub unchanged: usize,
    pub new_items: usize,
    pub removed_items: usize,
}

/// Descriptive statistics over the signed total variance of every row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptiveStats {
    pub mean: BigDecimal,
    pub median: BigDecimal,
    /// Population standard deviation. The square root is the one place
    /// arithmetic leaves exact decimals.
    pub std_dev: f64,
    pub min: BigDecimal,
    pub max: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityScore {
    /// Fraction of items with all required fields present.
    pub completeness: f64,
    /// Fraction of items where quantity × price agrees with the line total.
    pub consistency: f64,
    /// Mean classification confidence across both documents.
    pub classification_confidence: f64,
    pub overall: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceStatistics {
    pub grand_total: GrandTotal,
    pub by_category: Vec<CategorySubtotal>,
    pub distribution: ChangeDistribution,
    pub descriptive: DescriptiveStats,
    pub data_quality: DataQualityScore,
}

// ============================================================================
// AGGREGATOR
// ============================================================================

pub struct StatisticsAggregator {
    quality: QualityWeights,
    calculation_tolerance: f64,
    money_scale: i64,
}

impl StatisticsAggregator {
    pub fn new(quality: QualityWeights, calculation_tolerance: f64, money_scale: i64) -> Self {
        StatisticsAggregator {
            quality,
            calculation_tolerance,
            money_scale,
        }
    }

    pub fn aggregate(
        &self,
        original: &[ClassifiedLineItem],
        supplement: &[ClassifiedLineItem],
        variances: &[ItemVariance],
    ) -> VarianceStatistics {
        VarianceStatistics {
            grand_total: self.grand_total(original, supplement),
            by_category: self.category_subtotals(original, supplement, variances),
            distribution: distribution(variances),
            descriptive: self.descriptive(variances),
            data_quality: self.data_quality(original, supplement),
        }
    }

    fn grand_total(
        &self,
        original: &[ClassifiedLineItem],
        supplement: &[ClassifiedLineItem],
    ) -> GrandTotal {
        let original_total = round_money(&sum_totals(original), self.money_scale);
        let supplement_total = round_money(&sum_totals(supplement), self.money_scale);
        let net_change = &supplement_total - &original_total;
        GrandTotal {
            original_total,
            supplement_total,
            net_change,
        }
    }

    fn category_subtotals(
        &self,
        original: &[ClassifiedLineItem],
        supplement: &[ClassifiedLineItem],
        variances: &[ItemVariance],
    ) -> Vec<CategorySubtotal> {
        let mut subtotals = Vec::new();

        // Fixed enum order, never hash-map order.
        for category in CostCategory::ALL {
            let orig: BigDecimal = original
                .iter()
                .filter(|i| i.category == category)
                .map(|i| i.total())
                .sum();
            let supp: BigDecimal = supplement
                .iter()
                .filter(|i| i.category == category)
                .map(|i| i.total())
                .sum();

            let rows: Vec<&ItemVariance> = variances
                .iter()
                .filter(|v| v.category == category)
                .collect();

            if rows.is_empty() && orig.is_zero() && supp.is_zero() {
                continue;
            }

            let original_total = round_money(&orig, self.money_scale);
            let supplement_total = round_money(&supp, self.money_scale);
            subtotals.push(CategorySubtotal {
                category,
                net_change: &supplement_total - &original_total,
                original_total,
                supplement_total,
                item_count: rows.len(),
                significant_count: rows
                    .iter()
                    .filter(|v| v.significance >= Significance::Moderate)
                    .count(),
            });
        }

        subtotals
    }

    fn descriptive(&self, variances: &[ItemVariance]) -> DescriptiveStats {
        let zero = || DescriptiveStats {
            mean: BigDecimal::zero(),
            median: BigDecimal::zero(),
            std_dev: 0.0,
            min: BigDecimal::zero(),
            max: BigDecimal::zero(),
        };

        if variances.is_empty() {
            return zero();
        }

        let mut deltas: Vec<&BigDecimal> = {
            let mut rows: Vec<&ItemVariance> = variances.iter().collect();
            rows.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
            rows.iter().map(|v| &v.total_delta).collect()
        };

        let n = BigDecimal::from(deltas.len() as i64);
        let sum: BigDecimal = deltas.iter().copied().sum();
        let mean_exact = &sum / &n;

        let variance_num: BigDecimal = deltas
            .iter()
            .map(|d| {
                let dev = *d - &mean_exact;
                &dev * &dev
            })
            .sum();
        let std_dev = (&variance_num / &n).to_f64().unwrap_or(0.0).sqrt();

        deltas.sort();
        let mid = deltas.len() / 2;
        let median_exact = if deltas.len() % 2 == 1 {
            deltas[mid].clone()
        } else {
            (deltas[mid - 1] + deltas[mid]) / BigDecimal::from(2)
        };

        DescriptiveStats {
            mean: round_money(&mean_exact, self.money_scale),
            median: round_money(&median_exact, self.money_scale),
            std_dev,
            min: deltas[0].clone(),
            max: deltas[deltas.len() - 1].clone(),
        }
    }

    fn data_quality(
        &self,
        original: &[ClassifiedLineItem],
        supplement: &[ClassifiedLineItem],
    ) -> DataQualityScore {
        let items: Vec<&ClassifiedLineItem> = original.iter().chain(supplement.iter()).collect();

        if items.is_empty() {
            // Vacuously clean.
            return DataQualityScore {
                completeness: 1.0,
                consistency: 1.0,
                classification_confidence: 1.0,
                overall: 1.0,
            };
        }

        let total = items.len() as f64;

        let complete = items
            .iter()
            .filter(|i| !i.description().trim().is_empty())
            .count() as f64;

        let tolerance = self.calculation_tolerance;
        let consistent = items
            .iter()
            .filter(|i| {
                let expected = i.quantity() * i.unit_price();
                let gap = (&expected - i.total()).abs().to_f64().unwrap_or(f64::MAX);
                gap <= tolerance
            })
            .count() as f64;

        let confidence_sum: f64 = items.iter().map(|i| i.confidence).sum();

        let completeness = complete / total;
        let consistency = consistent / total;
        let classification_confidence = confidence_sum / total;

        let w = &self.quality;
        let weight_sum = w.completeness + w.consistency + w.confidence;
        let overall = (completeness * w.completeness
            + consistency * w.consistency
            + classification_confidence * w.confidence)
            / weight_sum;

        DataQualityScore {
            completeness,
            consistency,
            classification_confidence,
            overall,
        }
    }
}

fn sum_totals(items: &[ClassifiedLineItem]) -> BigDecimal {
    items.iter().map(|i| i.total()).sum()
}

fn distribution(variances: &[ItemVariance]) -> ChangeDistribution {
    let mut dist = ChangeDistribution::default();
    for v in variances {
        match v.change {
            ChangeKind::Increase => dist.increased += 1,
            ChangeKind::Decrease => dist.decreased += 1,
            ChangeKind::Unchanged => dist.unchanged += 1,
            ChangeKind::New => dist.new_items += 1,
            ChangeKind::Removed => dist.removed_items += 1,
        }
    }
    dist
}

// ============================================================================
// TESTS
// ============================================================================
