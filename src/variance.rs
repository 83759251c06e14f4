// 📊 Variance Calculator - Signed deltas and significance tiers
// One variance row per matched pair and per residual item. Percentage fields
// are None exactly when the baseline is zero; never a division by zero.

use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::config::SignificanceThresholds;
use crate::model::{round_money, CostCategory};
use crate::reconciliation::{MatchedItemPair, ReconciliationResult, ResidualItem, ResidualKind};

// ============================================================================
// VARIANCE TYPES
// ============================================================================

/// Ordered: a variance is "elevated" when either threshold ladder pushes it
/// to a later variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Significance {
    Negligible,
    Minor,
    Moderate,
    Major,
    Extreme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Increase,
    Decrease,
    Unchanged,
    New,
    Removed,
}

/// The variance record attached to one matched pair or residual item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemVariance {
    pub original_key: Option<String>,
    pub supplement_key: Option<String>,
    /// Supplement description when present, original otherwise.
    pub description: String,
    pub category: CostCategory,
    pub change: ChangeKind,

    pub quantity_delta: BigDecimal,
    pub price_delta: BigDecimal,
    pub total_delta: BigDecimal,

    pub quantity_pct: Option<f64>,
    pub price_pct: Option<f64>,
    pub total_pct: Option<f64>,

    pub significance: Significance,
}

impl ItemVariance {
    /// Stable sort key for aggregation order.
    pub fn sort_key(&self) -> (&str, &str) {
        (
            self.original_key.as_deref().unwrap_or(""),
            self.supplement_key.as_deref().unwrap_or(""),
        )
    }
}

// ============================================================================
// CALCULATOR
// ============================================================================

pub struct VarianceCalculator {
    thresholds: SignificanceThresholds,
    money_scale: i64,
}

impl VarianceCalculator {
    pub fn new(thresholds: SignificanceThresholds, money_scale: i64) -> Self {
        VarianceCalculator {
            thresholds,
            money_scale,
        }
    }

    /// One record per matched pair, then per removed residual, then per new
    /// residual. Order is deterministic by construction.
    pub fn annotate(&self, reconciliation: &ReconciliationResult) -> Vec<ItemVariance> {
        let mut records = Vec::with_capacity(
            reconciliation.matched.len()
                + reconciliation.unmatched_original.len()
                + reconciliation.new_supplement.len(),
        );

        for pair in &reconciliation.matched {
            records.push(self.for_pair(pair));
        }
        for residual in &reconciliation.unmatched_original {
            records.push(self.for_residual(residual));
        }
        for residual in &reconciliation.new_supplement {
            records.push(self.for_residual(residual));
        }

        records
    }

    fn for_pair(&self, pair: &MatchedItemPair) -> ItemVariance {
        let orig = &pair.original;
        let supp = &pair.supplement;

        let quantity_delta = supp.quantity() - orig.quantity();
        let price_delta = round_money(&(supp.unit_price() - orig.unit_price()), self.money_scale);
        let total_delta = round_money(&(supp.total() - orig.total()), self.money_scale);

        let total_pct = percentage(&total_delta, orig.total());
        let change = if total_delta.is_zero() {
            ChangeKind::Unchanged
        } else if total_delta > BigDecimal::zero() {
            ChangeKind::Increase
        } else {
            ChangeKind::Decrease
        };

        ItemVariance {
            original_key: Some(orig.key.clone()),
            supplement_key: Some(supp.key.clone()),
            description: supp.description().to_string(),
            category: supp.category,
            change,
            quantity_pct: percentage(&quantity_delta, orig.quantity()),
            price_pct: percentage(&price_delta, orig.unit_price()),
            significance: self.tier(total_pct, &total_delta),
            quantity_delta,
            price_delta,
            total_delta,
            total_pct,
        }
    }

    /// Removed items count as the negative of their amounts, new items as
    /// the positive. The absent baseline makes every percentage None, by
    /// convention rather than "100%" or infinity.
    fn for_residual(&self, residual: &ResidualItem) -> ItemVariance {
        let item = &residual.item;
        let (sign, change, original_key, supplement_key) = match residual.kind {
            ResidualKind::Removed => (
                BigDecimal::from(-1),
                ChangeKind::Removed,
                Some(item.key.clone()),
                None,
            ),
            ResidualKind::New => (
                BigDecimal::from(1),
                ChangeKind::New,
                None,
                Some(item.key.clone()),
            ),
        };

        let total_delta = round_money(&(&sign * item.total()), self.money_scale);

        ItemVariance {
            original_key,
            supplement_key,
            description: item.description().to_string(),
            category: item.category,
            change,
            quantity_delta: &sign * item.quantity(),
            price_delta: round_money(&(&sign * item.unit_price()), self.money_scale),
            significance: self.tier(None, &total_delta),
            total_delta,
            quantity_pct: None,
            price_pct: None,
            total_pct: None,
        }
    }

    /// Either ladder can elevate the tier; the higher of the two wins.
    fn tier(&self, total_pct: Option<f64>, total_delta: &BigDecimal) -> Significance {
        let pct_tier = match total_pct {
            Some(pct) => self.pct_tier(pct.abs()),
            None => Significance::Negligible,
        };
        let amount = total_delta.abs().to_f64().unwrap_or(0.0);
        pct_tier.max(self.amount_tier(amount))
    }

    fn pct_tier(&self, pct: f64) -> Significance {
        let t = &self.thresholds;
        if pct >= t.extreme_pct {
            Significance::Extreme
        } else if pct >= t.major_pct {
            Significance::Major
        } else if pct >= t.moderate_pct {
            Significance::Moderate
        } else if pct >= t.minor_pct {
            Significance::Minor
        } else {
            Significance::Negligible
        }
    }

    fn amount_tier(&self, amount: f64) -> Significance {
        let t = &self.thresholds;
        if amount >= t.extreme_amount {
            Significance::Extreme
        } else if amount >= t.major_amount {
            Significance::Major
        } else if amount >= t.moderate_amount {
            Significance::Moderate
        } else if amount >= t.minor_amount {
            Significance::Minor
        } else {
            Significance::Negligible
        }
    }
}

/// Percentage change of `delta` against `baseline`, None iff the baseline is
/// exactly zero.
pub fn percentage(delta: &BigDecimal, baseline: &BigDecimal) -> Option<f64> {
    if baseline.is_zero() {
        return None;
    }
    ((delta * BigDecimal::from(100)) / baseline).to_f64()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;
    use crate::config::FuzzyConfig;
    use crate::model::{item_key, normalize_description, ClassifiedLineItem, DocumentSide, RawLineItem};
    use crate::reconciliation::Reconciler;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn classified(
        side: DocumentSide,
        index: usize,
        description: &str,
        quantity: &str,
        unit_price: &str,
        total: &str,
    ) -> ClassifiedLineItem {
        let raw = RawLineItem::new(
            description,
            BigDecimal::from_str(quantity).unwrap(),
            BigDecimal::from_str(unit_price).unwrap(),
            BigDecimal::from_str(total).unwrap(),
        );
        let classification = Classifier::new().classify(&raw);
        let normalized = normalize_description(description);
        ClassifiedLineItem {
            key: item_key(side, index, &normalized),
            side,
            index,
            normalized,
            category: classification.category,
            confidence: classification.confidence,
            warnings: Vec::new(),
            raw,
        }
    }

    fn calculator() -> VarianceCalculator {
        VarianceCalculator::new(SignificanceThresholds::default(), 2)
    }

    fn annotate_pairing(
        orig: &[ClassifiedLineItem],
        supp: &[ClassifiedLineItem],
    ) -> Vec<ItemVariance> {
        let reconciliation = Reconciler::new(FuzzyConfig::default(), 0.10)
            .reconcile(orig, supp)
            .unwrap();
        calculator().annotate(&reconciliation)
    }

    #[test]
    fn test_matched_pair_deltas_and_percentage() {
        // Same operation, price raised from $50 to $75.
        let orig = [classified(
            DocumentSide::Original,
            0,
            "Engine oil change",
            "1",
            "50.00",
            "50.00",
        )];
        let supp = [classified(
            DocumentSide::Supplement,
            0,
            "Engine oil change",
            "1",
            "75.00",
            "75.00",
        )];

        let records = annotate_pairing(&orig, &supp);

        assert_eq!(records.len(), 1);
        let v = &records[0];
        assert_eq!(v.change, ChangeKind::Increase);
        assert_eq!(v.total_delta, BigDecimal::from_str("25.00").unwrap());
        assert_eq!(v.total_pct, Some(50.0));
        assert!(v.quantity_delta.is_zero());
    }

    #[test]
    fn test_new_residual_convention() {
        let supp = [classified(
            DocumentSide::Supplement,
            0,
            "Additional diagnostic service",
            "1",
            "120.00",
            "120.00",
        )];

        let records = annotate_pairing(&[], &supp);

        assert_eq!(records.len(), 1);
        let v = &records[0];
        assert_eq!(v.change, ChangeKind::New);
        assert_eq!(v.total_delta, BigDecimal::from_str("120.00").unwrap());
        assert_eq!(v.total_pct, None);
        assert_eq!(v.original_key, None);
        assert!(v.supplement_key.is_some());
    }

    #[test]
    fn test_removed_residual_is_negative() {
        let orig = [classified(
            DocumentSide::Original,
            0,
            "Refinish hood",
            "1",
            "180.00",
            "180.00",
        )];

        let records = annotate_pairing(&orig, &[]);

        let v = &records[0];
        assert_eq!(v.change, ChangeKind::Removed);
        assert_eq!(v.total_delta, BigDecimal::from_str("-180.00").unwrap());
        assert_eq!(v.total_pct, None);
        assert_eq!(v.supplement_key, None);
    }

    #[test]
    fn test_small_percentage_on_large_amount_is_elevated() {
        // 2.4% change, but $1,200 in absolute terms: the amount ladder wins.
        let orig = [classified(
            DocumentSide::Original,
            0,
            "Frame machine setup",
            "1",
            "50000.00",
            "50000.00",
        )];
        let supp = [classified(
            DocumentSide::Supplement,
            0,
            "Frame machine setup",
            "1",
            "51200.00",
            "51200.00",
        )];

        let records = annotate_pairing(&orig, &supp);
        assert_eq!(records[0].significance, Significance::Major);
    }

    #[test]
    fn test_large_percentage_on_small_amount_is_elevated() {
        // +75% but only $30: the percentage ladder wins.
        let orig = [classified(
            DocumentSide::Original,
            0,
            "Refinish hood",
            "1",
            "40.00",
            "40.00",
        )];
        let supp = [classified(
            DocumentSide::Supplement,
            0,
            "Refinish hood",
            "1",
            "70.00",
            "70.00",
        )];

        let records = annotate_pairing(&orig, &supp);
        assert_eq!(records[0].significance, Significance::Major);
    }

    #[test]
    fn test_null_percentage_law() {
        // Zero original unit price: price_pct must be None, others present.
        let orig = [classified(
            DocumentSide::Original,
            0,
            "Refinish hood",
            "2",
            "0.00",
            "0.00",
        )];
        let supp = [classified(
            DocumentSide::Supplement,
            0,
            "Refinish hood",
            "2",
            "5.00",
            "10.00",
        )];

        let records = annotate_pairing(&orig, &supp);

        let v = &records[0];
        assert_eq!(v.price_pct, None);
        assert_eq!(v.total_pct, None);
        assert_eq!(v.quantity_pct, Some(0.0));
    }

    #[test]
    fn test_unchanged_pair() {
        let orig = [classified(
            DocumentSide::Original,
            0,
            "Refinish hood",
            "1",
            "180.00",
            "180.00",
        )];
        let supp = [classified(
            DocumentSide::Supplement,
            0,
            "Refinish hood",
            "1",
            "180.00",
            "180.00",
        )];

        let records = annotate_pairing(&orig, &supp);

        let v = &records[0];
        assert_eq!(v.change, ChangeKind::Unchanged);
        assert!(v.total_delta.is_zero());
        assert_eq!(v.significance, Significance::Negligible);
        assert_eq!(v.total_pct, Some(0.0));
    }
}
