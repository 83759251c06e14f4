// 🔁 Reconciliation Engine - Match original items to supplement items
// Three strictly ordered stages: Exact, Fuzzy, Category+Price. Each stage
// only sees items no earlier stage consumed; leftovers become residuals.
//
// Determinism requirement: identical input (including order) must produce
// identical output on every invocation. All candidate scans run in input
// order, ties break by closest amount then lowest index, and no unordered
// collection feeds the output.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use bigdecimal::ToPrimitive;
use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;

use crate::config::FuzzyConfig;
use crate::error::{EngineError, Result};
use crate::model::{ClassifiedLineItem, CostCategory};

// ============================================================================
// MATCH TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStage {
    /// Identical normalized description and category.
    Exact,
    /// Description similarity above the configured threshold.
    Fuzzy,
    /// Same category, same quantity, price within relative tolerance.
    CategoryPrice,
}

/// Per-field signals behind a match decision, kept for review display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSignals {
    pub description_similarity: f64,
    pub category_match: bool,
    pub price_proximity: f64,
}

/// An original and a supplement item judged to represent the same repair
/// operation. Created once; never merged or split afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedItemPair {
    pub original: ClassifiedLineItem,
    pub supplement: ClassifiedLineItem,
    pub score: f64,
    pub stage: MatchStage,
    pub signals: MatchSignals,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResidualKind {
    /// Present in the original only.
    Removed,
    /// Present in the supplement only.
    New,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidualItem {
    pub item: ClassifiedLineItem,
    pub kind: ResidualKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub matched: Vec<MatchedItemPair>,
    pub unmatched_original: Vec<ResidualItem>,
    pub new_supplement: Vec<ResidualItem>,
}

impl ReconciliationResult {
    pub fn match_rate(&self) -> f64 {
        let total = self.matched.len() + self.unmatched_original.len();
        if total == 0 {
            return 0.0;
        }
        self.matched.len() as f64 / total as f64
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

pub struct Reconciler {
    fuzzy: FuzzyConfig,
    fallback_price_tolerance: f64,
}

struct FuzzyCandidate {
    score: f64,
    similarity: f64,
    proximity: f64,
    same_category: bool,
    orig: usize,
    supp: usize,
}

impl Reconciler {
    pub fn new(fuzzy: FuzzyConfig, fallback_price_tolerance: f64) -> Self {
        Reconciler {
            fuzzy,
            fallback_price_tolerance,
        }
    }

    /// Run all stages. Empty inputs are valid and yield all-residual output.
    pub fn reconcile(
        &self,
        original: &[ClassifiedLineItem],
        supplement: &[ClassifiedLineItem],
    ) -> Result<ReconciliationResult> {
        let mut orig_used = vec![false; original.len()];
        let mut supp_used = vec![false; supplement.len()];
        let mut matched: Vec<MatchedItemPair> = Vec::new();

        self.exact_stage(original, supplement, &mut orig_used, &mut supp_used, &mut matched);
        tracing::debug!(matched = matched.len(), "exact stage complete");

        if self.fuzzy.enabled {
            self.fuzzy_stage(original, supplement, &mut orig_used, &mut supp_used, &mut matched);
            tracing::debug!(matched = matched.len(), "fuzzy stage complete");
        }

        self.fallback_stage(original, supplement, &mut orig_used, &mut supp_used, &mut matched);
        tracing::debug!(matched = matched.len(), "category+price stage complete");

        matched.sort_by_key(|pair| pair.original.index);

        let unmatched_original: Vec<ResidualItem> = original
            .iter()
            .enumerate()
            .filter(|(i, _)| !orig_used[*i])
            .map(|(_, item)| ResidualItem {
                item: item.clone(),
                kind: ResidualKind::Removed,
            })
            .collect();

        let new_supplement: Vec<ResidualItem> = supplement
            .iter()
            .enumerate()
            .filter(|(j, _)| !supp_used[*j])
            .map(|(_, item)| ResidualItem {
                item: item.clone(),
                kind: ResidualKind::New,
            })
            .collect();

        let result = ReconciliationResult {
            matched,
            unmatched_original,
            new_supplement,
        };

        self.assert_partition(original, supplement, &result)?;
        Ok(result)
    }

    // ------------------------------------------------------------------------
    // Stage 1: exact normalized description + identical category.
    // Ties break by closest line total, then input order.
    // ------------------------------------------------------------------------
    fn exact_stage(
        &self,
        original: &[ClassifiedLineItem],
        supplement: &[ClassifiedLineItem],
        orig_used: &mut [bool],
        supp_used: &mut [bool],
        matched: &mut Vec<MatchedItemPair>,
    ) {
        let mut by_key: BTreeMap<(String, CostCategory), Vec<usize>> = BTreeMap::new();
        for (j, item) in supplement.iter().enumerate() {
            by_key
                .entry((item.normalized.clone(), item.category))
                .or_default()
                .push(j);
        }

        for (i, orig) in original.iter().enumerate() {
            let Some(candidates) = by_key.get(&(orig.normalized.clone(), orig.category)) else {
                continue;
            };

            let mut best: Option<(bigdecimal::BigDecimal, usize)> = None;
            for &j in candidates {
                if supp_used[j] {
                    continue;
                }
                let diff = (supplement[j].total() - orig.total()).abs();
                match &best {
                    Some((best_diff, _)) if diff >= *best_diff => {}
                    _ => best = Some((diff, j)),
                }
            }

            if let Some((_, j)) = best {
                orig_used[i] = true;
                supp_used[j] = true;
                matched.push(self.make_pair(orig, &supplement[j], MatchStage::Exact, 1.0));
            }
        }
    }

    // ------------------------------------------------------------------------
    // Stage 2: fuzzy description similarity with category and price bonuses.
    // Candidate pairs are processed in descending composite score; each item
    // is consumed at most once (stable greedy assignment).
    // ------------------------------------------------------------------------
    fn fuzzy_stage(
        &self,
        original: &[ClassifiedLineItem],
        supplement: &[ClassifiedLineItem],
        orig_used: &mut [bool],
        supp_used: &mut [bool],
        matched: &mut Vec<MatchedItemPair>,
    ) {
        let mut candidates: Vec<FuzzyCandidate> = Vec::new();

        for (i, orig) in original.iter().enumerate() {
            if orig_used[i] {
                continue;
            }
            for (j, supp) in supplement.iter().enumerate() {
                if supp_used[j] {
                    continue;
                }

                let same_category = orig.category == supp.category;
                if !same_category && !self.fuzzy.allow_cross_category {
                    continue;
                }

                let similarity = normalized_levenshtein(&orig.normalized, &supp.normalized);
                if similarity < self.fuzzy.similarity_threshold {
                    continue;
                }

                let proximity = price_proximity(orig, supp);
                let mut score = self.fuzzy.description_weight * similarity
                    + self.fuzzy.price_bonus * proximity;
                if same_category {
                    score += self.fuzzy.category_bonus;
                }

                candidates.push(FuzzyCandidate {
                    score: score.min(1.0),
                    similarity,
                    proximity,
                    same_category,
                    orig: i,
                    supp: j,
                });
            }
        }

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.orig.cmp(&b.orig))
                .then(a.supp.cmp(&b.supp))
        });

        for cand in candidates {
            if orig_used[cand.orig] || supp_used[cand.supp] {
                continue;
            }
            orig_used[cand.orig] = true;
            supp_used[cand.supp] = true;
            matched.push(MatchedItemPair {
                original: original[cand.orig].clone(),
                supplement: supplement[cand.supp].clone(),
                score: cand.score,
                stage: MatchStage::Fuzzy,
                signals: MatchSignals {
                    description_similarity: cand.similarity,
                    category_match: cand.same_category,
                    price_proximity: cand.proximity,
                },
            });
        }
    }

    // ------------------------------------------------------------------------
    // Stage 3: same category, unchanged quantity, unit price within relative
    // tolerance. Catches rewordings the fuzzy threshold rejected.
    // ------------------------------------------------------------------------
    fn fallback_stage(
        &self,
        original: &[ClassifiedLineItem],
        supplement: &[ClassifiedLineItem],
        orig_used: &mut [bool],
        supp_used: &mut [bool],
        matched: &mut Vec<MatchedItemPair>,
    ) {
        for (i, orig) in original.iter().enumerate() {
            if orig_used[i] {
                continue;
            }

            let mut best: Option<(f64, usize)> = None;
            for (j, supp) in supplement.iter().enumerate() {
                if supp_used[j] {
                    continue;
                }
                if supp.category != orig.category || supp.quantity() != orig.quantity() {
                    continue;
                }

                let rel_diff = relative_price_diff(orig, supp);
                if rel_diff > self.fallback_price_tolerance {
                    continue;
                }

                match best {
                    Some((best_diff, _)) if rel_diff >= best_diff => {}
                    _ => best = Some((rel_diff, j)),
                }
            }

            if let Some((_, j)) = best {
                orig_used[i] = true;
                supp_used[j] = true;
                let similarity =
                    normalized_levenshtein(&orig.normalized, &supplement[j].normalized);
                let score = (self.fuzzy.description_weight * similarity
                    + self.fuzzy.category_bonus
                    + self.fuzzy.price_bonus * price_proximity(orig, &supplement[j]))
                .min(1.0);
                let mut pair =
                    self.make_pair(orig, &supplement[j], MatchStage::CategoryPrice, score);
                pair.signals.description_similarity = similarity;
                matched.push(pair);
            }
        }
    }

    fn make_pair(
        &self,
        orig: &ClassifiedLineItem,
        supp: &ClassifiedLineItem,
        stage: MatchStage,
        score: f64,
    ) -> MatchedItemPair {
        MatchedItemPair {
            original: orig.clone(),
            supplement: supp.clone(),
            score,
            stage,
            signals: MatchSignals {
                description_similarity: 1.0,
                category_match: orig.category == supp.category,
                price_proximity: price_proximity(orig, supp),
            },
        }
    }

    /// Partition invariant: every input item lands in exactly one output
    /// partition. Cannot fail given the used-flag design; asserted anyway.
    fn assert_partition(
        &self,
        original: &[ClassifiedLineItem],
        supplement: &[ClassifiedLineItem],
        result: &ReconciliationResult,
    ) -> Result<()> {
        let err = |message: &str| EngineError::Reconciliation {
            message: message.to_string(),
            original_count: original.len(),
            supplement_count: supplement.len(),
        };

        if result.matched.len() + result.unmatched_original.len() != original.len() {
            return Err(err("original partition is incomplete"));
        }
        if result.matched.len() + result.new_supplement.len() != supplement.len() {
            return Err(err("supplement partition is incomplete"));
        }

        let orig_keys: BTreeSet<&str> = result
            .matched
            .iter()
            .map(|p| p.original.key.as_str())
            .chain(result.unmatched_original.iter().map(|r| r.item.key.as_str()))
            .collect();
        if orig_keys.len() != original.len() {
            return Err(err("an original item was consumed twice"));
        }

        let supp_keys: BTreeSet<&str> = result
            .matched
            .iter()
            .map(|p| p.supplement.key.as_str())
            .chain(result.new_supplement.iter().map(|r| r.item.key.as_str()))
            .collect();
        if supp_keys.len() != supplement.len() {
            return Err(err("a supplement item was consumed twice"));
        }

        Ok(())
    }
}

// ============================================================================
// SCORING HELPERS
// ============================================================================

/// Price proximity in [0, 1]: 1.0 for identical totals, falling linearly to
/// 0 as the gap approaches the original amount.
fn price_proximity(orig: &ClassifiedLineItem, supp: &ClassifiedLineItem) -> f64 {
    let orig_total = orig.total().abs().to_f64().unwrap_or(0.0);
    let gap = (supp.total() - orig.total()).abs().to_f64().unwrap_or(0.0);
    let denom = orig_total.max(1.0);
    (1.0 - (gap / denom)).max(0.0)
}

/// Relative unit-price difference against the original. Zero prices only
/// match zero prices.
fn relative_price_diff(orig: &ClassifiedLineItem, supp: &ClassifiedLineItem) -> f64 {
    let orig_price = orig.unit_price().abs().to_f64().unwrap_or(0.0);
    let gap = (supp.unit_price() - orig.unit_price())
        .abs()
        .to_f64()
        .unwrap_or(0.0);
    if orig_price == 0.0 {
        return if gap == 0.0 { 0.0 } else { f64::INFINITY };
    }
    gap / orig_price
}

// ============================================================================
// TESTS
// ============================================================================
