// 🏷️ Cost Classifier - Rules as Data
// Ordered keyword/price rules assign each raw line item a cost category.
// First satisfied rule by priority wins; confidence counts agreeing signals.

use serde::{Deserialize, Serialize};

use crate::model::{normalize_description, CostCategory, RawLineItem};
use bigdecimal::ToPrimitive;

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Rule ID for tracking which rule classified an item.
    pub id: String,

    pub category: CostCategory,

    /// Keywords matched against the normalized description. Any hit
    /// triggers the rule; additional hits strengthen confidence.
    pub keywords: Vec<String>,

    /// Optional unit-price range hint. Never a trigger on its own, only an
    /// agreeing signal.
    #[serde(default)]
    pub price_min: Option<f64>,
    #[serde(default)]
    pub price_max: Option<f64>,

    /// Higher priority is evaluated first.
    #[serde(default)]
    pub priority: i32,
}

impl CategoryRule {
    /// Count keyword hits against an already-normalized description.
    pub fn keyword_hits(&self, normalized: &str) -> usize {
        self.keywords
            .iter()
            .filter(|k| normalized.contains(k.as_str()))
            .count()
    }

    fn price_fits(&self, unit_price: f64) -> Option<bool> {
        if self.price_min.is_none() && self.price_max.is_none() {
            return None;
        }
        let above = self.price_min.map_or(true, |min| unit_price >= min);
        let below = self.price_max.map_or(true, |max| unit_price <= max);
        Some(above && below)
    }
}

// ============================================================================
// CLASSIFICATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: CostCategory,
    pub confidence: f64,
    pub rule_id: Option<String>,
    /// How many independent signals agreed (keywords, extra hits, price
    /// range, category hint).
    pub signals: u32,
}

impl Default for Classification {
    fn default() -> Self {
        Classification {
            category: CostCategory::Other,
            confidence: 0.0,
            rule_id: None,
            signals: 0,
        }
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

pub struct Classifier {
    rules: Vec<CategoryRule>,
}

impl Classifier {
    /// Classifier with the built-in auto-repair rule table.
    pub fn new() -> Self {
        Classifier::from_rules(default_rules())
    }

    /// Classifier with a caller-supplied rule table.
    pub fn from_rules(mut rules: Vec<CategoryRule>) -> Self {
        // Stable sort: equal priorities keep their given order.
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Classifier { rules }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Classify one raw item. Pure: no side effects, no external state.
    pub fn classify(&self, item: &RawLineItem) -> Classification {
        let normalized = normalize_description(&item.description);
        let hint = item
            .category_hint
            .as_deref()
            .and_then(CostCategory::from_hint);
        let unit_price = item.unit_price.to_f64().unwrap_or(0.0);

        for rule in &self.rules {
            let hits = rule.keyword_hits(&normalized);
            if hits == 0 {
                continue;
            }

            let mut signals: u32 = 1;
            if hits >= 2 {
                signals += 1;
            }
            if rule.price_fits(unit_price) == Some(true) {
                signals += 1;
            }
            if hint == Some(rule.category) {
                signals += 1;
            }

            return Classification {
                category: rule.category,
                confidence: confidence_for(signals),
                rule_id: Some(rule.id.clone()),
                signals,
            };
        }

        // No rule satisfied.
        Classification::default()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

fn confidence_for(signals: u32) -> f64 {
    match signals {
        0 => 0.0,
        1 => 0.60,
        2 => 0.75,
        3 => 0.87,
        _ => 0.95,
    }
}

// ============================================================================
// DEFAULT RULE TABLE
// ============================================================================

fn rule(
    id: &str,
    category: CostCategory,
    keywords: &[&str],
    priority: i32,
) -> CategoryRule {
    CategoryRule {
        id: id.to_string(),
        category,
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        price_min: None,
        price_max: None,
        priority,
    }
}

/// Built-in rule table for auto-repair estimates. More specific rules carry
/// higher priority so "frame machine setup" lands on equipment, not labor.
pub fn default_rules() -> Vec<CategoryRule> {
    let mut rules = vec![
        rule(
            "overhead-fees",
            CostCategory::Overhead,
            &["towing", "storage", "administrative", "admin fee", "shop fee"],
            40,
        ),
        rule(
            "overhead-hazmat",
            CostCategory::Overhead,
            &["hazardous", "waste disposal", "disposal fee"],
            35,
        ),
        rule(
            "paint-materials",
            CostCategory::Materials,
            &[
                "paint supplies",
                "paint materials",
                "primer",
                "clearcoat",
                "clear coat",
                "sealant",
                "adhesive",
                "abrasive",
            ],
            30,
        ),
        rule(
            "shop-equipment",
            CostCategory::Equipment,
            &[
                "frame machine",
                "measuring system",
                "scan tool",
                "lift",
                "rental",
                "calibration equipment",
            ],
            25,
        ),
        rule(
            "labor-operations",
            CostCategory::Labor,
            &[
                "labor",
                "labour",
                "remove",
                "replace",
                "repair",
                "refinish",
                "install",
                "overhaul",
                "align",
                "adjust",
                "diagnos",
            ],
            20,
        ),
        rule(
            "body-parts",
            CostCategory::Parts,
            &[
                "bumper",
                "fender",
                "panel",
                "assembly",
                "molding",
                "bracket",
                "grille",
                "headlamp",
                "lamp",
                "mirror",
                "radiator",
                "condenser",
                "sensor",
                "absorber",
                "reinforcement",
                "windshield",
                "wheel",
                "tire",
                "filter",
                "hose",
            ],
            10,
        ),
        rule(
            "materials-generic",
            CostCategory::Materials,
            &["materials", "supplies"],
            8,
        ),
        rule(
            "equipment-generic",
            CostCategory::Equipment,
            &["equipment"],
            8,
        ),
        rule("sublet", CostCategory::Other, &["sublet"], 5),
    ];

    // Consumable materials rarely exceed a few hundred dollars per line;
    // the range acts as an agreeing signal, never a trigger.
    if let Some(materials) = rules.iter_mut().find(|r| r.id == "materials-generic") {
        materials.price_min = Some(0.0);
        materials.price_max = Some(500.0);
    }

    rules
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn item(description: &str, unit_price: &str) -> RawLineItem {
        RawLineItem::new(
            description,
            BigDecimal::from(1),
            BigDecimal::from_str(unit_price).unwrap(),
            BigDecimal::from_str(unit_price).unwrap(),
        )
    }

    #[test]
    fn test_labor_classification() {
        let classifier = Classifier::new();
        let result = classifier.classify(&item("Remove and replace front door", "120.00"));

        assert_eq!(result.category, CostCategory::Labor);
        assert_eq!(result.rule_id.as_deref(), Some("labor-operations"));
        // "remove" and "replace" both hit: two agreeing signals.
        assert!(result.signals >= 2);
        assert!(result.confidence >= 0.75);
    }

    #[test]
    fn test_parts_classification() {
        let classifier = Classifier::new();
        let result = classifier.classify(&item("Front bumper cover assembly", "389.50"));

        assert_eq!(result.category, CostCategory::Parts);
    }

    #[test]
    fn test_priority_wins_over_later_rules() {
        let classifier = Classifier::new();
        // "hazardous" (overhead, priority 35) outranks "supplies" (materials, 8).
        let result = classifier.classify(&item("Hazardous waste supplies", "25.00"));

        assert_eq!(result.category, CostCategory::Overhead);
        assert_eq!(result.rule_id.as_deref(), Some("overhead-hazmat"));
    }

    #[test]
    fn test_hint_agreement_raises_confidence() {
        let classifier = Classifier::new();

        let plain = classifier.classify(&item("Refinish quarter area", "180.00"));

        let mut hinted_item = item("Refinish quarter area", "180.00");
        hinted_item.category_hint = Some("labor".to_string());
        let hinted = classifier.classify(&hinted_item);

        assert_eq!(plain.category, CostCategory::Labor);
        assert_eq!(hinted.category, CostCategory::Labor);
        assert!(hinted.confidence > plain.confidence);
    }

    #[test]
    fn test_no_match_is_other_with_zero_confidence() {
        let classifier = Classifier::new();
        let result = classifier.classify(&item("Engine oil change", "49.99"));

        assert_eq!(result.category, CostCategory::Other);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.rule_id, None);
    }

    #[test]
    fn test_custom_rule_table() {
        let classifier = Classifier::from_rules(vec![rule(
            "oil",
            CostCategory::Labor,
            &["oil change"],
            50,
        )]);

        let result = classifier.classify(&item("Engine Oil Change", "49.99"));
        assert_eq!(result.category, CostCategory::Labor);
        assert_eq!(result.rule_id.as_deref(), Some("oil"));
    }

    #[test]
    fn test_price_range_is_signal_not_trigger() {
        let classifier = Classifier::new();

        // Inside the materials price range: extra signal.
        let cheap = classifier.classify(&item("Shop supplies", "35.00"));
        // Outside the range: rule still triggers on the keyword alone.
        let pricey = classifier.classify(&item("Shop supplies", "900.00"));

        assert_eq!(cheap.category, CostCategory::Materials);
        assert_eq!(pricey.category, CostCategory::Materials);
        assert!(cheap.confidence > pricey.confidence);
    }
}
