// 📋 Line Item Model - Raw and classified estimate line items
// Monetary and quantity values are exact decimals; identity is a
// content-derived key, never a random ID.

use bigdecimal::{BigDecimal, RoundingMode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ItemWarning;

// ============================================================================
// COST CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CostCategory {
    Labor,
    Parts,
    Materials,
    Equipment,
    Overhead,
    Other,
}

impl CostCategory {
    /// Fixed iteration order for aggregation, so output never depends on
    /// hash-map ordering.
    pub const ALL: [CostCategory; 6] = [
        CostCategory::Labor,
        CostCategory::Parts,
        CostCategory::Materials,
        CostCategory::Equipment,
        CostCategory::Overhead,
        CostCategory::Other,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CostCategory::Labor => "Labor",
            CostCategory::Parts => "Parts",
            CostCategory::Materials => "Materials",
            CostCategory::Equipment => "Equipment",
            CostCategory::Overhead => "Overhead",
            CostCategory::Other => "Other",
        }
    }

    /// Parse a free-form category hint ("labor", "PARTS", "part", ...).
    pub fn from_hint(hint: &str) -> Option<CostCategory> {
        match normalize_description(hint).as_str() {
            "labor" | "labour" => Some(CostCategory::Labor),
            "parts" | "part" => Some(CostCategory::Parts),
            "materials" | "material" => Some(CostCategory::Materials),
            "equipment" => Some(CostCategory::Equipment),
            "overhead" => Some(CostCategory::Overhead),
            "other" => Some(CostCategory::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for CostCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// DOCUMENT SIDE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentSide {
    Original,
    Supplement,
}

impl DocumentSide {
    pub fn name(&self) -> &'static str {
        match self {
            DocumentSide::Original => "original",
            DocumentSide::Supplement => "supplement",
        }
    }
}

// ============================================================================
// RAW LINE ITEM
// ============================================================================

/// One priced entry of a repair estimate, exactly as the upstream extraction
/// service delivers it. Never mutated after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLineItem {
    pub description: String,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
    pub total: BigDecimal,
    /// Free-form category hint from the source document, if any.
    #[serde(default, rename = "category")]
    pub category_hint: Option<String>,
}

impl RawLineItem {
    pub fn new(
        description: &str,
        quantity: BigDecimal,
        unit_price: BigDecimal,
        total: BigDecimal,
    ) -> Self {
        RawLineItem {
            description: description.to_string(),
            quantity,
            unit_price,
            total,
            category_hint: None,
        }
    }
}

// ============================================================================
// CLASSIFIED LINE ITEM
// ============================================================================

/// A raw item plus its cost category, classification confidence, stable key,
/// and any warnings attached during ingest validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedLineItem {
    /// Content-derived key: SHA-256 over side, input index, and normalized
    /// description. Stable across runs for identical input.
    pub key: String,
    pub side: DocumentSide,
    /// Position in the input list; part of the key so duplicated
    /// descriptions stay distinguishable.
    pub index: usize,
    pub raw: RawLineItem,
    /// Normalized description, precomputed once for matching.
    pub normalized: String,
    pub category: CostCategory,
    pub confidence: f64,
    pub warnings: Vec<ItemWarning>,
}

impl ClassifiedLineItem {
    pub fn quantity(&self) -> &BigDecimal {
        &self.raw.quantity
    }

    pub fn unit_price(&self) -> &BigDecimal {
        &self.raw.unit_price
    }

    pub fn total(&self) -> &BigDecimal {
        &self.raw.total
    }

    pub fn description(&self) -> &str {
        &self.raw.description
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

// ============================================================================
// NORMALIZATION & KEYS
// ============================================================================

/// Normalize a description for matching: case-fold, strip punctuation,
/// collapse whitespace.
pub fn normalize_description(raw: &str) -> String {
    let lowered: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable content-derived item key. Replaces the random identifiers of the
/// originating system so identical input always yields identical keys.
pub fn item_key(side: DocumentSide, index: usize, normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}", side.name(), index, normalized));
    let hex = format!("{:x}", hasher.finalize());
    hex[..16].to_string()
}

/// Round a monetary value to the configured scale, half-up.
pub fn round_money(value: &BigDecimal, scale: i64) -> BigDecimal {
    value.with_scale_round(scale, RoundingMode::HalfUp)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_normalize_description() {
        assert_eq!(
            normalize_description("  Front Bumper -- R/R  (OEM) "),
            "front bumper rr oem"
        );
        assert_eq!(normalize_description("ENGINE OIL CHANGE"), "engine oil change");
        assert_eq!(normalize_description(""), "");
    }

    #[test]
    fn test_item_key_is_stable_and_index_sensitive() {
        let a = item_key(DocumentSide::Original, 0, "front bumper");
        let b = item_key(DocumentSide::Original, 0, "front bumper");
        let c = item_key(DocumentSide::Original, 1, "front bumper");
        let d = item_key(DocumentSide::Supplement, 0, "front bumper");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_category_hint_parsing() {
        assert_eq!(CostCategory::from_hint("Labor"), Some(CostCategory::Labor));
        assert_eq!(CostCategory::from_hint("PARTS"), Some(CostCategory::Parts));
        assert_eq!(CostCategory::from_hint("paint supplies"), None);
    }

    #[test]
    fn test_round_money_half_up() {
        let v = BigDecimal::from_str("10.005").unwrap();
        assert_eq!(round_money(&v, 2), BigDecimal::from_str("10.01").unwrap());

        let v = BigDecimal::from_str("10.004").unwrap();
        assert_eq!(round_money(&v, 2), BigDecimal::from_str("10.00").unwrap());
    }
}
