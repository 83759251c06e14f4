// Engine error types
// Item-level problems become warnings attached to the item; only structurally
// impossible input or an internal invariant breach is surfaced as an error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Input that cannot be analyzed at all (negative quantity, non-finite
    /// amount, invalid configuration). Per-item defects are NOT this error.
    #[error("invalid input: {0}")]
    Validation(String),

    /// An internal matching invariant was violated. Must never occur given
    /// the stage design; asserted defensively with the input sizes.
    #[error("reconciliation invariant violated: {message} ({original_count} original items, {supplement_count} supplement items)")]
    Reconciliation {
        message: String,
        original_count: usize,
        supplement_count: usize,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;

// ============================================================================
// ITEM WARNINGS
// ============================================================================

/// A recoverable per-item problem. Degrades the data-quality score and the
/// item's classification confidence instead of aborting the analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemWarning {
    pub field: String,
    pub message: String,
}

impl ItemWarning {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        ItemWarning {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ItemWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
