//! Per-tensor configuration.

use serde::{Deserialize, Serialize};

/// How `pack` resolves a coordinate that was inserted more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// The value inserted last is stored.
    #[default]
    LastWins,
    /// Values are summed (logical or for booleans).
    Sum,
    /// Packing fails with `TensorError::DuplicateCoordinate`.
    Reject,
}

/// Tensor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TensorConfig {
    /// Duplicate coordinate resolution during packing
    pub duplicates: DuplicatePolicy,
    /// Check packed storage invariants after packing and assembly
    pub validate_storage: bool,
}

impl Default for TensorConfig {
    fn default() -> Self {
        Self {
            duplicates: DuplicatePolicy::LastWins,
            validate_storage: cfg!(debug_assertions),
        }
    }
}

impl TensorConfig {
    pub fn with_duplicates(mut self, duplicates: DuplicatePolicy) -> Self {
        self.duplicates = duplicates;
        self
    }

    pub fn with_validation(mut self, validate_storage: bool) -> Self {
        self.validate_storage = validate_storage;
        self
    }
}
