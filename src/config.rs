//! Configuration for the mitigation analysis engine
//!
//! Bounds, whitelist, and pattern list. Loaded once by the surrounding
//! configuration system and immutable for the run.

use serde::{Deserialize, Serialize};

use crate::domain::pattern::{MatchSpec, MitigationPattern, RedosRisk};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlFlowConfig {
    /// Maximum call-graph hops followed from a vulnerability
    pub max_call_depth: u32,
    /// Wall-clock ceiling for one analysis invocation (milliseconds)
    pub time_budget_ms: u64,
    /// Input size ceiling, counted over distinct file graphs entered
    pub size_budget_lines: u64,
    /// Per-evaluation match timeout in milliseconds (10–1000)
    pub pattern_timeout_ms: u64,
    /// Per-pattern static screening timeout in milliseconds (1–100)
    pub validation_timeout_ms: u64,
    /// Patterns at or above this ReDoS risk are rejected unless whitelisted
    pub rejection_threshold: RedosRisk,
    /// Pattern ids that skip ReDoS screening entirely
    pub whitelisted_patterns: Vec<String>,
    /// Pattern ids excluded from the active set
    pub disabled_patterns: Vec<String>,
    /// User-configured mitigation patterns, merged with the built-in set
    pub patterns: Vec<MitigationPattern>,
}

impl Default for ControlFlowConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 5,
            time_budget_ms: 300_000,
            size_budget_lines: 10_000,
            pattern_timeout_ms: 100,
            validation_timeout_ms: 10,
            rejection_threshold: RedosRisk::Medium,
            whitelisted_patterns: Vec::new(),
            disabled_patterns: Vec::new(),
            patterns: Vec::new(),
        }
    }
}

/// Trait for validating configuration sections
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Traversal configuration error: {message}")]
    Traversal { message: String },

    #[error("Timeout configuration error: {message}")]
    Timeout { message: String },

    #[error("Pattern configuration error: {message}")]
    Pattern { message: String },
}

impl ValidationError {
    pub fn traversal(message: impl Into<String>) -> Self {
        Self::Traversal {
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    pub fn pattern(message: impl Into<String>) -> Self {
        Self::Pattern {
            message: message.into(),
        }
    }
}

impl Validate for ControlFlowConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.max_call_depth == 0 {
            return Err(ValidationError::traversal(
                "Max call depth must be greater than 0",
            ));
        }

        if self.size_budget_lines == 0 {
            return Err(ValidationError::traversal(
                "Size budget must be greater than 0 lines",
            ));
        }

        if !(10..=1000).contains(&self.pattern_timeout_ms) {
            return Err(ValidationError::timeout(format!(
                "Pattern timeout must be in range 10-1000 ms, got {}",
                self.pattern_timeout_ms
            )));
        }

        if !(1..=100).contains(&self.validation_timeout_ms) {
            return Err(ValidationError::timeout(format!(
                "Validation timeout must be in range 1-100 ms, got {}",
                self.validation_timeout_ms
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for pattern in &self.patterns {
            if pattern.id.is_empty() {
                return Err(ValidationError::pattern("Pattern id cannot be empty"));
            }
            if !seen.insert(pattern.id.as_str()) {
                return Err(ValidationError::pattern(format!(
                    "Duplicate pattern id: {}",
                    pattern.id
                )));
            }
            if let MatchSpec::Regex(ref source) = pattern.match_spec {
                if source.is_empty() {
                    return Err(ValidationError::pattern(format!(
                        "Pattern {} has an empty regex",
                        pattern.id
                    )));
                }
            }
        }

        Ok(())
    }
}
