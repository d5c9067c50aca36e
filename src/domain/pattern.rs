//! Mitigation pattern types
//!
//! Configured rules that recognize protective code (sanitizer or validator
//! calls), plus the immutable result types produced when a pattern is
//! screened for ReDoS risk or evaluated against an input.

use serde::{Deserialize, Serialize};

/// Where a mitigation pattern is allowed to match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternScope {
    /// Only inside the vulnerable function itself
    FunctionLocal,
    /// Anywhere in the vulnerability's own file
    File,
    /// Anywhere reachable through the call graph, including other files
    Global,
}

/// How a pattern recognizes protective code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum MatchSpec {
    /// Exact callee name; matched as `name(` with a word boundary.
    /// Name specs are constructed from escaped literals and need no
    /// ReDoS screening.
    Name(String),
    /// Regular expression over statement text. Screened by the validator
    /// before use and executed only under the bounded evaluator.
    Regex(String),
}

/// A configured rule identifying protective code
///
/// Immutable after load; created once from configuration (or from the
/// built-in set) and shared for the lifetime of the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitigationPattern {
    /// Unique pattern identifier (e.g., "builtin-sanitize")
    pub id: String,
    /// What the pattern matches
    pub match_spec: MatchSpec,
    /// Where the pattern may match
    pub scope: PatternScope,
    /// Pattern ids this rule supersedes; overridden ids are dropped from
    /// the active set when this pattern is enabled
    #[serde(default)]
    pub overrides: Option<Vec<String>>,
    /// Built-in patterns are pre-vetted and may evaluate inline. The engine
    /// forces this flag off for patterns loaded from configuration, which
    /// always run isolated.
    #[serde(default)]
    pub trusted: bool,
}

impl MitigationPattern {
    /// Built-in pattern set recognizing common sanitizer and validator calls
    pub fn builtin_set() -> Vec<MitigationPattern> {
        let names = [
            ("builtin-sanitize", "sanitize"),
            ("builtin-escape", "escape"),
            ("builtin-validate", "validate"),
            ("builtin-encode", "encode"),
            ("builtin-parameterize", "parameterize"),
        ];
        names
            .iter()
            .map(|(id, name)| MitigationPattern {
                id: (*id).to_string(),
                match_spec: MatchSpec::Name((*name).to_string()),
                scope: PatternScope::Global,
                overrides: None,
                trusted: true,
            })
            .collect()
    }
}

/// ReDoS risk band assigned by static screening
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RedosRisk {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RedosRisk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RedosRisk::None => write!(f, "none"),
            RedosRisk::Low => write!(f, "low"),
            RedosRisk::Medium => write!(f, "medium"),
            RedosRisk::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for RedosRisk {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(RedosRisk::None),
            "low" => Ok(RedosRisk::Low),
            "medium" => Ok(RedosRisk::Medium),
            "high" => Ok(RedosRisk::High),
            _ => Err(format!("Unknown ReDoS risk: {s}")),
        }
    }
}

/// Outcome of screening one pattern at startup
///
/// Created once per pattern; never mutated. All failure modes are encoded
/// here — screening itself never errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternValidationResult {
    /// The raw pattern text that was screened
    pub pattern: String,
    /// Id of the pattern the text came from
    pub pattern_id: String,
    /// Whether the pattern may be executed
    pub is_valid: bool,
    /// Why the pattern was rejected (empty when valid)
    pub rejection_reasons: Vec<String>,
    /// Assigned risk band
    pub redos_risk: RedosRisk,
    /// Composite 0–100 backtracking-risk score
    pub vulnerability_score: u8,
    /// Wall-clock time spent screening
    pub validation_time_ms: u64,
    /// Whitelisted patterns skip screening entirely
    pub whitelisted: bool,
}

/// Outcome of one bounded match attempt
///
/// `timed_out == true` always implies `matched == false`: a timeout is
/// authoritative and conservative. Engine runtime failures are carried in
/// `error` rather than raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternEvaluationResult {
    pub pattern_id: String,
    pub matched: bool,
    pub timed_out: bool,
    pub elapsed_ms: u64,
    pub input_length: usize,
    #[serde(default)]
    pub error: Option<String>,
}
