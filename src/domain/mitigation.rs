//! Vulnerabilities and located mitigations
//!
//! The input unit under analysis and the provenance-carrying instances the
//! detector produces. Instances are created during detection and read-only
//! thereafter.

use serde::{Deserialize, Serialize};

use super::pattern::PatternScope;
use super::value_objects::Confidence;

/// Location in source code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// Input unit: a flagged location plus the named candidate paths that
/// require protection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    /// Identifier assigned by the upstream scanner
    pub id: String,
    /// Where the vulnerable sink sits
    pub location: Location,
    /// Function containing the vulnerable sink
    pub function_name: String,
    /// Distinct paths that must each be protected for full coverage
    pub candidate_paths: Vec<String>,
}

/// One frame in a traversal path from vulnerability to mitigation
///
/// The first entry of a chain is nearest the vulnerability, the last entry
/// is the function containing the mitigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallChainEntry {
    pub file: String,
    pub function_name: String,
    pub line: u32,
}

/// A located, matched mitigation pattern
///
/// Invariant: when both fields are present,
/// `call_chain.len() == discovery_depth + 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitigationInstance {
    /// Pattern that matched
    pub pattern_id: String,
    /// Where the protective statement sits
    pub location: Location,
    /// Variables the protective statement touches
    pub protected_variables: Vec<String>,
    /// Candidate paths this instance protects
    pub protected_paths: Vec<String>,
    /// Scope the pattern was configured with
    pub scope: PatternScope,
    /// Confidence, reduced with discovery depth
    pub confidence: Confidence,
    /// Traversal path from the vulnerability to the mitigation
    #[serde(default)]
    pub call_chain: Option<Vec<CallChainEntry>>,
    /// Call-graph hops between vulnerability and mitigation; 0 = same file
    pub discovery_depth: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_equality() {
        let a = Location::new("src/app.py", 7);
        let b = Location::new("src/app.py", 7);
        assert_eq!(a, b);
        assert_ne!(a, Location::new("src/app.py", 8));
    }
}
