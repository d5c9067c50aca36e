//! Finding types
//!
//! The output unit consumed by the reporting layer. A finding is created
//! once per vulnerability per run and never mutated after emission. A
//! mitigation discovered in a different file is always distinguishable from
//! a same-file one, with its exact location.

use serde::{Deserialize, Serialize};

use super::mitigation::MitigationInstance;
use super::value_objects::Confidence;

/// How completely the vulnerability's candidate paths are protected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MitigationStatus {
    /// Every candidate path is protected
    Full,
    /// Some but not all candidate paths are protected
    Partial,
    /// No candidate path is protected
    None,
}

impl std::fmt::Display for MitigationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MitigationStatus::Full => write!(f, "full"),
            MitigationStatus::Partial => write!(f, "partial"),
            MitigationStatus::None => write!(f, "none"),
        }
    }
}

/// A mitigation found outside the vulnerability's own file, surfaced
/// individually with its exact provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossFileMitigation {
    pub pattern_id: String,
    pub file: String,
    pub line: u32,
    /// Call-graph hops from the vulnerability
    pub depth: u32,
    /// Function containing the mitigation
    pub function_name: String,
    pub confidence: Confidence,
}

/// One pattern evaluation that hit its wall-clock bound while this finding
/// was being computed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternTimeout {
    pub pattern_id: String,
    pub elapsed_ms: u64,
    pub input_length: usize,
}

/// Output unit: the vulnerability combined with everything the detector
/// learned about its protection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Vulnerability this finding answers for
    pub vulnerability_id: String,
    pub mitigation_status: MitigationStatus,
    /// Distinct candidate paths with at least one protecting mitigation
    pub paths_covered: usize,
    /// Total candidate paths on the vulnerability
    pub paths_total: usize,
    /// Candidate paths with no protection, in input order
    pub unprotected_paths: Vec<String>,
    /// Every discovered mitigation, same-file and cross-file
    pub mitigations: Vec<MitigationInstance>,
    /// Mitigations discovered at depth > 0, surfaced individually
    pub cross_file_mitigations: Vec<CrossFileMitigation>,
    /// Timeouts that affected the coverage computation; coverage numbers
    /// themselves are not altered, the finding just rests on a
    /// conservative assumption
    pub pattern_timeouts: Vec<PatternTimeout>,
    /// True when a global budget or cancellation cut the analysis short
    pub degraded: bool,
    pub degraded_reason: Option<String>,
}
