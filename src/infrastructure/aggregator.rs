//! Finding aggregation
//!
//! Folds the raw detection output for one vulnerability into a single
//! `Finding`: coverage arithmetic over candidate paths, the derived
//! mitigation status, the cross-file summary, and any timeout or
//! degradation markers. Output ordering is deterministic so identical
//! inputs serialize to identical findings.

use std::collections::HashSet;

use crate::domain::finding::{CrossFileMitigation, Finding, MitigationStatus, PatternTimeout};
use crate::domain::mitigation::{MitigationInstance, Vulnerability};

/// Builds findings from detection output
#[derive(Debug, Default)]
pub struct FindingAggregator;

impl FindingAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Fold one vulnerability's detection results into its finding
    pub fn aggregate(
        &self,
        vuln: &Vulnerability,
        mut instances: Vec<MitigationInstance>,
        timeouts: Vec<PatternTimeout>,
        degraded_reason: Option<String>,
    ) -> Finding {
        let covered: HashSet<&String> = instances
            .iter()
            .flat_map(|i| i.protected_paths.iter())
            .collect();

        let paths_total = vuln.candidate_paths.len();
        let paths_covered = vuln
            .candidate_paths
            .iter()
            .filter(|p| covered.contains(p))
            .count();
        let unprotected_paths: Vec<String> = vuln
            .candidate_paths
            .iter()
            .filter(|p| !covered.contains(p))
            .cloned()
            .collect();

        let mitigation_status = if paths_total > 0 && paths_covered == paths_total {
            MitigationStatus::Full
        } else if paths_covered > 0 {
            MitigationStatus::Partial
        } else {
            MitigationStatus::None
        };

        instances.sort_by(|a, b| {
            a.discovery_depth
                .cmp(&b.discovery_depth)
                .then_with(|| a.location.file.cmp(&b.location.file))
                .then_with(|| a.location.line.cmp(&b.location.line))
                .then_with(|| a.pattern_id.cmp(&b.pattern_id))
        });

        let cross_file_mitigations = Self::cross_file_summary(&instances);

        let degraded = degraded_reason.is_some();
        Finding {
            vulnerability_id: vuln.id.clone(),
            mitigation_status,
            paths_covered,
            paths_total,
            unprotected_paths,
            mitigations: instances,
            cross_file_mitigations,
            pattern_timeouts: timeouts,
            degraded,
            degraded_reason,
        }
    }

    /// Instances discovered past depth 0, summarized for reporting. The
    /// chain's last entry names the function holding the mitigation.
    fn cross_file_summary(instances: &[MitigationInstance]) -> Vec<CrossFileMitigation> {
        instances
            .iter()
            .filter(|i| i.discovery_depth > 0)
            .map(|i| {
                let function_name = i
                    .call_chain
                    .as_ref()
                    .and_then(|chain| chain.last())
                    .map(|entry| entry.function_name.clone())
                    .unwrap_or_default();
                CrossFileMitigation {
                    pattern_id: i.pattern_id.clone(),
                    file: i.location.file.clone(),
                    line: i.location.line,
                    depth: i.discovery_depth,
                    function_name,
                    confidence: i.confidence,
                }
            })
            .collect()
    }
}
