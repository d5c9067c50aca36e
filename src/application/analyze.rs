//! Vulnerability analysis use case
//!
//! The engine's single entry point. Construction is the dangerous half:
//! configuration is validated, the built-in and configured pattern sets are
//! merged, disabled and overridden patterns are dropped, and every regex
//! pattern is screened for catastrophic-backtracking risk before it can
//! ever execute. Patterns that fail screening or compilation are excluded
//! and logged, never silently kept.
//!
//! `execute` itself cannot fail. Missing graphs, budget exhaustion, and
//! cancellation all degrade individual findings instead of erroring, so the
//! caller always receives a complete run.

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::{ControlFlowConfig, Validate, ValidationError};
use crate::domain::finding::Finding;
use crate::domain::graph::{CfgMap, ControlFlowGraph};
use crate::domain::mitigation::Vulnerability;
use crate::domain::pattern::{MatchSpec, MitigationPattern, PatternValidationResult};
use crate::infrastructure::aggregator::FindingAggregator;
use crate::infrastructure::audit::AuditLog;
use crate::infrastructure::detector::MitigationDetector;
use crate::infrastructure::evaluator::{BoundedEvaluator, CompiledPattern, ScreenedPattern};
use crate::infrastructure::run_context::RunContext;
use crate::infrastructure::validator::PatternValidator;

/// Engine construction failure
#[derive(Debug, thiserror::Error)]
pub enum EngineBuildError {
    #[error("Invalid engine configuration: {0}")]
    Config(#[from] ValidationError),
}

/// Result of one analysis invocation
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRun {
    /// Correlation id shared by every audit event the run produced
    pub correlation_id: Uuid,
    /// One finding per input vulnerability, in input order
    pub findings: Vec<Finding>,
    /// Evaluation timeouts across the whole run
    pub timeout_count: u32,
}

/// Analyzes flagged vulnerabilities against the active mitigation patterns
pub struct AnalyzeVulnerabilitiesUseCase {
    config: ControlFlowConfig,
    audit: Arc<AuditLog>,
    evaluator: BoundedEvaluator,
    patterns: Vec<ScreenedPattern>,
    validation_results: Vec<PatternValidationResult>,
}

impl AnalyzeVulnerabilitiesUseCase {
    /// Build the engine: validate configuration, assemble the active
    /// pattern set, and screen every regex pattern before first use
    pub fn new(config: ControlFlowConfig) -> Result<Self, EngineBuildError> {
        config.validate()?;

        let audit = Arc::new(AuditLog::new());
        // Startup screening events are scoped to the engine, not to any run
        let engine_id = Uuid::new_v4();

        let active = Self::active_set(&config);
        let validator = PatternValidator::new(&config, audit.clone(), engine_id);

        let mut patterns = Vec::with_capacity(active.len());
        let mut validation_results = Vec::new();
        for pattern in active {
            if let MatchSpec::Regex(ref source) = pattern.match_spec {
                let result = validator.validate(source, &pattern.id);
                let valid = result.is_valid;
                validation_results.push(result);
                if !valid {
                    warn!(pattern_id = %pattern.id, "pattern rejected by screening, excluded");
                    continue;
                }
            }
            match CompiledPattern::from_pattern(&pattern) {
                Ok(compiled) => patterns.push(ScreenedPattern { pattern, compiled }),
                Err(e) => {
                    warn!(pattern_id = %pattern.id, error = %e, "pattern failed to compile, excluded");
                }
            }
        }

        info!(
            active_patterns = patterns.len(),
            screened = validation_results.len(),
            "mitigation engine ready"
        );

        Ok(Self {
            config,
            audit,
            evaluator: BoundedEvaluator::new(),
            patterns,
            validation_results,
        })
    }

    /// Merge built-ins with configured patterns, then drop disabled and
    /// overridden ids
    fn active_set(config: &ControlFlowConfig) -> Vec<MitigationPattern> {
        let mut merged = MitigationPattern::builtin_set();
        // Only the built-in set is trusted; a `trusted` flag on a
        // configured pattern is ignored so isolation cannot be opted out of
        merged.extend(config.patterns.iter().cloned().map(|mut p| {
            p.trusted = false;
            p
        }));

        let disabled: HashSet<&str> = config.disabled_patterns.iter().map(String::as_str).collect();
        merged.retain(|p| !disabled.contains(p.id.as_str()));

        // An enabled pattern suppresses every id it overrides
        let overridden: HashSet<String> = merged
            .iter()
            .flat_map(|p| p.overrides.iter().flatten().cloned())
            .collect();
        merged.retain(|p| !overridden.contains(&p.id));

        merged
    }

    /// Screening outcomes for every regex pattern seen at construction
    pub fn validation_results(&self) -> &[PatternValidationResult] {
        &self.validation_results
    }

    /// Patterns that survived screening and compilation
    pub fn active_patterns(&self) -> impl Iterator<Item = &MitigationPattern> {
        self.patterns.iter().map(|s| &s.pattern)
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Analyze every vulnerability against the caller-supplied graphs.
    ///
    /// `cfg` is the graph of the primary file under analysis; `cfg_map`
    /// supplies per-file graphs for cross-file traversal and may be absent.
    /// The optional `cancel` flag requests a cooperative early stop.
    #[instrument(skip_all, fields(vulnerabilities = vulnerabilities.len()))]
    pub fn execute(
        &self,
        vulnerabilities: &[Vulnerability],
        cfg: &ControlFlowGraph,
        cfg_map: Option<&CfgMap>,
        cancel: Option<Arc<AtomicBool>>,
    ) -> AnalysisRun {
        let ctx = RunContext::new(&self.config, self.audit.clone(), cancel);
        let detector = MitigationDetector::new(&self.patterns, &self.evaluator, &self.config);
        let aggregator = FindingAggregator::new();

        let mut findings = Vec::with_capacity(vulnerabilities.len());
        for vuln in vulnerabilities {
            let graph = if vuln.location.file == cfg.file {
                Some(cfg)
            } else {
                cfg_map.and_then(|m| m.get(&vuln.location.file))
            };
            let Some(graph) = graph else {
                warn!(
                    vulnerability_id = %vuln.id,
                    file = %vuln.location.file,
                    "no control-flow graph for vulnerability's file"
                );
                findings.push(aggregator.aggregate(
                    vuln,
                    Vec::new(),
                    Vec::new(),
                    Some(format!(
                        "no control-flow graph for file {}",
                        vuln.location.file
                    )),
                ));
                continue;
            };

            let outcome = detector.detect(vuln, graph, cfg_map, &ctx);
            findings.push(aggregator.aggregate(
                vuln,
                outcome.instances,
                outcome.timeouts,
                outcome.degraded_reason,
            ));
        }

        info!(
            correlation_id = %ctx.correlation_id,
            findings = findings.len(),
            timeouts = ctx.timeout_count(),
            errors = ctx.error_count(),
            "analysis run complete"
        );

        AnalysisRun {
            correlation_id: ctx.correlation_id,
            findings,
            timeout_count: ctx.timeout_count(),
        }
    }
}
