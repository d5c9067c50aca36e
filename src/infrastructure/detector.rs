//! Mitigation detection
//!
//! Walks the caller-supplied graph to find protective code for a
//! vulnerability. Detection starts at depth 0 in the vulnerability's own
//! file, then — when full coverage is still missing and per-file graphs are
//! available — follows call edges outward (callers and callees) up to the
//! configured depth, recording one call-chain frame per hop. A visited set
//! scoped to the vulnerability breaks cycles; duplicate matches reached via
//! different paths collapse to one instance. Global budgets and cooperative
//! cancellation are checked between node visits, never mid-evaluation.

use std::collections::{HashSet, VecDeque};

use serde_json::json;
use tracing::{debug, trace};

use crate::config::ControlFlowConfig;
use crate::domain::finding::PatternTimeout;
use crate::domain::graph::{CfgMap, ControlFlowGraph, FunctionNode};
use crate::domain::mitigation::{CallChainEntry, Location, MitigationInstance, Vulnerability};
use crate::domain::pattern::PatternScope;
use crate::domain::value_objects::Confidence;
use crate::infrastructure::audit::AuditCategory;
use crate::infrastructure::evaluator::{BoundedEvaluator, ScreenedPattern};
use crate::infrastructure::run_context::RunContext;

/// Everything one detection pass learned
#[derive(Debug, Default)]
pub struct DetectionOutcome {
    pub instances: Vec<MitigationInstance>,
    /// Evaluations that hit the wall-clock bound while computing this
    /// vulnerability's coverage
    pub timeouts: Vec<PatternTimeout>,
    /// Set when a budget or cancellation cut the walk short
    pub degraded_reason: Option<String>,
}

/// One pending node in the outward walk
struct Frame {
    file: String,
    function: String,
    depth: u32,
    chain: Vec<CallChainEntry>,
}

struct DetectState {
    instances: Vec<MitigationInstance>,
    timeouts: Vec<PatternTimeout>,
    /// Dedupe key: (pattern id, file, line)
    seen: HashSet<(String, String, u32)>,
    covered: HashSet<String>,
}

/// Finds mitigations protecting a vulnerability's candidate paths
pub struct MitigationDetector<'a> {
    patterns: &'a [ScreenedPattern],
    evaluator: &'a BoundedEvaluator,
    config: &'a ControlFlowConfig,
}

impl<'a> MitigationDetector<'a> {
    pub fn new(
        patterns: &'a [ScreenedPattern],
        evaluator: &'a BoundedEvaluator,
        config: &'a ControlFlowConfig,
    ) -> Self {
        Self {
            patterns,
            evaluator,
            config,
        }
    }

    /// Walk the graph for one vulnerability
    pub fn detect(
        &self,
        vuln: &Vulnerability,
        cfg: &ControlFlowGraph,
        cfg_map: Option<&CfgMap>,
        ctx: &RunContext,
    ) -> DetectionOutcome {
        let mut state = DetectState {
            instances: Vec::new(),
            timeouts: Vec::new(),
            seen: HashSet::new(),
            covered: HashSet::new(),
        };

        if ctx.charge_file(&cfg.file, cfg.line_count()) {
            return self.finish(state, Some("size budget exceeded".to_string()), ctx);
        }

        // Depth 0: the vulnerability's own file. Function-local patterns
        // only apply inside the vulnerable function itself.
        let mut degraded = None;
        for node in cfg.functions() {
            if let Some(reason) = stop_reason(ctx) {
                degraded = Some(reason);
                break;
            }
            let chain_line = if node.name == vuln.function_name {
                vuln.location.line
            } else {
                node.start_line
            };
            let chain = vec![CallChainEntry {
                file: cfg.file.clone(),
                function_name: node.name.clone(),
                line: chain_line,
            }];
            self.scan_function(vuln, node, &cfg.file, 0, &chain, &mut state, ctx);
        }

        if degraded.is_some() || self.fully_covered(vuln, &state) {
            return self.finish(state, degraded, ctx);
        }
        let Some(cfg_map) = cfg_map else {
            return self.finish(state, None, ctx);
        };

        // Outward walk over call edges, callers and callees alike
        let mut visited: HashSet<(String, String)> = HashSet::new();
        visited.insert((cfg.file.clone(), vuln.function_name.clone()));

        let mut queue: VecDeque<Frame> = VecDeque::new();
        if let Some(origin) = cfg.function(&vuln.function_name) {
            let origin_entry = CallChainEntry {
                file: cfg.file.clone(),
                function_name: vuln.function_name.clone(),
                line: vuln.location.line,
            };
            push_neighbors(&mut queue, origin, &[origin_entry], 1);
        } else {
            debug!(
                function = %vuln.function_name,
                file = %cfg.file,
                "vulnerable function not present in its graph, cross-file walk skipped"
            );
        }

        while let Some(frame) = queue.pop_front() {
            if let Some(reason) = stop_reason(ctx) {
                degraded = Some(reason);
                break;
            }
            let key = (frame.file.clone(), frame.function.clone());
            if !visited.insert(key) {
                // Cycle or alternate route into an already-walked function
                trace!(file = %frame.file, function = %frame.function, "already visited, skipping");
                continue;
            }

            let graph = if frame.file == cfg.file {
                Some(cfg)
            } else {
                cfg_map.get(&frame.file)
            };
            let Some(graph) = graph else {
                debug!(file = %frame.file, "no graph for file, edge not followed");
                continue;
            };
            if ctx.charge_file(&frame.file, graph.line_count()) {
                degraded = Some("size budget exceeded".to_string());
                break;
            }
            let Some(node) = graph.function(&frame.function) else {
                debug!(file = %frame.file, function = %frame.function, "function missing from graph");
                continue;
            };

            self.scan_function(vuln, node, &frame.file, frame.depth, &frame.chain, &mut state, ctx);

            if self.fully_covered(vuln, &state) {
                break;
            }
            if frame.depth < self.config.max_call_depth {
                push_neighbors(&mut queue, node, &frame.chain, frame.depth + 1);
            }
        }

        self.finish(state, degraded, ctx)
    }

    /// Test every applicable pattern against one function's statements
    #[allow(clippy::too_many_arguments)]
    fn scan_function(
        &self,
        vuln: &Vulnerability,
        node: &FunctionNode,
        file: &str,
        depth: u32,
        chain: &[CallChainEntry],
        state: &mut DetectState,
        ctx: &RunContext,
    ) {
        for screened in self.patterns {
            if !self.scope_allows(&screened.pattern.scope, vuln, node, file, depth) {
                continue;
            }
            for stmt in &node.statements {
                let result = self.evaluator.evaluate(
                    &screened.compiled,
                    &stmt.text,
                    self.config.pattern_timeout_ms,
                    ctx,
                );
                if result.timed_out {
                    state.timeouts.push(PatternTimeout {
                        pattern_id: result.pattern_id.clone(),
                        elapsed_ms: result.elapsed_ms,
                        input_length: result.input_length,
                    });
                }
                if !result.matched {
                    continue;
                }

                let key = (screened.pattern.id.clone(), file.to_string(), stmt.line);
                if !state.seen.insert(key) {
                    continue;
                }

                let protected_paths: Vec<String> = vuln
                    .candidate_paths
                    .iter()
                    .filter(|p| stmt.touches.contains(p))
                    .cloned()
                    .collect();
                state.covered.extend(protected_paths.iter().cloned());

                let instance = MitigationInstance {
                    pattern_id: screened.pattern.id.clone(),
                    location: Location::new(file, stmt.line),
                    protected_variables: stmt.touches.clone(),
                    protected_paths,
                    scope: screened.pattern.scope,
                    confidence: self.confidence_at(depth),
                    call_chain: Some(chain.to_vec()),
                    discovery_depth: depth,
                };

                ctx.audit.record(
                    AuditCategory::CallChain,
                    ctx.correlation_id,
                    json!({
                        "pattern_id": instance.pattern_id,
                        "vulnerability_id": vuln.id,
                        "chain": chain,
                        "depth": depth,
                    }),
                );
                if depth > 0 {
                    ctx.audit.record(
                        AuditCategory::CrossFile,
                        ctx.correlation_id,
                        json!({
                            "pattern_id": instance.pattern_id,
                            "vulnerability_id": vuln.id,
                            "file": file,
                            "line": stmt.line,
                            "depth": depth,
                            "function": node.name,
                        }),
                    );
                }

                state.instances.push(instance);
            }
        }
    }

    fn scope_allows(
        &self,
        scope: &PatternScope,
        vuln: &Vulnerability,
        node: &FunctionNode,
        file: &str,
        depth: u32,
    ) -> bool {
        match scope {
            PatternScope::FunctionLocal => depth == 0 && node.name == vuln.function_name,
            PatternScope::File => file == vuln.location.file,
            PatternScope::Global => true,
        }
    }

    fn confidence_at(&self, depth: u32) -> Confidence {
        if depth == 0 {
            Confidence::High
        } else if depth >= self.config.max_call_depth {
            // Still-unresolved paths at the depth limit are reported with
            // reduced confidence rather than searched further
            Confidence::Low
        } else {
            Confidence::Medium
        }
    }

    fn fully_covered(&self, vuln: &Vulnerability, state: &DetectState) -> bool {
        !vuln.candidate_paths.is_empty()
            && vuln.candidate_paths.iter().all(|p| state.covered.contains(p))
    }

    fn finish(
        &self,
        state: DetectState,
        degraded_reason: Option<String>,
        ctx: &RunContext,
    ) -> DetectionOutcome {
        if let Some(ref reason) = degraded_reason {
            debug!(
                correlation_id = %ctx.correlation_id,
                reason,
                "detection stopped early"
            );
        }
        DetectionOutcome {
            instances: state.instances,
            timeouts: state.timeouts,
            degraded_reason,
        }
    }
}

fn stop_reason(ctx: &RunContext) -> Option<String> {
    if ctx.cancelled() {
        return Some("cancelled by caller".to_string());
    }
    if ctx.over_time_budget() {
        return Some("time budget exceeded".to_string());
    }
    None
}

fn push_neighbors(queue: &mut VecDeque<Frame>, node: &FunctionNode, chain: &[CallChainEntry], depth: u32) {
    for edge in node.callees.iter().chain(node.callers.iter()) {
        let mut next_chain = chain.to_vec();
        next_chain.push(CallChainEntry {
            file: edge.file.clone(),
            function_name: edge.function.clone(),
            line: edge.line,
        });
        queue.push_back(Frame {
            file: edge.file.clone(),
            function: edge.function.clone(),
            depth,
            chain: next_chain,
        });
    }
}
