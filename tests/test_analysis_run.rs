//! End-to-end analysis runs through the use case

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mitigation_engine::config::ControlFlowConfig;
use mitigation_engine::infrastructure::audit::AuditCategory;
use mitigation_engine::{
    AnalyzeVulnerabilitiesUseCase, CallEdge, CfgMap, ControlFlowGraph, FunctionNode, Location,
    MitigationStatus, Statement, Vulnerability,
};

fn stmt(line: u32, text: &str, touches: &[&str]) -> Statement {
    Statement {
        line,
        text: text.to_string(),
        touches: touches.iter().map(|s| s.to_string()).collect(),
    }
}

fn node(name: &str, start: u32, end: u32, statements: Vec<Statement>) -> FunctionNode {
    FunctionNode {
        name: name.to_string(),
        start_line: start,
        end_line: end,
        statements,
        callees: vec![],
        callers: vec![],
    }
}

fn vuln(id: &str, file: &str, function: &str, line: u32, paths: &[&str]) -> Vulnerability {
    Vulnerability {
        id: id.to_string(),
        location: Location::new(file, line),
        function_name: function.to_string(),
        candidate_paths: paths.iter().map(|s| s.to_string()).collect(),
    }
}

fn app_graph() -> ControlFlowGraph {
    let mut cfg = ControlFlowGraph::new("app.py");
    cfg.add_function(node(
        "handler",
        1,
        30,
        vec![stmt(5, "clean = sanitize(user_input)", &["user_input"])],
    ));
    cfg
}

#[test]
fn test_run_with_builtin_patterns_reaches_full_coverage() {
    let engine = AnalyzeVulnerabilitiesUseCase::new(ControlFlowConfig::default()).unwrap();
    let cfg = app_graph();
    let vulns = [vuln("v1", "app.py", "handler", 12, &["user_input"])];

    let run = engine.execute(&vulns, &cfg, None, None);

    assert_eq!(run.findings.len(), 1);
    let finding = &run.findings[0];
    assert_eq!(finding.vulnerability_id, "v1");
    assert_eq!(finding.mitigation_status, MitigationStatus::Full);
    assert!(!finding.degraded);
    assert_eq!(run.timeout_count, 0);

    // The run's audit events all carry its correlation id
    let run_events: Vec<_> = engine
        .audit()
        .events()
        .into_iter()
        .filter(|e| e.correlation_id == run.correlation_id)
        .collect();
    assert!(!run_events.is_empty());
    assert!(run_events
        .iter()
        .any(|e| e.category == AuditCategory::CallChain));
}

#[test]
fn test_cross_file_coverage_end_to_end() {
    let mut cfg = ControlFlowGraph::new("app.py");
    let mut handler = node("handler", 1, 30, vec![]);
    handler.callees.push(CallEdge {
        file: "util.py".to_string(),
        function: "check_all".to_string(),
        line: 8,
    });
    cfg.add_function(handler);

    let mut util = ControlFlowGraph::new("util.py");
    util.add_function(node(
        "check_all",
        1,
        15,
        vec![stmt(4, "value = sanitize(value)", &["user_input"])],
    ));
    let mut cfg_map = CfgMap::new();
    cfg_map.insert("util.py".to_string(), util);

    let engine = AnalyzeVulnerabilitiesUseCase::new(ControlFlowConfig::default()).unwrap();
    let vulns = [vuln("v1", "app.py", "handler", 12, &["user_input"])];
    let run = engine.execute(&vulns, &cfg, Some(&cfg_map), None);

    let finding = &run.findings[0];
    assert_eq!(finding.mitigation_status, MitigationStatus::Full);
    assert_eq!(finding.cross_file_mitigations.len(), 1);
    assert_eq!(finding.cross_file_mitigations[0].file, "util.py");
    assert_eq!(finding.cross_file_mitigations[0].depth, 1);
}

#[test]
fn test_missing_graph_yields_degraded_finding() {
    let engine = AnalyzeVulnerabilitiesUseCase::new(ControlFlowConfig::default()).unwrap();
    let cfg = app_graph();
    let vulns = [vuln("v-lost", "elsewhere.py", "handler", 3, &["x"])];

    let run = engine.execute(&vulns, &cfg, None, None);

    let finding = &run.findings[0];
    assert_eq!(finding.mitigation_status, MitigationStatus::None);
    assert!(finding.degraded);
    assert!(finding
        .degraded_reason
        .as_deref()
        .unwrap_or("")
        .contains("no control-flow graph"));
}

#[test]
fn test_zero_time_budget_degrades_every_finding() {
    let config = ControlFlowConfig {
        time_budget_ms: 0,
        ..Default::default()
    };
    let engine = AnalyzeVulnerabilitiesUseCase::new(config).unwrap();
    let cfg = app_graph();
    let vulns = [
        vuln("v1", "app.py", "handler", 12, &["user_input"]),
        vuln("v2", "app.py", "handler", 14, &["user_input"]),
    ];

    let run = engine.execute(&vulns, &cfg, None, None);

    assert_eq!(run.findings.len(), 2);
    for finding in &run.findings {
        assert!(finding.degraded);
        assert_eq!(finding.degraded_reason.as_deref(), Some("time budget exceeded"));
        assert_eq!(finding.mitigation_status, MitigationStatus::None);
    }
}

#[test]
fn test_cancellation_degrades_run() {
    let engine = AnalyzeVulnerabilitiesUseCase::new(ControlFlowConfig::default()).unwrap();
    let cfg = app_graph();
    let vulns = [vuln("v1", "app.py", "handler", 12, &["user_input"])];

    let cancel = Arc::new(AtomicBool::new(false));
    cancel.store(true, Ordering::Relaxed);
    let run = engine.execute(&vulns, &cfg, None, Some(cancel));

    let finding = &run.findings[0];
    assert!(finding.degraded);
    assert_eq!(finding.degraded_reason.as_deref(), Some("cancelled by caller"));
}

#[test]
fn test_identical_inputs_produce_identical_findings() {
    let engine = AnalyzeVulnerabilitiesUseCase::new(ControlFlowConfig::default()).unwrap();
    let cfg = app_graph();
    let vulns = [vuln("v1", "app.py", "handler", 12, &["user_input", "session"])];

    let first = engine.execute(&vulns, &cfg, None, None);
    let second = engine.execute(&vulns, &cfg, None, None);

    let a = serde_json::to_string(&first.findings).unwrap();
    let b = serde_json::to_string(&second.findings).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_size_budget_counts_each_file_once_per_run() {
    // Several vulnerabilities in one large file charge that file's lines
    // against the size budget a single time, not once per vulnerability
    let mut cfg = ControlFlowGraph::new("app.py");
    cfg.add_function(node(
        "handler",
        1,
        4_000,
        vec![stmt(5, "clean = sanitize(user_input)", &["user_input"])],
    ));

    let engine = AnalyzeVulnerabilitiesUseCase::new(ControlFlowConfig::default()).unwrap();
    let vulns = [
        vuln("v1", "app.py", "handler", 12, &["user_input"]),
        vuln("v2", "app.py", "handler", 80, &["user_input"]),
        vuln("v3", "app.py", "handler", 200, &["user_input"]),
    ];

    let run = engine.execute(&vulns, &cfg, None, None);

    assert_eq!(run.findings.len(), 3);
    for finding in &run.findings {
        assert!(!finding.degraded, "finding {} degraded", finding.vulnerability_id);
        assert_eq!(finding.mitigation_status, MitigationStatus::Full);
    }
}

#[test]
fn test_findings_follow_input_order() {
    let mut cfg = app_graph();
    cfg.add_function(node("other", 31, 40, vec![]));

    let engine = AnalyzeVulnerabilitiesUseCase::new(ControlFlowConfig::default()).unwrap();
    let vulns = [
        vuln("v-b", "app.py", "other", 33, &["x"]),
        vuln("v-a", "app.py", "handler", 12, &["user_input"]),
    ];

    let run = engine.execute(&vulns, &cfg, None, None);
    let ids: Vec<_> = run.findings.iter().map(|f| f.vulnerability_id.as_str()).collect();
    assert_eq!(ids, vec!["v-b", "v-a"]);
}
