//! Mitigation Analysis Engine
//!
//! Determines whether flagged vulnerable code paths are actually protected by
//! recognized mitigations. The engine screens configured regex patterns for
//! catastrophic-backtracking risk before they are ever executed, runs every
//! match attempt under a hard wall-clock bound, and walks a caller-supplied
//! call graph — across file boundaries when per-file graphs are available —
//! to attribute mitigations to vulnerable paths with auditable, depth-bounded
//! provenance.
//!
//! ## Features
//!
//! - Static ReDoS screening (nested quantifiers, overlapping alternation,
//!   quantified overlap, star height) with a configurable rejection threshold
//!   and a per-pattern whitelist
//! - Bounded pattern evaluation: input ceiling, monotonic timing, isolated
//!   execution for untrusted patterns
//! - Depth-bounded, cycle-safe call-graph traversal with call-chain
//!   provenance for every discovered mitigation
//! - Per-path coverage classification (full / partial / none) with explicit
//!   cross-file attribution
//! - Append-only audit trail of every decision
//!
//! ## Usage
//!
//! ```rust
//! use mitigation_engine::AnalyzeVulnerabilitiesUseCase;
//! use mitigation_engine::config::ControlFlowConfig;
//!
//! let engine = AnalyzeVulnerabilitiesUseCase::new(ControlFlowConfig::default()).unwrap();
//! ```

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export key types for composition root wiring
pub use application::analyze::{AnalysisRun, AnalyzeVulnerabilitiesUseCase, EngineBuildError};
pub use config::{ControlFlowConfig, Validate, ValidationError};
pub use domain::finding::{CrossFileMitigation, Finding, MitigationStatus, PatternTimeout};
pub use domain::graph::{CallEdge, CfgMap, ControlFlowGraph, FunctionNode, Statement};
pub use domain::mitigation::{CallChainEntry, Location, MitigationInstance, Vulnerability};
pub use domain::pattern::{
    MatchSpec, MitigationPattern, PatternEvaluationResult, PatternScope, PatternValidationResult,
    RedosRisk,
};
pub use domain::value_objects::Confidence;
pub use infrastructure::audit::{AuditCategory, AuditEvent, AuditLog};
