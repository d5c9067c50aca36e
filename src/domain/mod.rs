//! Domain types for mitigation analysis
//!
//! Immutable data model: patterns and their screening results, the
//! caller-owned graph input, located mitigations with call-chain provenance,
//! and the per-vulnerability finding emitted to the reporting layer.

pub mod finding;
pub mod graph;
pub mod mitigation;
pub mod pattern;
pub mod value_objects;

pub use finding::{CrossFileMitigation, Finding, MitigationStatus, PatternTimeout};
pub use graph::{CallEdge, CfgMap, ControlFlowGraph, FunctionNode, Statement};
pub use mitigation::{CallChainEntry, Location, MitigationInstance, Vulnerability};
pub use pattern::{
    MatchSpec, MitigationPattern, PatternEvaluationResult, PatternScope, PatternValidationResult,
    RedosRisk,
};
pub use value_objects::Confidence;
