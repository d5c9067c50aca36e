//! Infrastructure services
//!
//! The engines: static ReDoS screening, bounded pattern evaluation, the
//! depth-bounded call-graph walk, coverage aggregation, and the audit trail.

pub mod aggregator;
pub mod audit;
pub mod detector;
pub mod evaluator;
pub mod regex_cache;
pub mod run_context;
pub mod validator;
