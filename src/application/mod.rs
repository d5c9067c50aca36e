//! Application layer
//!
//! Use-case entry points wiring the infrastructure engines together.

pub mod analyze;

pub use analyze::{AnalysisRun, AnalyzeVulnerabilitiesUseCase, EngineBuildError};
