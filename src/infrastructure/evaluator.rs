//! Bounded pattern evaluation
//!
//! Every match attempt runs under a hard wall-clock bound so one bad
//! pattern cannot stall the analysis. Defense layers, in order:
//!
//! 1. Input length ceiling — oversized inputs are non-matching without
//!    execution
//! 2. Monotonic timing — a completed match that overran the bound is still
//!    reported as a timeout, and a timeout always forces `matched = false`
//! 3. Isolation — untrusted patterns execute on a detached worker thread
//!    awaited with `recv_timeout`; a hung worker is abandoned, never joined.
//!    Trusted built-ins run inline.
//!
//! The evaluator never raises to its caller: engine runtime failures become
//! a non-matching result with an error reason.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, warn};

use crate::domain::pattern::{MatchSpec, MitigationPattern, PatternEvaluationResult};
use crate::infrastructure::regex_cache;
use crate::infrastructure::run_context::RunContext;

/// A pattern compiled for evaluation
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub id: String,
    /// Pre-vetted patterns may evaluate inline; untrusted ones are isolated
    pub trusted: bool,
    matcher: Regex,
}

impl CompiledPattern {
    /// Compile a pattern's match spec. Name specs become a word-bounded
    /// call-site match over the escaped literal.
    pub fn from_pattern(pattern: &MitigationPattern) -> Result<Self, regex::Error> {
        let source = match &pattern.match_spec {
            MatchSpec::Name(name) => format!(r"\b{}\s*\(", regex::escape(name)),
            MatchSpec::Regex(source) => source.clone(),
        };
        Ok(Self {
            id: pattern.id.clone(),
            trusted: pattern.trusted,
            matcher: regex_cache::compile(&source)?,
        })
    }

    fn is_match(&self, input: &str) -> bool {
        self.matcher.is_match(input)
    }
}

/// A validated pattern paired with its compiled matcher, the unit the
/// detector works with
#[derive(Debug, Clone)]
pub struct ScreenedPattern {
    pub pattern: MitigationPattern,
    pub compiled: CompiledPattern,
}

enum MatchOutcome {
    Completed(bool),
    TimedOut,
    Failed(String),
}

/// Executes pattern matches under the configured bounds
#[derive(Debug, Default)]
pub struct BoundedEvaluator;

impl BoundedEvaluator {
    /// Inputs above this many bytes are rejected as non-matching without
    /// attempting execution
    pub const MAX_INPUT_BYTES: usize = 10 * 1024;

    pub fn new() -> Self {
        Self
    }

    /// Run one bounded match attempt. Never panics, never blocks past
    /// `timeout_ms` plus scheduling overhead. Timeouts are tallied on the
    /// run context and audited there.
    pub fn evaluate(
        &self,
        pattern: &CompiledPattern,
        input: &str,
        timeout_ms: u64,
        ctx: &RunContext,
    ) -> PatternEvaluationResult {
        let input_length = input.len();
        if input_length > Self::MAX_INPUT_BYTES {
            debug!(
                pattern_id = %pattern.id,
                input_length,
                "input exceeds evaluation ceiling, treated as non-matching"
            );
            return PatternEvaluationResult {
                pattern_id: pattern.id.clone(),
                matched: false,
                timed_out: false,
                elapsed_ms: 0,
                input_length,
                error: Some(format!(
                    "input length {} exceeds {} byte ceiling",
                    input_length,
                    Self::MAX_INPUT_BYTES
                )),
            };
        }

        let timeout = Duration::from_millis(timeout_ms);
        let start = Instant::now();

        let outcome = if pattern.trusted {
            Self::evaluate_inline(pattern, input)
        } else {
            Self::evaluate_isolated(pattern, input, timeout, start)
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;

        // The monotonic clock is authoritative: even a completed match that
        // overran the bound counts as a timeout and cannot claim a match.
        let overran = start.elapsed() > timeout;
        let (matched, timed_out, error) = match outcome {
            MatchOutcome::Completed(matched) if !overran => (matched, false, None),
            MatchOutcome::Completed(_) => (false, true, None),
            MatchOutcome::TimedOut => (false, true, None),
            MatchOutcome::Failed(reason) => (false, false, Some(reason)),
        };

        if timed_out {
            ctx.record_timeout(&pattern.id, elapsed_ms, input_length);
        }
        if let Some(ref reason) = error {
            warn!(pattern_id = %pattern.id, reason, "pattern evaluation failed");
            ctx.record_error();
        }

        PatternEvaluationResult {
            pattern_id: pattern.id.clone(),
            matched,
            timed_out,
            elapsed_ms,
            input_length,
            error,
        }
    }

    /// Trusted patterns run on the calling thread; a panic in the regex
    /// engine is caught and converted, never propagated.
    fn evaluate_inline(pattern: &CompiledPattern, input: &str) -> MatchOutcome {
        match catch_unwind(AssertUnwindSafe(|| pattern.is_match(input))) {
            Ok(matched) => MatchOutcome::Completed(matched),
            Err(_) => MatchOutcome::Failed("match engine panicked".to_string()),
        }
    }

    /// Untrusted patterns run on a worker thread the evaluator can walk
    /// away from. On timeout the worker is abandoned (detached, its result
    /// discarded); a worker that dies without sending is a failure, not a
    /// timeout.
    fn evaluate_isolated(
        pattern: &CompiledPattern,
        input: &str,
        timeout: Duration,
        start: Instant,
    ) -> MatchOutcome {
        let (tx, rx) = mpsc::channel();
        let matcher = pattern.matcher.clone();
        let owned_input = input.to_string();

        let spawned = thread::Builder::new()
            .name(format!("pattern-eval-{}", pattern.id))
            .spawn(move || {
                let _ = tx.send(matcher.is_match(&owned_input));
            });
        if let Err(e) = spawned {
            return MatchOutcome::Failed(format!("failed to spawn evaluation thread: {e}"));
        }

        let remaining = timeout.saturating_sub(start.elapsed());
        match rx.recv_timeout(remaining) {
            Ok(matched) => MatchOutcome::Completed(matched),
            Err(mpsc::RecvTimeoutError::Timeout) => MatchOutcome::TimedOut,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                MatchOutcome::Failed("evaluation thread terminated without a result".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlFlowConfig;
    use crate::domain::pattern::PatternScope;
    use crate::infrastructure::audit::AuditLog;
    use std::sync::Arc;

    fn ctx() -> RunContext {
        RunContext::new(&ControlFlowConfig::default(), Arc::new(AuditLog::new()), None)
    }

    fn regex_pattern(id: &str, source: &str, trusted: bool) -> CompiledPattern {
        CompiledPattern::from_pattern(&MitigationPattern {
            id: id.to_string(),
            match_spec: MatchSpec::Regex(source.to_string()),
            scope: PatternScope::Global,
            overrides: None,
            trusted,
        })
        .unwrap()
    }

    #[test]
    fn test_trusted_match_inline() {
        let pattern = regex_pattern("p1", r"validate\w+", true);
        let result = BoundedEvaluator::new().evaluate(&pattern, "validate_input(user)", 100, &ctx());
        assert!(result.matched);
        assert!(!result.timed_out);
        assert!(result.elapsed_ms < 100);
    }

    #[test]
    fn test_untrusted_match_isolated() {
        let pattern = regex_pattern("p2", r"clean\(", false);
        let result = BoundedEvaluator::new().evaluate(&pattern, "x = clean(y)", 500, &ctx());
        assert!(result.matched);
        assert!(!result.timed_out);
    }

    #[test]
    fn test_input_ceiling() {
        let pattern = regex_pattern("p3", "a", true);
        let oversized = "a".repeat(BoundedEvaluator::MAX_INPUT_BYTES + 1);
        let result = BoundedEvaluator::new().evaluate(&pattern, &oversized, 100, &ctx());
        assert!(!result.matched);
        assert!(!result.timed_out);
        assert!(result.error.as_deref().unwrap_or("").contains("ceiling"));
    }

    #[test]
    fn test_name_spec_matches_call_site() {
        let pattern = CompiledPattern::from_pattern(&MitigationPattern {
            id: "builtin-sanitize".to_string(),
            match_spec: MatchSpec::Name("sanitize".to_string()),
            scope: PatternScope::Global,
            overrides: None,
            trusted: true,
        })
        .unwrap();
        let evaluator = BoundedEvaluator::new();
        let context = ctx();

        assert!(
            evaluator
                .evaluate(&pattern, "clean = sanitize(user_input)", 100, &context)
                .matched
        );
        assert!(
            !evaluator
                .evaluate(&pattern, "desanitized = foo(user_input)", 100, &context)
                .matched
        );
    }
}
