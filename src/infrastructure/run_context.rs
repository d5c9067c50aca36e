//! Per-run analysis context
//!
//! Budgets, tallies, and cancellation for one analysis invocation. Scoped
//! to the run and passed explicitly through the traversal — no module-level
//! state, so concurrent runs stay independent.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use uuid::Uuid;

use crate::config::ControlFlowConfig;
use crate::infrastructure::audit::{AuditCategory, AuditLog};

/// Mutable state for one analysis run
///
/// Single-threaded by design; the interior mutability here is `Cell`, not
/// atomics, because no traversal state ever crosses a thread boundary.
#[derive(Debug)]
pub struct RunContext {
    /// Correlation id scoping audit events to this run
    pub correlation_id: Uuid,
    pub audit: Arc<AuditLog>,
    deadline: Instant,
    time_budget: Duration,
    size_budget_lines: u64,
    charged_files: RefCell<HashSet<String>>,
    lines_entered: Cell<u64>,
    timeout_count: Cell<u32>,
    error_count: Cell<u32>,
    cancel: Option<Arc<AtomicBool>>,
}

impl RunContext {
    pub fn new(
        config: &ControlFlowConfig,
        audit: Arc<AuditLog>,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Self {
        let time_budget = Duration::from_millis(config.time_budget_ms);
        Self {
            correlation_id: Uuid::new_v4(),
            audit,
            deadline: Instant::now() + time_budget,
            time_budget,
            size_budget_lines: config.size_budget_lines,
            charged_files: RefCell::new(HashSet::new()),
            lines_entered: Cell::new(0),
            timeout_count: Cell::new(0),
            error_count: Cell::new(0),
            cancel,
        }
    }

    /// True once the wall-clock ceiling for the run has passed
    pub fn over_time_budget(&self) -> bool {
        self.time_budget.is_zero() || Instant::now() >= self.deadline
    }

    /// Charge a file graph's lines against the size budget the first time
    /// that file is entered during the run; repeat visits are free. Returns
    /// true when the budget is now exceeded.
    pub fn charge_file(&self, file: &str, lines: u64) -> bool {
        if !self.charged_files.borrow_mut().insert(file.to_string()) {
            return false;
        }
        let total = self.lines_entered.get().saturating_add(lines);
        self.lines_entered.set(total);
        total > self.size_budget_lines
    }

    /// True when the caller requested an early stop
    pub fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Tally one evaluation timeout and emit its audit event
    pub fn record_timeout(&self, pattern_id: &str, elapsed_ms: u64, input_length: usize) {
        self.timeout_count.set(self.timeout_count.get() + 1);
        self.audit.record(
            AuditCategory::PatternTimeout,
            self.correlation_id,
            json!({
                "pattern_id": pattern_id,
                "elapsed_ms": elapsed_ms,
                "input_length": input_length,
            }),
        );
    }

    /// Tally one evaluation runtime error
    pub fn record_error(&self) {
        self.error_count.set(self.error_count.get() + 1);
    }

    pub fn timeout_count(&self) -> u32 {
        self.timeout_count.get()
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.get()
    }
}
