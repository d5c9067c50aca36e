//! Audit trail
//!
//! Append-only, structured event sink. The logger performs no judgment —
//! it records what the other components decided. Every event carries the
//! correlation id scoping it to one analysis run (or to engine construction
//! for startup screening), a UTC timestamp, and category-specific context.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// Fixed event categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    PatternValidation,
    RedosDetection,
    PatternTimeout,
    CrossFile,
    CallChain,
}

impl std::fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditCategory::PatternValidation => write!(f, "pattern_validation"),
            AuditCategory::RedosDetection => write!(f, "redos_detection"),
            AuditCategory::PatternTimeout => write!(f, "pattern_timeout"),
            AuditCategory::CrossFile => write!(f, "cross_file"),
            AuditCategory::CallChain => write!(f, "call_chain"),
        }
    }
}

/// One recorded event
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub category: AuditCategory,
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub context: Value,
}

/// Append-only event log, mirrored to `tracing` at debug level
#[derive(Debug, Default)]
pub struct AuditLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one event
    pub fn record(&self, category: AuditCategory, correlation_id: Uuid, context: Value) {
        debug!(
            category = %category,
            correlation_id = %correlation_id,
            context = %context,
            "audit event"
        );
        let event = AuditEvent {
            category,
            correlation_id,
            timestamp: Utc::now(),
            context,
        };
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.push(event);
    }

    /// Snapshot of every recorded event, in record order
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Snapshot filtered to one category
    pub fn events_in_category(&self, category: AuditCategory) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.category == category)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_and_snapshot() {
        let log = AuditLog::new();
        let run = Uuid::new_v4();
        log.record(
            AuditCategory::PatternTimeout,
            run,
            json!({"pattern_id": "p1", "elapsed_ms": 120}),
        );
        log.record(AuditCategory::CrossFile, run, json!({"file": "util.py"}));

        assert_eq!(log.len(), 2);
        let timeouts = log.events_in_category(AuditCategory::PatternTimeout);
        assert_eq!(timeouts.len(), 1);
        assert_eq!(timeouts[0].correlation_id, run);
        assert_eq!(timeouts[0].context["pattern_id"], "p1");
    }

    #[test]
    fn test_events_keep_record_order() {
        let log = AuditLog::new();
        let run = Uuid::new_v4();
        for i in 0..5 {
            log.record(AuditCategory::CallChain, run, json!({ "seq": i }));
        }
        let events = log.events();
        let seqs: Vec<_> = events.iter().map(|e| e.context["seq"].clone()).collect();
        assert_eq!(seqs, vec![json!(0), json!(1), json!(2), json!(3), json!(4)]);
    }
}
