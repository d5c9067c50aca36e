//! Integration tests for startup pattern screening

use std::sync::Arc;
use uuid::Uuid;

use mitigation_engine::config::ControlFlowConfig;
use mitigation_engine::infrastructure::audit::{AuditCategory, AuditLog};
use mitigation_engine::infrastructure::validator::PatternValidator;
use mitigation_engine::RedosRisk;

fn validator_with(config: ControlFlowConfig) -> (PatternValidator, Arc<AuditLog>) {
    let audit = Arc::new(AuditLog::new());
    let validator = PatternValidator::new(&config, audit.clone(), Uuid::new_v4());
    (validator, audit)
}

#[test]
fn test_nested_quantifier_rejected_as_high_risk() {
    let (validator, _) = validator_with(ControlFlowConfig::default());
    let result = validator.validate("(a+)+", "p-nested");

    assert!(!result.is_valid);
    assert_eq!(result.redos_risk, RedosRisk::High);
    assert!(result.vulnerability_score >= 70);
    assert!(result
        .rejection_reasons
        .iter()
        .any(|r| r.contains("nested quantifiers")));
    assert!(!result.whitelisted);
}

#[test]
fn test_safe_pattern_accepted() {
    let (validator, _) = validator_with(ControlFlowConfig::default());
    let result = validator.validate(r"validate\w+", "p-safe");

    assert!(result.is_valid);
    assert_eq!(result.redos_risk, RedosRisk::None);
    assert_eq!(result.vulnerability_score, 0);
    assert!(result.rejection_reasons.is_empty());
}

#[test]
fn test_whitelist_bypasses_screening() {
    let config = ControlFlowConfig {
        whitelisted_patterns: vec!["p-known".to_string()],
        ..Default::default()
    };
    let (validator, _) = validator_with(config);
    let result = validator.validate("(a+)+", "p-known");

    assert!(result.is_valid);
    assert!(result.whitelisted);
    assert_eq!(result.vulnerability_score, 0);
}

#[test]
fn test_rejection_threshold_is_configurable() {
    // Overlapping alternation alone scores in the medium band
    let default_cfg = ControlFlowConfig::default();
    let (strict, _) = validator_with(default_cfg);
    assert!(!strict.validate("(a|ab)+", "p-overlap").is_valid);

    let lenient_cfg = ControlFlowConfig {
        rejection_threshold: RedosRisk::High,
        ..Default::default()
    };
    let (lenient, _) = validator_with(lenient_cfg);
    let result = lenient.validate("(a|ab)+", "p-overlap");
    assert!(result.is_valid);
    assert_eq!(result.redos_risk, RedosRisk::Medium);
}

#[test]
fn test_uncompilable_pattern_rejected() {
    let (validator, _) = validator_with(ControlFlowConfig::default());
    let result = validator.validate("(unclosed", "p-bad");

    assert!(!result.is_valid);
    assert!(result
        .rejection_reasons
        .iter()
        .any(|r| r.contains("compilation")));
}

#[test]
fn test_screening_is_audited() {
    let (validator, audit) = validator_with(ControlFlowConfig::default());
    validator.validate("(a+)+", "p-nested");
    validator.validate(r"clean\(", "p-safe");

    let validations = audit.events_in_category(AuditCategory::PatternValidation);
    assert_eq!(validations.len(), 2);

    // The dangerous pattern additionally leaves a detection event naming
    // the construct
    let detections = audit.events_in_category(AuditCategory::RedosDetection);
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].context["pattern_id"], "p-nested");
}

#[test]
fn test_quantified_overlap_detected() {
    let (validator, _) = validator_with(ControlFlowConfig::default());
    let result = validator.validate("(.*a){3}", "p-bounded");

    assert!(!result.is_valid);
    assert!(result
        .rejection_reasons
        .iter()
        .any(|r| r.contains("quantified overlap")));
}

#[test]
fn test_screening_never_panics_on_hostile_input() {
    let (validator, _) = validator_with(ControlFlowConfig::default());
    for pattern in [
        "",
        "\\",
        "((((",
        "))))",
        "[a-",
        "{,}",
        "a{999999}",
        "(?:)",
        "日本語+",
        "(((a+)+)+)+",
    ] {
        let _ = validator.validate(pattern, "p-hostile");
    }
}
