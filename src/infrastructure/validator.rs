//! Static ReDoS screening
//!
//! Assesses untrusted regex patterns for catastrophic-backtracking risk
//! before they are ever executed. Purely structural — the pattern is never
//! run against real input here. Detected constructs:
//!
//! - Nested quantifiers: a quantified group containing a quantified
//!   sub-expression, e.g. `(a+)+`
//! - Overlapping alternation: alternatives inside a quantified group that
//!   can match the same text, e.g. `(a|a)+` or `(a|ab)+`
//! - Quantified overlap: an unbounded sub-expression under a bounded
//!   repetition, e.g. `(.*a){3}`
//! - Star height: nesting depth of unbounded repetition operators
//!
//! Screening is deterministic, side-effect-free beyond logging, and never
//! errors: every failure mode lands in the returned
//! [`PatternValidationResult`]. Overruns of the screening time box fail
//! closed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ControlFlowConfig;
use crate::domain::pattern::{PatternValidationResult, RedosRisk};
use crate::infrastructure::audit::{AuditCategory, AuditLog};
use crate::infrastructure::regex_cache;

// Composite score weights. Chosen so a single nested quantifier lands in
// the high band and a single overlapping alternation in the medium band;
// tuning happens through `rejection_threshold`, not by editing these.
const NESTED_QUANTIFIER_WEIGHT: u32 = 60;
const OVERLAPPING_ALTERNATION_WEIGHT: u32 = 50;
const QUANTIFIED_OVERLAP_WEIGHT: u32 = 40;
const STAR_HEIGHT_WEIGHT: u32 = 15;

/// A vulnerable construct located in the pattern text
#[derive(Debug, Clone)]
struct Construct {
    kind: &'static str,
    fragment: String,
}

/// Structural signals extracted from one pattern
#[derive(Debug, Default)]
struct Signals {
    constructs: Vec<Construct>,
    star_height: u32,
}

/// Screens patterns for ReDoS risk at startup
pub struct PatternValidator {
    rejection_threshold: RedosRisk,
    whitelist: HashSet<String>,
    validation_timeout: Duration,
    audit: Arc<AuditLog>,
    correlation_id: Uuid,
}

impl PatternValidator {
    /// `correlation_id` scopes the screening audit events, normally the
    /// engine's build id.
    pub fn new(config: &ControlFlowConfig, audit: Arc<AuditLog>, correlation_id: Uuid) -> Self {
        Self {
            rejection_threshold: config.rejection_threshold,
            whitelist: config.whitelisted_patterns.iter().cloned().collect(),
            validation_timeout: Duration::from_millis(config.validation_timeout_ms),
            audit,
            correlation_id,
        }
    }

    /// Screen one pattern. Deterministic; never panics or errors.
    pub fn validate(&self, pattern: &str, pattern_id: &str) -> PatternValidationResult {
        let start = Instant::now();

        if self.whitelist.contains(pattern_id) {
            debug!(pattern_id, "pattern whitelisted, screening skipped");
            let result = PatternValidationResult {
                pattern: pattern.to_string(),
                pattern_id: pattern_id.to_string(),
                is_valid: true,
                rejection_reasons: Vec::new(),
                redos_risk: RedosRisk::None,
                vulnerability_score: 0,
                validation_time_ms: elapsed_ms(start),
                whitelisted: true,
            };
            self.audit_validation(&result);
            return result;
        }

        let deadline = start + self.validation_timeout;
        self.validate_inner(pattern, pattern_id, start, deadline)
    }

    fn validate_inner(
        &self,
        pattern: &str,
        pattern_id: &str,
        start: Instant,
        deadline: Instant,
    ) -> PatternValidationResult {
        let mut rejection_reasons = Vec::new();

        // Syntax check, independent of ReDoS scoring
        let compiles = match regex_cache::compile(pattern) {
            Ok(_) => true,
            Err(e) => {
                rejection_reasons.push(format!("compilation: {e}"));
                false
            }
        };

        if Instant::now() >= deadline {
            return self.fail_closed(pattern, pattern_id, start);
        }

        let scan = PatternScan::new(pattern);
        let mut signals = Signals::default();

        scan.detect_nested_quantifiers(&mut signals);
        if Instant::now() >= deadline {
            return self.fail_closed(pattern, pattern_id, start);
        }

        scan.detect_overlapping_alternations(&mut signals);
        if Instant::now() >= deadline {
            return self.fail_closed(pattern, pattern_id, start);
        }

        scan.detect_quantified_overlaps(&mut signals);
        if Instant::now() >= deadline {
            return self.fail_closed(pattern, pattern_id, start);
        }

        signals.star_height = scan.star_height();

        let score = score_signals(&signals);
        let redos_risk = risk_band(score);

        for construct in &signals.constructs {
            rejection_reasons.push(format!("{}: {}", construct.kind, construct.fragment));
        }
        if signals.star_height > 1 {
            rejection_reasons.push(format!("star height {}", signals.star_height));
        }

        let rejected_for_risk = redos_risk >= self.rejection_threshold;
        let is_valid = compiles && !rejected_for_risk;
        if is_valid {
            // Risk stayed under the threshold; the reasons list only
            // explains rejections.
            rejection_reasons.clear();
        }

        if !signals.constructs.is_empty() {
            self.audit.record(
                AuditCategory::RedosDetection,
                self.correlation_id,
                json!({
                    "pattern_id": pattern_id,
                    "constructs": signals
                        .constructs
                        .iter()
                        .map(|c| json!({"kind": c.kind, "fragment": c.fragment}))
                        .collect::<Vec<_>>(),
                    "star_height": signals.star_height,
                    "score": score,
                }),
            );
        }

        if rejected_for_risk {
            warn!(
                pattern_id,
                risk = %redos_risk,
                score,
                "pattern rejected by ReDoS screening"
            );
        }

        let result = PatternValidationResult {
            pattern: pattern.to_string(),
            pattern_id: pattern_id.to_string(),
            is_valid,
            rejection_reasons,
            redos_risk,
            vulnerability_score: score.min(100) as u8,
            validation_time_ms: elapsed_ms(start),
            whitelisted: false,
        };
        self.audit_validation(&result);
        result
    }

    /// Screening overran its time box: reject with the worst assumption.
    fn fail_closed(
        &self,
        pattern: &str,
        pattern_id: &str,
        start: Instant,
    ) -> PatternValidationResult {
        warn!(pattern_id, "pattern screening timed out, failing closed");
        let result = PatternValidationResult {
            pattern: pattern.to_string(),
            pattern_id: pattern_id.to_string(),
            is_valid: false,
            rejection_reasons: vec!["validation timeout".to_string()],
            redos_risk: RedosRisk::High,
            vulnerability_score: 100,
            validation_time_ms: elapsed_ms(start),
            whitelisted: false,
        };
        self.audit_validation(&result);
        result
    }

    fn audit_validation(&self, result: &PatternValidationResult) {
        self.audit.record(
            AuditCategory::PatternValidation,
            self.correlation_id,
            json!({
                "pattern_id": result.pattern_id,
                "is_valid": result.is_valid,
                "redos_risk": result.redos_risk,
                "score": result.vulnerability_score,
                "whitelisted": result.whitelisted,
                "validation_time_ms": result.validation_time_ms,
            }),
        );
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn score_signals(signals: &Signals) -> u32 {
    let mut score = 0u32;
    for construct in &signals.constructs {
        score += match construct.kind {
            "nested quantifiers" => NESTED_QUANTIFIER_WEIGHT,
            "overlapping alternation" => OVERLAPPING_ALTERNATION_WEIGHT,
            "quantified overlap" => QUANTIFIED_OVERLAP_WEIGHT,
            _ => 0,
        };
    }
    score += STAR_HEIGHT_WEIGHT * signals.star_height.saturating_sub(1);
    score.min(100)
}

fn risk_band(score: u32) -> RedosRisk {
    match score {
        0..=14 => RedosRisk::None,
        15..=39 => RedosRisk::Low,
        40..=69 => RedosRisk::Medium,
        _ => RedosRisk::High,
    }
}

// =============================================================================
// Structural scan
// =============================================================================

/// One pass over the pattern text: escape map, character-class spans, and
/// paired group parentheses. All positions are byte offsets; fragments are
/// recovered with `from_utf8_lossy` so multibyte literals cannot panic the
/// scan.
struct PatternScan<'a> {
    bytes: &'a [u8],
    escaped: Vec<bool>,
    in_class: Vec<bool>,
    /// Paired unescaped parens, `(open, close)`
    groups: Vec<(usize, usize)>,
    /// Open position -> close position
    close_of: HashMap<usize, usize>,
}

impl<'a> PatternScan<'a> {
    fn new(pattern: &'a str) -> Self {
        let bytes = pattern.as_bytes();
        let n = bytes.len();

        let mut escaped = vec![false; n];
        let mut esc = false;
        for i in 0..n {
            escaped[i] = esc;
            esc = !esc && bytes[i] == b'\\';
        }

        let mut in_class = vec![false; n];
        let mut class_open = false;
        for i in 0..n {
            if !escaped[i] {
                if bytes[i] == b'[' && !class_open {
                    class_open = true;
                } else if bytes[i] == b']' && class_open {
                    class_open = false;
                    in_class[i] = true;
                    continue;
                }
            }
            in_class[i] = class_open;
        }

        let mut stack = Vec::new();
        let mut groups = Vec::new();
        for i in 0..n {
            if escaped[i] || in_class[i] {
                continue;
            }
            match bytes[i] {
                b'(' => stack.push(i),
                b')' => {
                    if let Some(open) = stack.pop() {
                        groups.push((open, i));
                    }
                }
                _ => {}
            }
        }
        groups.sort_unstable();
        let close_of = groups.iter().copied().collect();

        Self {
            bytes,
            escaped,
            in_class,
            groups,
            close_of,
        }
    }

    fn is_meta(&self, pos: usize) -> bool {
        pos < self.bytes.len() && !self.escaped[pos] && !self.in_class[pos]
    }

    /// Quantifier starting at `pos`, if any: `(unbounded, end_exclusive)`
    fn quantifier_at(&self, pos: usize) -> Option<(bool, usize)> {
        if !self.is_meta(pos) {
            return None;
        }
        match self.bytes[pos] {
            b'+' | b'*' => Some((true, pos + 1)),
            b'{' => self.parse_brace(pos),
            _ => None,
        }
    }

    /// Parse `{n}`, `{n,}`, or `{n,m}`; anything malformed is a literal.
    fn parse_brace(&self, pos: usize) -> Option<(bool, usize)> {
        let close = self.bytes[pos + 1..]
            .iter()
            .position(|&b| b == b'}')
            .map(|off| pos + 1 + off)?;
        let body = &self.bytes[pos + 1..close];
        if body.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(body);
        let mut parts = text.splitn(2, ',');
        let min = parts.next()?.trim();
        if min.is_empty() || !min.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let unbounded = match parts.next() {
            // `{n}`: exactly n
            None => false,
            Some(max) => {
                let max = max.trim();
                if max.is_empty() {
                    // `{n,}`
                    true
                } else if max.bytes().all(|b| b.is_ascii_digit()) {
                    // `{n,m}`
                    false
                } else {
                    return None;
                }
            }
        };
        Some((unbounded, close + 1))
    }

    fn has_quantifier_between(&self, lo: usize, hi: usize, unbounded_only: bool) -> bool {
        let mut i = lo;
        while i < hi {
            if let Some((unbounded, end)) = self.quantifier_at(i) {
                if !unbounded_only || unbounded {
                    return true;
                }
                i = end;
            } else {
                i += 1;
            }
        }
        false
    }

    fn fragment(&self, lo: usize, hi: usize) -> String {
        String::from_utf8_lossy(&self.bytes[lo..hi.min(self.bytes.len())]).to_string()
    }

    /// A quantified group whose body itself contains a quantifier and whose
    /// outer quantifier is unbounded: the classic `(a+)+` shape.
    fn detect_nested_quantifiers(&self, signals: &mut Signals) {
        for &(open, close) in &self.groups {
            if !self.has_quantifier_between(open + 1, close, false) {
                continue;
            }
            if let Some((unbounded, quant_end)) = self.quantifier_at(close + 1) {
                if unbounded {
                    signals.constructs.push(Construct {
                        kind: "nested quantifiers",
                        fragment: self.fragment(open, quant_end),
                    });
                }
            }
        }
    }

    /// A quantified group with alternatives that can match the same text:
    /// `(a|a)+`, `(a|ab)+`.
    fn detect_overlapping_alternations(&self, signals: &mut Signals) {
        for &(open, close) in &self.groups {
            let Some((_, quant_end)) = self.quantifier_at(close + 1) else {
                continue;
            };
            let alternatives = self.top_level_alternatives(open, close);
            if alternatives.len() < 2 {
                continue;
            }
            if alternatives_overlap(&alternatives) {
                signals.constructs.push(Construct {
                    kind: "overlapping alternation",
                    fragment: self.fragment(open, quant_end),
                });
            }
        }
    }

    /// An unbounded sub-expression under a bounded repetition: `(.*a){3}`.
    /// Bounded outer repetition multiplies the inner ambiguity without
    /// showing up as a nested-quantifier construct.
    fn detect_quantified_overlaps(&self, signals: &mut Signals) {
        for &(open, close) in &self.groups {
            if !self.has_quantifier_between(open + 1, close, true) {
                continue;
            }
            if let Some((unbounded, quant_end)) = self.quantifier_at(close + 1) {
                if !unbounded {
                    signals.constructs.push(Construct {
                        kind: "quantified overlap",
                        fragment: self.fragment(open, quant_end),
                    });
                }
            }
        }
    }

    /// Alternatives of a group, split on `|` at the group's own paren depth
    fn top_level_alternatives(&self, open: usize, close: usize) -> Vec<String> {
        let mut parts = Vec::new();
        let mut depth = 0usize;
        let mut part_start = open + 1;
        for i in open + 1..close {
            if !self.is_meta(i) {
                continue;
            }
            match self.bytes[i] {
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                b'|' if depth == 0 => {
                    parts.push(self.fragment(part_start, i));
                    part_start = i + 1;
                }
                _ => {}
            }
        }
        parts.push(self.fragment(part_start, close));
        // A group without any `|` yields a single part
        parts
            .into_iter()
            .map(|p| p.strip_prefix("?:").unwrap_or(&p).to_string())
            .collect()
    }

    /// Maximum nesting depth of unbounded repetition operators
    fn star_height(&self) -> u32 {
        self.height_of_region(0, self.bytes.len())
    }

    fn height_of_region(&self, lo: usize, hi: usize) -> u32 {
        let mut max_height = 0u32;
        let mut i = lo;
        while i < hi {
            if self.is_meta(i) && self.bytes[i] == b'(' {
                if let Some(&close) = self.close_of.get(&i) {
                    let inner = self.height_of_region(i + 1, close);
                    let (height, next) = match self.quantifier_at(close + 1) {
                        Some((true, end)) => (inner + 1, end),
                        Some((false, end)) => (inner, end),
                        None => (inner, close + 1),
                    };
                    max_height = max_height.max(height);
                    i = next;
                    continue;
                }
            }
            if let Some((unbounded, end)) = self.quantifier_at(i) {
                if unbounded {
                    // Quantifier over a plain atom
                    max_height = max_height.max(1);
                }
                i = end;
                continue;
            }
            i += 1;
        }
        max_height
    }
}

/// Whether any two alternatives can begin with the same text
fn alternatives_overlap(alternatives: &[String]) -> bool {
    let sets: Vec<HashSet<char>> = alternatives.iter().map(|a| first_chars(a)).collect();

    for i in 0..sets.len() {
        for j in i + 1..sets.len() {
            if !sets[i].is_disjoint(&sets[j]) {
                return true;
            }
        }
    }

    for i in 0..alternatives.len() {
        for j in i + 1..alternatives.len() {
            if alternatives[i].starts_with(alternatives[j].as_str())
                || alternatives[j].starts_with(alternatives[i].as_str())
            {
                return true;
            }
        }
    }

    false
}

/// Possible first characters of an alternative, approximated
fn first_chars(alternative: &str) -> HashSet<char> {
    let mut chars = HashSet::new();
    let alt: Vec<char> = alternative.chars().collect();
    let Some(&first) = alt.first() else {
        return chars;
    };

    match first {
        '.' => {
            chars.extend('a'..='z');
            chars.extend('A'..='Z');
            chars.extend('0'..='9');
        }
        '[' => {
            if let Some(end) = alternative.find(']') {
                let body = alternative[1..end].trim_start_matches('^');
                let body_chars: Vec<char> = body.chars().collect();
                let mut k = 0;
                while k < body_chars.len() {
                    if k + 2 < body_chars.len() && body_chars[k + 1] == '-' {
                        let (lo, hi) = (body_chars[k], body_chars[k + 2]);
                        if lo < hi {
                            chars.extend(lo..=hi);
                        }
                        k += 3;
                    } else {
                        if body_chars[k] != '-' {
                            chars.insert(body_chars[k]);
                        }
                        k += 1;
                    }
                }
            }
        }
        '\\' if alt.len() > 1 => match alt[1] {
            'd' => chars.extend('0'..='9'),
            'w' => {
                chars.extend('a'..='z');
                chars.extend('A'..='Z');
                chars.extend('0'..='9');
                chars.insert('_');
            }
            's' => {
                chars.extend([' ', '\t', '\n', '\r']);
            }
            c => {
                chars.insert(c);
            }
        },
        c if c != '^' && c != '$' && c != '(' && c != ')' => {
            chars.insert(c);
        }
        _ => {}
    }

    chars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(pattern: &str) -> PatternScan<'_> {
        PatternScan::new(pattern)
    }

    #[test]
    fn test_star_height() {
        assert_eq!(scan("abc").star_height(), 0);
        assert_eq!(scan("a+").star_height(), 1);
        assert_eq!(scan("(a+)+").star_height(), 2);
        assert_eq!(scan("((a+)+)*").star_height(), 3);
        assert_eq!(scan("(a+){3}").star_height(), 1);
        assert_eq!(scan(r"\+").star_height(), 0);
    }

    #[test]
    fn test_nested_quantifier_detection() {
        let mut signals = Signals::default();
        scan("(a+)+").detect_nested_quantifiers(&mut signals);
        assert_eq!(signals.constructs.len(), 1);
        assert_eq!(signals.constructs[0].kind, "nested quantifiers");
        assert_eq!(signals.constructs[0].fragment, "(a+)+");
    }

    #[test]
    fn test_no_nested_quantifier_in_plain_group() {
        let mut signals = Signals::default();
        scan("(abc)+").detect_nested_quantifiers(&mut signals);
        assert!(signals.constructs.is_empty());
    }

    #[test]
    fn test_escaped_parens_ignored() {
        let mut signals = Signals::default();
        scan(r"\(a+\)+").detect_nested_quantifiers(&mut signals);
        assert!(signals.constructs.is_empty());
    }

    #[test]
    fn test_char_class_metacharacters_ignored() {
        let mut signals = Signals::default();
        scan(r"[(+*]+").detect_nested_quantifiers(&mut signals);
        assert!(signals.constructs.is_empty());
    }

    #[test]
    fn test_overlapping_alternation() {
        let mut signals = Signals::default();
        scan("(a|a)+").detect_overlapping_alternations(&mut signals);
        assert_eq!(signals.constructs.len(), 1);
        assert_eq!(signals.constructs[0].kind, "overlapping alternation");
    }

    #[test]
    fn test_prefix_overlap() {
        let mut signals = Signals::default();
        scan("(a|ab)+").detect_overlapping_alternations(&mut signals);
        assert_eq!(signals.constructs.len(), 1);
    }

    #[test]
    fn test_disjoint_alternation_is_clean() {
        let mut signals = Signals::default();
        scan("(a|b)+").detect_overlapping_alternations(&mut signals);
        assert!(signals.constructs.is_empty());
    }

    #[test]
    fn test_quantified_overlap() {
        let mut signals = Signals::default();
        scan("(.*a){3}").detect_quantified_overlaps(&mut signals);
        assert_eq!(signals.constructs.len(), 1);
        assert_eq!(signals.constructs[0].kind, "quantified overlap");
    }

    #[test]
    fn test_first_chars_classes() {
        assert!(first_chars(r"\d").contains(&'7'));
        assert!(first_chars("[a-c]x").contains(&'b'));
        assert!(!first_chars("[a-c]x").contains(&'d'));
        assert!(first_chars(".z").contains(&'q'));
    }

    #[test]
    fn test_risk_bands() {
        assert_eq!(risk_band(0), RedosRisk::None);
        assert_eq!(risk_band(15), RedosRisk::Low);
        assert_eq!(risk_band(40), RedosRisk::Medium);
        assert_eq!(risk_band(75), RedosRisk::High);
        assert_eq!(risk_band(100), RedosRisk::High);
    }

    #[test]
    fn test_fail_closed_on_expired_deadline() {
        let audit = Arc::new(AuditLog::new());
        let validator = PatternValidator::new(
            &ControlFlowConfig::default(),
            audit,
            Uuid::new_v4(),
        );
        let now = Instant::now();
        let result = validator.validate_inner("(a+)+", "p1", now, now);
        assert!(!result.is_valid);
        assert_eq!(result.redos_risk, RedosRisk::High);
        assert!(result
            .rejection_reasons
            .iter()
            .any(|r| r.contains("validation timeout")));
    }
}
