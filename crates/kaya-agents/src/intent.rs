//! Regex-driven intent classifier: raw text in, `(IntentKind, slots)` out
//! (spec.md §4.4.3). Keyword matching happens against a lowercased copy of
//! the text; captured paths/features are re-extracted from the original
//! text so case is preserved.

use once_cell::sync::Lazy;
use regex::Regex;

const CONFIDENCE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentKind {
    IterativeFix,
    RunTest,
    CreateTest,
    Validate { critical: bool },
    Status,
    Brainstorm,
}

#[derive(Debug, Clone, Default)]
pub struct IntentSlots {
    pub path: Option<String>,
    pub feature: Option<String>,
    pub task_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Intent {
    pub kind: IntentKind,
    pub slots: IntentSlots,
    pub confidence: f64,
    pub raw_text: String,
}

static FIX_ALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)fix all (test )?failures(?: in (.+))?").unwrap());
static RUN_TESTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)run tests?(?: in (.+))?").unwrap());
static WRITE_TEST: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)write (?:a )?test for (.+)").unwrap());
static VALIDATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)validate (.+?)(\s*-\s*critical)?$").unwrap());
static STATUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)what'?s the status(?: of (.+))?").unwrap());

/// Classifies `text` into an [`Intent`]. Never fails: anything that
/// doesn't match confidently falls back to `Brainstorm`.
pub fn parse(text: &str) -> Intent {
    let lowered = text.to_lowercase();

    if let Some(captures) = FIX_ALL.captures(&lowered) {
        let path = captures.get(2).map(|m| reextract(text, m.start(), m.end()));
        return Intent {
            kind: IntentKind::IterativeFix,
            slots: IntentSlots { path, ..Default::default() },
            confidence: 0.95,
            raw_text: text.to_string(),
        };
    }

    if let Some(captures) = RUN_TESTS.captures(&lowered) {
        let path = captures.get(1).map(|m| reextract(text, m.start(), m.end()));
        return Intent {
            kind: IntentKind::RunTest,
            slots: IntentSlots { path, ..Default::default() },
            confidence: 0.9,
            raw_text: text.to_string(),
        };
    }

    if let Some(captures) = WRITE_TEST.captures(&lowered) {
        let feature = captures.get(1).map(|m| reextract(text, m.start(), m.end()));
        return Intent {
            kind: IntentKind::CreateTest,
            slots: IntentSlots { feature, ..Default::default() },
            confidence: 0.9,
            raw_text: text.to_string(),
        };
    }

    if let Some(captures) = VALIDATE.captures(&lowered) {
        let critical = captures.get(2).is_some();
        let feature_end = captures.get(1).map(|m| m.end());
        let feature = captures.get(1).map(|m| reextract(text, m.start(), feature_end.unwrap_or(m.end())));
        return Intent {
            kind: IntentKind::Validate { critical },
            slots: IntentSlots { feature, ..Default::default() },
            confidence: 0.85,
            raw_text: text.to_string(),
        };
    }

    if let Some(captures) = STATUS.captures(&lowered) {
        let task_id = captures.get(1).map(|m| reextract(text, m.start(), m.end()));
        return Intent {
            kind: IntentKind::Status,
            slots: IntentSlots { task_id, ..Default::default() },
            confidence: 0.9,
            raw_text: text.to_string(),
        };
    }

    Intent {
        kind: IntentKind::Brainstorm,
        slots: IntentSlots::default(),
        confidence: 0.0,
        raw_text: text.to_string(),
    }
}

pub fn is_confident(intent: &Intent) -> bool {
    intent.confidence >= CONFIDENCE_THRESHOLD
}

fn reextract(original: &str, start: usize, end: usize) -> String {
    let end = end.min(original.len());
    let start = start.min(end);
    original.get(start..end).unwrap_or_default().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fix_all_failures_maps_to_iterative_fix() {
        let intent = parse("Fix all test failures in Checkout.spec.ts");
        assert_eq!(intent.kind, IntentKind::IterativeFix);
        assert_eq!(intent.slots.path.as_deref(), Some("Checkout.spec.ts"));
    }

    #[test]
    fn run_tests_without_path() {
        let intent = parse("run tests");
        assert_eq!(intent.kind, IntentKind::RunTest);
        assert_eq!(intent.slots.path, None);
    }

    #[test]
    fn write_test_for_extracts_feature_preserving_case() {
        let intent = parse("write a test for the Login Flow");
        assert_eq!(intent.kind, IntentKind::CreateTest);
        assert_eq!(intent.slots.feature.as_deref(), Some("the Login Flow"));
    }

    #[test]
    fn validate_with_critical_suffix() {
        let intent = parse("validate Checkout - critical");
        assert_eq!(intent.kind, IntentKind::Validate { critical: true });
    }

    #[test]
    fn unmatched_text_falls_back_to_brainstorm() {
        let intent = parse("what do you think about our onboarding flow?");
        assert_eq!(intent.kind, IntentKind::Brainstorm);
        assert!(!is_confident(&intent));
    }
}
