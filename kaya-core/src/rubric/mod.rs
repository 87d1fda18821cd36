//! Validation Rubric — the deterministic gate a [`ValidatorRecord`] must
//! pass before Gemini's run counts as a validated test.
//!
//! A sequential, named-check pipeline in the same shape as the grounding
//! repo's `verifier::pipeline`/`verifier::report` (`GateOutcome`/
//! `GateResult` accumulation over a fixed check list), retargeted from
//! compiler-gate semantics onto this crate's browser-validator record.
//!
//! ```ignore
//! use kaya_core::rubric::{is_pass, ValidatorRecord};
//!
//! let (passed, reasons) = is_pass(&record);
//! ```

use serde::{Deserialize, Serialize};

/// Record produced by the Gemini validator worker (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorRecord {
    pub browser_launched: bool,
    pub test_executed: bool,
    pub test_passed: bool,
    pub screenshots: Vec<String>,
    pub console_errors: Vec<String>,
    pub network_failures: Vec<String>,
    pub execution_time_ms: i64,
    pub ai_analysis: Option<AiAnalysis>,
}

/// Optional screenshot-AI-analysis payload. Never gates the rubric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAnalysis {
    pub ui_correctness: bool,
    pub visual_regressions: Vec<String>,
    pub confidence: u8,
}

const MAX_EXECUTION_TIME_MS: i64 = 45_000;

/// One coded reason a record failed (or would fail) the rubric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RubricReason {
    BrowserNotLaunched,
    TestNotExecuted,
    AssertionsFailed,
    NoVisualEvidence,
    TimeoutExceeded,
    SchemaInvalid(String),
}

impl std::fmt::Display for RubricReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BrowserNotLaunched => write!(f, "browser_not_launched"),
            Self::TestNotExecuted => write!(f, "test_not_executed"),
            Self::AssertionsFailed => write!(f, "assertions_failed"),
            Self::NoVisualEvidence => write!(f, "no_visual_evidence"),
            Self::TimeoutExceeded => write!(f, "timeout_exceeded"),
            Self::SchemaInvalid(path) => write!(f, "schema_invalid:{path}"),
        }
    }
}

/// Schema validation: required-field range checks before the boolean
/// gates run at all. A record that fails schema validation never reaches
/// the boolean checks — `is_pass` reports only the schema errors.
fn validate_schema(record: &ValidatorRecord) -> Vec<RubricReason> {
    let mut reasons = Vec::new();
    if record.execution_time_ms < 1 {
        reasons.push(RubricReason::SchemaInvalid("execution_time_ms".to_string()));
    }
    if let Some(analysis) = &record.ai_analysis {
        if analysis.confidence > 100 {
            reasons.push(RubricReason::SchemaInvalid("ai_analysis.confidence".to_string()));
        }
    }
    reasons
}

/// Deterministic pass/fail over a [`ValidatorRecord`]. Schema validation
/// runs first; if it fails, the boolean gates are skipped and only schema
/// reasons are returned. `console_errors`/`network_failures` are recorded
/// on the record but never gate the outcome.
pub fn is_pass(record: &ValidatorRecord) -> (bool, Vec<RubricReason>) {
    let schema_errors = validate_schema(record);
    if !schema_errors.is_empty() {
        return (false, schema_errors);
    }

    let mut reasons = Vec::new();
    if !record.browser_launched {
        reasons.push(RubricReason::BrowserNotLaunched);
    }
    if !record.test_executed {
        reasons.push(RubricReason::TestNotExecuted);
    }
    if !record.test_passed {
        reasons.push(RubricReason::AssertionsFailed);
    }
    if record.screenshots.is_empty() {
        reasons.push(RubricReason::NoVisualEvidence);
    }
    if record.execution_time_ms > MAX_EXECUTION_TIME_MS {
        reasons.push(RubricReason::TimeoutExceeded);
    }

    (reasons.is_empty(), reasons)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing_record() -> ValidatorRecord {
        ValidatorRecord {
            browser_launched: true,
            test_executed: true,
            test_passed: true,
            screenshots: vec!["artifacts/shot-1.png".to_string()],
            console_errors: vec![],
            network_failures: vec![],
            execution_time_ms: 2_500,
            ai_analysis: None,
        }
    }

    #[test]
    fn fully_passing_record_has_no_reasons() {
        let (passed, reasons) = is_pass(&passing_record());
        assert!(passed);
        assert!(reasons.is_empty());
    }

    #[test]
    fn console_errors_and_network_failures_never_gate() {
        let mut record = passing_record();
        record.console_errors = vec!["ReferenceError: x is not defined".to_string()];
        record.network_failures = vec!["GET /api/flag -> 500".to_string()];
        let (passed, _) = is_pass(&record);
        assert!(passed);
    }

    #[test]
    fn missing_screenshots_fails_with_no_visual_evidence() {
        let mut record = passing_record();
        record.screenshots.clear();
        let (passed, reasons) = is_pass(&record);
        assert!(!passed);
        assert!(reasons.contains(&RubricReason::NoVisualEvidence));
    }

    #[test]
    fn over_budget_execution_time_fails() {
        let mut record = passing_record();
        record.execution_time_ms = 45_001;
        let (passed, reasons) = is_pass(&record);
        assert!(!passed);
        assert!(reasons.contains(&RubricReason::TimeoutExceeded));
    }

    #[test]
    fn multiple_failures_all_accumulate() {
        let mut record = passing_record();
        record.browser_launched = false;
        record.test_executed = false;
        let (passed, reasons) = is_pass(&record);
        assert!(!passed);
        assert_eq!(reasons.len(), 2);
    }

    #[test]
    fn schema_invalid_short_circuits_boolean_gates() {
        let mut record = passing_record();
        record.execution_time_ms = 0;
        record.browser_launched = false;
        let (passed, reasons) = is_pass(&record);
        assert!(!passed);
        assert_eq!(reasons, vec![RubricReason::SchemaInvalid("execution_time_ms".to_string())]);
    }
}
