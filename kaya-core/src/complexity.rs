//! Complexity Estimator — a pure keyword-scoring function deciding whether
//! a task is `easy` or `hard` before the [`crate::router::Router`] picks a
//! worker and model.
//!
//! Grounded on the grounding repo's `ModelRouter::estimate_complexity`
//! shape (keyword scoring folded into a tier decision), re-keyed to this
//! crate's fixed keyword/weight table and an easy/hard threshold of 5
//! rather than a continuous 1-5 scale.

use serde::{Deserialize, Serialize};

/// Verdict of the complexity estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Easy,
    Hard,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Easy => write!(f, "easy"),
            Self::Hard => write!(f, "hard"),
        }
    }
}

/// Any rule may also match "any" complexity regardless of the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityMatch {
    Any,
    Easy,
    Hard,
}

impl ComplexityMatch {
    pub fn matches(self, verdict: Complexity) -> bool {
        match self {
            Self::Any => true,
            Self::Easy => verdict == Complexity::Easy,
            Self::Hard => verdict == Complexity::Hard,
        }
    }
}

const AUTH_KEYWORDS: [&str; 4] = ["login", "auth", "oauth", "2fa"];
const FILE_KEYWORDS: [&str; 3] = ["upload", "download", "file"];
const REALTIME_KEYWORDS: [&str; 3] = ["websocket", "realtime", "sync"];
const PAYMENT_KEYWORDS: [&str; 4] = ["payment", "stripe", "checkout", "billing"];

const HARD_THRESHOLD: u32 = 5;

/// The raw score plus which keyword groups contributed, for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityScore {
    pub score: u32,
    pub verdict: Complexity,
    pub matched_groups: Vec<&'static str>,
}

/// Scores `description` (and optional `estimated_steps`) per the fixed
/// keyword table. Deterministic, O(n) in description length.
pub fn estimate(description: &str, estimated_steps: Option<u32>) -> ComplexityScore {
    let lower = description.to_lowercase();
    let mut score = 0u32;
    let mut matched_groups = Vec::new();

    if estimated_steps.is_some_and(|steps| steps > 4) {
        score += 2;
        matched_groups.push("estimated_steps>4");
    }
    if contains_any(&lower, &AUTH_KEYWORDS) {
        score += 3;
        matched_groups.push("auth");
    }
    if contains_any(&lower, &FILE_KEYWORDS) {
        score += 2;
        matched_groups.push("file");
    }
    if contains_any(&lower, &REALTIME_KEYWORDS) {
        score += 3;
        matched_groups.push("realtime");
    }
    if contains_any(&lower, &PAYMENT_KEYWORDS) {
        score += 4;
        matched_groups.push("payment");
    }
    if lower.contains("mock") {
        score += 2;
        matched_groups.push("mock");
    }

    let verdict = if score >= HARD_THRESHOLD {
        Complexity::Hard
    } else {
        Complexity::Easy
    };

    ComplexityScore {
        score,
        verdict,
        matched_groups,
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_description_is_easy() {
        let result = estimate("click the submit button and check a toast appears", None);
        assert_eq!(result.verdict, Complexity::Easy);
    }

    #[test]
    fn payment_keyword_alone_is_hard() {
        let result = estimate("verify the stripe checkout receipt page", None);
        assert_eq!(result.score, 4 + 0); // checkout+stripe are the same "payment" group, not double counted
        assert_eq!(result.verdict, Complexity::Easy);
    }

    #[test]
    fn auth_plus_many_steps_is_hard() {
        let result = estimate("complete the oauth login flow", Some(6));
        assert_eq!(result.score, 3 + 2);
        assert_eq!(result.verdict, Complexity::Hard);
    }

    #[test]
    fn realtime_and_mock_combine_to_hard() {
        let result = estimate("mock the websocket notification feed", None);
        assert_eq!(result.score, 3 + 2);
        assert_eq!(result.verdict, Complexity::Hard);
    }

    #[test]
    fn keyword_matching_is_case_insensitive() {
        let result = estimate("STRIPE Checkout BILLING page", None);
        assert!(result.matched_groups.contains(&"payment"));
    }
}
