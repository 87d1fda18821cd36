//! Types stored in, and returned by, the Cold Store.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The three logical collections the Cold Store indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    TestSuccess,
    BugFixes,
    HitlAnnotations,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TestSuccess => "test_success",
            Self::BugFixes => "bug_fixes",
            Self::HitlAnnotations => "hitl_annotations",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored record, append-only from the core's perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColdRecord {
    pub id: String,
    pub text: String,
    pub metadata: Value,
    pub embedding: Vec<f32>,
}

/// One search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub metadata: Value,
    pub similarity: f64,
}
