//! Development cycle
//!
//! One cycle drives a specification through repeated
//! generate → test → analyze → score passes until the quality target is
//! reached, the iteration budget runs out, or the caller cancels. The
//! iteration history is append-only and exclusively owned by its cycle.

pub mod engine;
pub mod summary;

pub use engine::DevelopmentCycle;
pub use summary::{Convergence, CycleSummary};

use crate::artifact::Artifact;
use crate::scoring::{AnalysisOutcome, QualityScore, TestOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One pass through the loop. Records are appended in strict iteration
/// order and never reordered; a failed pass keeps its place in history
/// with `error` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub index: u32,
    pub artifact: Artifact,
    pub test_outcome: TestOutcome,
    pub analysis_outcome: AnalysisOutcome,
    pub quality_score: QualityScore,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// An iteration reached the target score.
    Succeeded,
    /// The budget ran out; the best-scoring artifact is final.
    Exhausted,
    /// The caller cancelled between iterations.
    Cancelled,
}

/// Container artifacts rendered after a successful cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagingArtifacts {
    pub dockerfile: String,
    pub compose: String,
}

/// Final result of one cycle. After at least one generation attempt the
/// caller always gets an artifact, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleResult {
    pub success: bool,
    pub outcome: CycleOutcome,
    pub final_artifact: Option<Artifact>,
    pub final_score: QualityScore,
    pub iterations: Vec<IterationRecord>,
    pub summary: CycleSummary,
    #[serde(default)]
    pub packaging: Option<PackagingArtifacts>,
}

/// Cooperative cancellation flag, observed at the decide boundary between
/// iterations, never mid-iteration, so stage ordering stays intact.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }
}
