//! Cycle summary
//!
//! Condenses an iteration history into the numbers a caller actually reads:
//! where the score started, where it ended, how it moved, and what is still
//! wrong.

use super::IterationRecord;
use serde::{Deserialize, Serialize};

const MAX_REPORTED_ISSUES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Convergence {
    /// Reached a decision within two iterations.
    Fast,
    Steady,
    Slow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSummary {
    pub total_iterations: u32,
    pub initial_score: u32,
    pub final_score: u32,
    pub best_score: u32,
    /// Final minus initial; refinement may regress, so this can be
    /// negative.
    pub score_delta: i64,
    pub target_achieved: bool,
    pub average_gain_per_iteration: f64,
    #[serde(default)]
    pub key_improvements: Vec<String>,
    #[serde(default)]
    pub remaining_issues: Vec<String>,
    pub convergence: Convergence,
}

impl CycleSummary {
    pub fn from_records(records: &[IterationRecord], target: u32) -> Self {
        let initial_score = records.first().map_or(0, |r| r.quality_score.total);
        let final_score = records.last().map_or(0, |r| r.quality_score.total);
        let best_score = records
            .iter()
            .map(|r| r.quality_score.total)
            .max()
            .unwrap_or(0);

        let gains: Vec<i64> = records
            .windows(2)
            .map(|pair| pair[1].quality_score.total as i64 - pair[0].quality_score.total as i64)
            .collect();
        let average_gain_per_iteration = if gains.is_empty() {
            0.0
        } else {
            gains.iter().sum::<i64>() as f64 / gains.len() as f64
        };

        let key_improvements = records
            .iter()
            .flat_map(|r| r.improvements.iter().cloned())
            .collect();

        let remaining_issues = records
            .last()
            .map(|r| {
                r.analysis_outcome
                    .issues
                    .iter()
                    .take(MAX_REPORTED_ISSUES)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let convergence = match records.len() {
            0..=2 => Convergence::Fast,
            3..=4 => Convergence::Steady,
            _ => Convergence::Slow,
        };

        Self {
            total_iterations: records.len() as u32,
            initial_score,
            final_score,
            best_score,
            score_delta: final_score as i64 - initial_score as i64,
            target_achieved: best_score >= target,
            average_gain_per_iteration,
            key_improvements,
            remaining_issues,
            convergence,
        }
    }
}
