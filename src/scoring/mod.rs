//! Quality scoring
//!
//! Combines the test outcome, static-analysis outcome, and performance
//! outcome of one iteration into a single 0-100 score. The scorer is a
//! pure function: identical inputs always produce an identical score, and
//! the weight table is configuration rather than a constant.

use serde::{Deserialize, Serialize};

/// Aggregated result of the test stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub syntax_valid: bool,
    pub dependencies_available: bool,
    pub lint_issue_count: u32,
    pub unit_tests_pass: bool,
    pub overall_success: bool,
    /// Failing test and lint details, carried forward as refinement input.
    #[serde(default)]
    pub failures: Vec<String>,
}

impl TestOutcome {
    /// Aggregate individual check results. `overall_success` is the
    /// conjunction of all four checks, with the lint count measured against
    /// the configured threshold.
    pub fn aggregate(
        syntax_valid: bool,
        dependencies_available: bool,
        lint_issue_count: u32,
        unit_tests_pass: bool,
        failures: Vec<String>,
        weights: &ScoringWeights,
    ) -> Self {
        let overall_success = syntax_valid
            && dependencies_available
            && lint_issue_count < weights.lint_threshold
            && unit_tests_pass;
        Self {
            syntax_valid,
            dependencies_available,
            lint_issue_count,
            unit_tests_pass,
            overall_success,
            failures,
        }
    }

    /// Outcome for an iteration whose test stage could not run at all.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            lint_issue_count: u32::MAX,
            failures: vec![reason.into()],
            ..Self::default()
        }
    }
}

/// Aggregated result of the analysis stage. Scores are 0-100; the quality
/// score is expected to already reflect the analyzer's completeness
/// penalty, so incomplete implementations arrive here heavily reduced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub code_quality_score: f64,
    pub performance_score: f64,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// The weight table behind [`score`]. The defaults are the 40/40/20
/// contract; deployments can rebalance through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Full credit for a fully successful test stage.
    pub test_weight: u32,
    /// Credit per individual passing check when the stage fails overall.
    pub partial_credit: u32,
    /// Lint issues at or above this count fail the lint check.
    pub lint_threshold: u32,
    /// Multiplier applied to the analyzer's 0-100 quality score.
    pub static_factor: f64,
    /// Multiplier applied to the analyzer's 0-100 performance score.
    pub performance_factor: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            test_weight: 40,
            partial_credit: 10,
            lint_threshold: 5,
            static_factor: 0.4,
            performance_factor: 0.2,
        }
    }
}

/// One iteration's score with component breakdown. Derived once, never
/// mutated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityScore {
    pub total: u32,
    pub test_component: u32,
    pub static_component: u32,
    pub performance_component: u32,
}

impl QualityScore {
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Combine stage outcomes into a [`QualityScore`].
///
/// The test component grants full weight on overall success, otherwise
/// partial credit per passing check, summed independently. The static and
/// performance components scale the analyzer's scores by their factors.
pub fn score(
    test: &TestOutcome,
    analysis: &AnalysisOutcome,
    weights: &ScoringWeights,
) -> QualityScore {
    let test_component = if test.overall_success {
        weights.test_weight
    } else {
        let mut credit = 0;
        if test.syntax_valid {
            credit += weights.partial_credit;
        }
        if test.dependencies_available {
            credit += weights.partial_credit;
        }
        if test.lint_issue_count < weights.lint_threshold {
            credit += weights.partial_credit;
        }
        if test.unit_tests_pass {
            credit += weights.partial_credit;
        }
        credit
    };

    let static_component =
        (analysis.code_quality_score.clamp(0.0, 100.0) * weights.static_factor).round() as u32;
    let performance_component = (analysis.performance_score.clamp(0.0, 100.0)
        * weights.performance_factor)
        .round() as u32;

    let total = (test_component + static_component + performance_component).min(100);

    QualityScore {
        total,
        test_component,
        static_component,
        performance_component,
    }
}
