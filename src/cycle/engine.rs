//! Iteration engine
//!
//! Sequences the stages of one iteration in strict order (generate, test,
//! analyze, score) and then decides whether to refine, succeed, or stop. Only
//! a malformed specification aborts a cycle; every other failure is
//! captured at the iteration boundary and the loop spends its remaining
//! budget.

use super::{
    CancelToken, CycleOutcome, CycleResult, CycleSummary, IterationRecord, PackagingArtifacts,
};
use crate::artifact::{fallback_artifact, normalize, Artifact};
use crate::capability::analysis::{PatternReport, PerformanceReport, QualityReport};
use crate::capability::testing::{DependencyReport, LintReport, SyntaxReport, TestRunReport};
use crate::capability::CapabilitySet;
use crate::config::Settings;
use crate::context::CorrelationContext;
use crate::protocol::{CapabilityHost, ToolRequest, CODE_TIMEOUT, CODE_TOOL_NOT_FOUND};
use crate::scoring::{self, AnalysisOutcome, QualityScore, TestOutcome};
use crate::spec::Specification;
use crate::{Error, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

pub struct DevelopmentCycle {
    capabilities: CapabilitySet,
    settings: Settings,
    cancel: CancelToken,
}

impl DevelopmentCycle {
    pub fn new(capabilities: CapabilitySet, settings: Settings) -> Self {
        Self::with_cancel_token(capabilities, settings, CancelToken::new())
    }

    /// Use a caller-owned cancellation token, e.g. one wired to a signal
    /// handler shared across cycles.
    pub fn with_cancel_token(
        capabilities: CapabilitySet,
        settings: Settings,
        cancel: CancelToken,
    ) -> Self {
        Self {
            capabilities,
            settings,
            cancel,
        }
    }

    /// Handle for cancelling this cycle between iterations.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the full cycle for one specification.
    pub async fn run(&self, spec: &Specification) -> Result<CycleResult> {
        spec.validate()?;

        let ctx = CorrelationContext::new("cycle", &spec.name);
        let target = self.settings.cycle.target_score;
        let max_iterations = self.settings.cycle.max_iterations;
        info!(
            correlation_id = %ctx.correlation_id,
            spec = %spec.name,
            target,
            max_iterations,
            "starting development cycle"
        );

        let mut records: Vec<IterationRecord> = Vec::new();
        let mut outcome = CycleOutcome::Exhausted;

        for index in 1..=max_iterations {
            if self.cancel.is_cancelled() {
                info!(iteration = index, "cycle cancelled before iteration");
                outcome = CycleOutcome::Cancelled;
                break;
            }

            let record = self.run_iteration(index, spec, records.last(), &ctx).await;
            let reached = record.error.is_none() && record.quality_score.total >= target;
            info!(
                iteration = index,
                score = record.quality_score.total,
                error = record.error.as_deref().unwrap_or(""),
                "iteration finished"
            );
            records.push(record);

            if reached {
                outcome = CycleOutcome::Succeeded;
                break;
            }
        }

        let success = outcome == CycleOutcome::Succeeded;
        let (final_artifact, final_score) = match outcome {
            // The iteration that hit the target is final as-is.
            CycleOutcome::Succeeded => records
                .last()
                .map(|r| (Some(r.artifact.clone()), r.quality_score))
                .unwrap_or((None, QualityScore::zero())),
            // Otherwise the best score wins; ties go to the latest attempt.
            _ => best_record(&records)
                .map(|r| (Some(r.artifact.clone()), r.quality_score))
                .unwrap_or((None, QualityScore::zero())),
        };

        let packaging = if success && self.settings.cycle.package_artifacts {
            match final_artifact.as_ref() {
                Some(artifact) => self.package(artifact, &ctx).await,
                None => None,
            }
        } else {
            None
        };

        let summary = CycleSummary::from_records(&records, target);
        info!(
            correlation_id = %ctx.correlation_id,
            success,
            final_score = final_score.total,
            iterations = records.len(),
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            "development cycle finished"
        );

        Ok(CycleResult {
            success,
            outcome,
            final_artifact,
            final_score,
            iterations: records,
            summary,
            packaging,
        })
    }

    /// One generate → test → analyze → score pass. Stage failures are
    /// folded into the record; this function never errors.
    async fn run_iteration(
        &self,
        index: u32,
        spec: &Specification,
        previous: Option<&IterationRecord>,
        ctx: &CorrelationContext,
    ) -> IterationRecord {
        let mut errors: Vec<String> = Vec::new();

        let artifact = match self.generate(spec, previous, ctx).await {
            Ok(artifact) => artifact,
            Err(err) => {
                warn!(iteration = index, %err, "generation stage failed");
                errors.push(Error::Iteration {
                    index,
                    message: err.to_string(),
                }
                .to_string());
                // Downstream stages still need something to operate on.
                previous
                    .map(|r| r.artifact.clone())
                    .unwrap_or_else(|| fallback_artifact(&spec.name))
            }
        };

        let test_outcome = match self.run_tests(&artifact, ctx).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(iteration = index, %err, "test stage failed");
                errors.push(Error::Iteration {
                    index,
                    message: err.to_string(),
                }
                .to_string());
                TestOutcome::failed(err.to_string())
            }
        };

        let analysis_outcome = match self.analyze(&artifact, ctx).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(iteration = index, %err, "analysis stage failed");
                errors.push(Error::Iteration {
                    index,
                    message: err.to_string(),
                }
                .to_string());
                AnalysisOutcome::default()
            }
        };

        let quality_score =
            scoring::score(&test_outcome, &analysis_outcome, &self.settings.scoring);

        let mut improvements = Vec::new();
        if let Some(prev) = previous {
            if quality_score.total > prev.quality_score.total {
                improvements.push(format!(
                    "Quality score improved from {} to {}",
                    prev.quality_score.total, quality_score.total
                ));
            }
        }

        IterationRecord {
            index,
            artifact,
            test_outcome,
            analysis_outcome,
            quality_score,
            improvements,
            error: (!errors.is_empty()).then(|| errors.join("; ")),
            completed_at: Utc::now(),
        }
    }

    /// Iteration 1 generates from the specification; later iterations
    /// refine the previous artifact with its failure and analysis context.
    /// A reply that cannot be normalized is retried once, then replaced by
    /// the deterministic fallback artifact.
    async fn generate(
        &self,
        spec: &Specification,
        previous: Option<&IterationRecord>,
        ctx: &CorrelationContext,
    ) -> Result<Artifact> {
        let (tool, args) = match previous {
            None => {
                let mut args = Map::new();
                args.insert("specification".to_string(), spec.to_value());
                ("generate_implementation", args)
            }
            Some(prev) => ("refine_implementation", self.refinement_arguments(prev)),
        };

        let content = self
            .invoke(&self.capabilities.generation, tool, args.clone(), ctx)
            .await?;
        match normalize(&content) {
            Ok(artifact) => Ok(artifact),
            Err(first) => {
                warn!(%first, "could not normalize generation reply, retrying once");
                let content = self
                    .invoke(&self.capabilities.generation, tool, args, ctx)
                    .await?;
                match normalize(&content) {
                    Ok(artifact) => Ok(artifact),
                    Err(second) => {
                        warn!(%second, "second normalization failed, using fallback artifact");
                        Ok(fallback_artifact(&spec.name))
                    }
                }
            }
        }
    }

    fn refinement_arguments(&self, prev: &IterationRecord) -> Map<String, Value> {
        let mut args = Map::new();
        args.insert("previousArtifact".to_string(), prev.artifact.to_value());
        args.insert(
            "testFailures".to_string(),
            Value::from(prev.test_outcome.failures.clone()),
        );
        args.insert(
            "qualityIssues".to_string(),
            Value::from(prev.analysis_outcome.issues.clone()),
        );
        args.insert(
            "suggestions".to_string(),
            Value::from(prev.analysis_outcome.suggestions.clone()),
        );
        args.insert(
            "targetScore".to_string(),
            Value::from(self.settings.cycle.target_score),
        );
        args
    }

    async fn run_tests(
        &self,
        artifact: &Artifact,
        ctx: &CorrelationContext,
    ) -> Result<TestOutcome> {
        let testing = &self.capabilities.testing;

        let syntax: SyntaxReport = self
            .invoke_parsed(testing, "validate_syntax", code_args(&artifact.main_module), ctx)
            .await?;

        let mut deps_args = Map::new();
        deps_args.insert(
            "dependencies".to_string(),
            Value::from(artifact.dependencies.clone()),
        );
        let dependencies: DependencyReport = self
            .invoke_parsed(testing, "check_dependencies", deps_args, ctx)
            .await?;

        let lint: LintReport = self
            .invoke_parsed(testing, "run_linting", code_args(&artifact.main_module), ctx)
            .await?;

        // Unit tests only run when a test module exists; absence does not
        // fail the stage.
        let unit = if artifact.has_tests() {
            let mut args = Map::new();
            args.insert(
                "mainModule".to_string(),
                Value::from(artifact.main_module.clone()),
            );
            args.insert(
                "testModule".to_string(),
                Value::from(artifact.test_module.clone()),
            );
            Some(
                self.invoke_parsed::<TestRunReport>(testing, "run_tests", args, ctx)
                    .await?,
            )
        } else {
            None
        };

        let unit_tests_pass = unit.as_ref().map_or(true, |r| r.passed);
        let mut failures: Vec<String> = unit.map(|r| r.failures).unwrap_or_default();
        failures.extend(syntax.errors.iter().cloned());
        failures.extend(
            dependencies
                .missing
                .iter()
                .map(|dep| format!("missing dependency: {dep}")),
        );

        Ok(TestOutcome::aggregate(
            syntax.valid,
            dependencies.all_available,
            lint.issue_count,
            unit_tests_pass,
            failures,
            &self.settings.scoring,
        ))
    }

    async fn analyze(
        &self,
        artifact: &Artifact,
        ctx: &CorrelationContext,
    ) -> Result<AnalysisOutcome> {
        let analysis = &self.capabilities.analysis;

        let quality: QualityReport = self
            .invoke_parsed(
                analysis,
                "analyze_code_quality",
                code_args(&artifact.main_module),
                ctx,
            )
            .await?;
        let performance: PerformanceReport = self
            .invoke_parsed(
                analysis,
                "analyze_performance",
                code_args(&artifact.main_module),
                ctx,
            )
            .await?;
        let patterns: PatternReport = self
            .invoke_parsed(
                analysis,
                "identify_patterns",
                code_args(&artifact.main_module),
                ctx,
            )
            .await?;

        let mut issues = quality.issues;
        issues.extend(
            patterns
                .anti_patterns
                .into_iter()
                .map(|p| format!("anti-pattern: {p}")),
        );
        let mut suggestions = quality.suggestions;
        suggestions.extend(performance.suggestions);

        Ok(AnalysisOutcome {
            code_quality_score: quality.code_quality_score,
            performance_score: performance.performance_score,
            issues,
            suggestions,
        })
    }

    /// Packaging is best-effort: a failure is logged and dropped, never
    /// propagated into the cycle outcome.
    async fn package(
        &self,
        artifact: &Artifact,
        ctx: &CorrelationContext,
    ) -> Option<PackagingArtifacts> {
        let host = self.capabilities.packaging.as_ref()?;
        let mut args = Map::new();
        args.insert("artifact".to_string(), artifact.to_value());

        let dockerfile = match self
            .invoke(host, "generate_dockerfile", args.clone(), ctx)
            .await
            .and_then(|content| first_text(&content))
        {
            Ok(text) => text,
            Err(err) => {
                warn!(%err, "dockerfile generation failed");
                return None;
            }
        };
        let compose = match self
            .invoke(host, "generate_compose", args, ctx)
            .await
            .and_then(|content| first_text(&content))
        {
            Ok(text) => text,
            Err(err) => {
                warn!(%err, "compose generation failed");
                return None;
            }
        };

        Some(PackagingArtifacts {
            dockerfile,
            compose,
        })
    }

    /// Issue one capability call with the backend's timeout budget and
    /// return the response content. Error envelopes come back as typed
    /// errors so iteration bookkeeping can classify them.
    async fn invoke(
        &self,
        host: &CapabilityHost,
        tool: &str,
        arguments: Map<String, Value>,
        ctx: &CorrelationContext,
    ) -> Result<Value> {
        let child = ctx.child(host.name(), tool);
        let timeout = self.settings.timeouts.for_backend(host.name());
        debug!(host = host.name(), tool, ?timeout, "invoking capability");

        let response = host
            .handle_request_with_timeout(ToolRequest::call(tool, arguments), timeout, &child)
            .await;

        if let Some(error) = response.error {
            return Err(match error.code.as_str() {
                CODE_TIMEOUT => Error::Timeout(timeout),
                CODE_TOOL_NOT_FOUND => Error::ToolNotFound(tool.to_string()),
                _ => Error::Tool(format!("{}: {}", error.code, error.message)),
            });
        }

        response
            .result
            .as_ref()
            .and_then(|r| r.get("content"))
            .cloned()
            .ok_or_else(|| Error::Tool(format!("{tool} returned no content")))
    }

    async fn invoke_parsed<T: DeserializeOwned>(
        &self,
        host: &CapabilityHost,
        tool: &str,
        arguments: Map<String, Value>,
        ctx: &CorrelationContext,
    ) -> Result<T> {
        let content = self.invoke(host, tool, arguments, ctx).await?;
        let text = first_text(&content)?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| Error::Tool(format!("{tool} returned unparseable payload: {e}")))?;
        serde_json::from_value(value)
            .map_err(|e| Error::Tool(format!("{tool} returned unexpected payload: {e}")))
    }
}

fn code_args(code: &str) -> Map<String, Value> {
    let mut args = Map::new();
    args.insert("code".to_string(), Value::from(code.to_string()));
    args
}

fn first_text(content: &Value) -> Result<String> {
    content
        .get(0)
        .and_then(|block| block.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Tool("response content has no text block".to_string()))
}

/// Highest total wins; on a tie the later iteration does.
fn best_record(records: &[IterationRecord]) -> Option<&IterationRecord> {
    let mut best: Option<&IterationRecord> = None;
    for record in records {
        if best.map_or(true, |b| record.quality_score.total >= b.quality_score.total) {
            best = Some(record);
        }
    }
    best
}
