//! Scripted capability implementations for tests
//!
//! Deterministic backends, harnesses, and analyzers that let unit and
//! integration tests drive the cycle without any external tooling.

use crate::capability::analysis::{Analyzer, PatternReport, PerformanceReport, QualityReport};
use crate::capability::generation::Backend;
use crate::capability::testing::{
    DependencyReport, LintReport, SyntaxReport, TestHarness, TestRunReport,
};
use crate::cycle::CancelToken;
use crate::spec::{Scenario, Specification};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A one-scenario specification that passes INIT validation.
pub fn sample_spec(name: &str) -> Specification {
    Specification {
        name: name.to_string(),
        description: "sample".to_string(),
        scenarios: vec![Scenario {
            name: "happy path".to_string(),
            given: Some("the system is idle".to_string()),
            trigger: "a request arrives".to_string(),
            expected: vec!["a response is returned".to_string()],
        }],
        constraints: Default::default(),
    }
}

/// JSON artifact reply in the shape generation backends produce.
pub fn artifact_reply(service: &str) -> String {
    serde_json::json!({
        "mainModule": format!("class Handler:\n    def run(self, req):\n        return {{\"service\": \"{service}\"}}\n"),
        "testModule": "def test_run():\n    assert Handler().run({})[\"service\"]\n",
        "dependencies": ["pytest"],
        "serviceName": service,
    })
    .to_string()
}

/// Replays queued replies in order; once the queue is empty the last reply
/// repeats forever.
pub struct ScriptedBackend {
    replies: Mutex<(VecDeque<String>, Option<String>)>,
    pub calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(replies: impl IntoIterator<Item = String>) -> Self {
        Self {
            replies: Mutex::new((replies.into_iter().collect(), None)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.replies.lock().expect("scripted backend lock");
        let (queue, last) = &mut *guard;
        if let Some(next) = queue.pop_front() {
            *last = Some(next.clone());
            return Ok(next);
        }
        last.clone()
            .ok_or_else(|| Error::Backend("scripted backend has no replies".to_string()))
    }
}

/// Cancels a token when a given completion call is reached, then keeps
/// answering normally. Used to exercise the decide-boundary stop.
pub struct CancellingBackend<B> {
    inner: B,
    cancel_on_call: usize,
    token: CancelToken,
    calls: AtomicUsize,
}

impl<B> CancellingBackend<B> {
    pub fn new(inner: B, cancel_on_call: usize, token: CancelToken) -> Self {
        Self {
            inner,
            cancel_on_call,
            token,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl<B: Backend> Backend for CancellingBackend<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.cancel_on_call {
            self.token.cancel();
        }
        self.inner.complete(prompt).await
    }
}

/// Fixed check results for every module it sees.
#[derive(Clone)]
pub struct StaticHarness {
    pub syntax_valid: bool,
    pub dependencies_available: bool,
    pub lint_issue_count: u32,
    pub unit_tests_pass: bool,
}

impl StaticHarness {
    pub fn passing() -> Self {
        Self {
            syntax_valid: true,
            dependencies_available: true,
            lint_issue_count: 0,
            unit_tests_pass: true,
        }
    }

    pub fn failing_checks() -> Self {
        Self {
            syntax_valid: true,
            dependencies_available: true,
            lint_issue_count: 10,
            unit_tests_pass: false,
        }
    }
}

#[async_trait]
impl TestHarness for StaticHarness {
    async fn check_syntax(&self, _code: &str) -> Result<SyntaxReport> {
        Ok(SyntaxReport {
            valid: self.syntax_valid,
            errors: if self.syntax_valid {
                Vec::new()
            } else {
                vec!["scripted syntax failure".to_string()]
            },
        })
    }

    async fn check_dependencies(&self, _deps: &[String]) -> Result<DependencyReport> {
        Ok(DependencyReport {
            all_available: self.dependencies_available,
            missing: Vec::new(),
        })
    }

    async fn lint(&self, _code: &str) -> Result<LintReport> {
        Ok(LintReport {
            issue_count: self.lint_issue_count,
            issues: (0..self.lint_issue_count)
                .map(|i| format!("scripted lint issue {i}"))
                .collect(),
        })
    }

    async fn run_tests(&self, _main: &str, _test: &str) -> Result<TestRunReport> {
        Ok(TestRunReport {
            passed: self.unit_tests_pass,
            failures: if self.unit_tests_pass {
                Vec::new()
            } else {
                vec!["scripted test failure".to_string()]
            },
        })
    }
}

/// Delegates to a [`StaticHarness`] but stalls one specific syntax check
/// long enough to trip the invocation timeout.
pub struct StallingHarness {
    inner: StaticHarness,
    stall_on_syntax_call: usize,
    stall_for: Duration,
    syntax_calls: AtomicUsize,
}

impl StallingHarness {
    pub fn new(inner: StaticHarness, stall_on_syntax_call: usize, stall_for: Duration) -> Self {
        Self {
            inner,
            stall_on_syntax_call,
            stall_for,
            syntax_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TestHarness for StallingHarness {
    async fn check_syntax(&self, code: &str) -> Result<SyntaxReport> {
        let call = self.syntax_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.stall_on_syntax_call {
            tokio::time::sleep(self.stall_for).await;
        }
        self.inner.check_syntax(code).await
    }

    async fn check_dependencies(&self, deps: &[String]) -> Result<DependencyReport> {
        self.inner.check_dependencies(deps).await
    }

    async fn lint(&self, code: &str) -> Result<LintReport> {
        self.inner.lint(code).await
    }

    async fn run_tests(&self, main: &str, test: &str) -> Result<TestRunReport> {
        self.inner.run_tests(main, test).await
    }
}

/// Fixed quality and performance scores.
pub struct StaticAnalyzer {
    pub quality: f64,
    pub performance: f64,
}

#[async_trait]
impl Analyzer for StaticAnalyzer {
    async fn code_quality(&self, _code: &str) -> Result<QualityReport> {
        Ok(QualityReport {
            code_quality_score: self.quality,
            completeness: 100.0,
            issues: Vec::new(),
            suggestions: vec!["scripted suggestion".to_string()],
        })
    }

    async fn performance(&self, _code: &str) -> Result<PerformanceReport> {
        Ok(PerformanceReport {
            performance_score: self.performance,
            bottlenecks: Vec::new(),
            suggestions: Vec::new(),
        })
    }

    async fn patterns(&self, _code: &str) -> Result<PatternReport> {
        Ok(PatternReport::default())
    }
}
