//! Testing capability
//!
//! Syntax, dependency, lint, and unit-test checks behind one trait. The
//! default harness is heuristic and language-agnostic; a real harness
//! (compiler, package index, test runner) registers the same four tools.

use super::TESTING_HOST;
use crate::protocol::{tool_handler, CapabilityHost};
use crate::{Error, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyntaxReport {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyReport {
    pub all_available: bool,
    #[serde(default)]
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintReport {
    pub issue_count: u32,
    #[serde(default)]
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunReport {
    pub passed: bool,
    #[serde(default)]
    pub failures: Vec<String>,
}

#[async_trait]
pub trait TestHarness: Send + Sync {
    async fn check_syntax(&self, code: &str) -> Result<SyntaxReport>;
    async fn check_dependencies(&self, dependencies: &[String]) -> Result<DependencyReport>;
    async fn lint(&self, code: &str) -> Result<LintReport>;
    async fn run_tests(&self, main_module: &str, test_module: &str) -> Result<TestRunReport>;
}

/// Cheap static checks that need no toolchain: delimiter balance for
/// syntax, an optional allow-list for dependencies, and line-level lint
/// rules.
pub struct HeuristicHarness {
    /// When set, dependencies outside this set count as missing. When
    /// unset, every dependency is assumed resolvable.
    pub known_packages: Option<HashSet<String>>,
    long_line: Regex,
}

impl Default for HeuristicHarness {
    fn default() -> Self {
        Self {
            known_packages: None,
            long_line: Regex::new(r"^.{121,}$").expect("static regex"),
        }
    }
}

impl HeuristicHarness {
    pub fn with_known_packages(packages: impl IntoIterator<Item = String>) -> Self {
        Self {
            known_packages: Some(packages.into_iter().collect()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl TestHarness for HeuristicHarness {
    async fn check_syntax(&self, code: &str) -> Result<SyntaxReport> {
        if code.trim().is_empty() {
            return Ok(SyntaxReport {
                valid: false,
                errors: vec!["module is empty".to_string()],
            });
        }
        let errors = delimiter_errors(code);
        Ok(SyntaxReport {
            valid: errors.is_empty(),
            errors,
        })
    }

    async fn check_dependencies(&self, dependencies: &[String]) -> Result<DependencyReport> {
        let missing: Vec<String> = match &self.known_packages {
            Some(known) => dependencies
                .iter()
                .filter(|dep| !known.contains(*dep))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        Ok(DependencyReport {
            all_available: missing.is_empty(),
            missing,
        })
    }

    async fn lint(&self, code: &str) -> Result<LintReport> {
        let mut issues = Vec::new();
        for (number, line) in code.lines().enumerate() {
            let number = number + 1;
            if self.long_line.is_match(line) {
                issues.push(format!("line {number}: exceeds 120 characters"));
            }
            if line.ends_with(' ') || line.ends_with('\t') {
                issues.push(format!("line {number}: trailing whitespace"));
            }
            if line.contains("TODO") || line.contains("FIXME") {
                issues.push(format!("line {number}: unresolved marker"));
            }
        }
        Ok(LintReport {
            issue_count: issues.len() as u32,
            issues,
        })
    }

    async fn run_tests(&self, main_module: &str, test_module: &str) -> Result<TestRunReport> {
        if test_module.trim().is_empty() {
            return Ok(TestRunReport {
                passed: false,
                failures: vec!["no test module present".to_string()],
            });
        }
        let mut failures = Vec::new();
        if !test_module.contains("assert") {
            failures.push("test module contains no assertions".to_string());
        }
        if !delimiter_errors(test_module).is_empty() {
            failures.push("test module has unbalanced delimiters".to_string());
        }
        if main_module.trim().is_empty() {
            failures.push("implementation module is empty".to_string());
        }
        Ok(TestRunReport {
            passed: failures.is_empty(),
            failures,
        })
    }
}

/// Quote-aware delimiter balance scan. Good enough to catch truncated
/// generations, which is the dominant real failure.
fn delimiter_errors(code: &str) -> Vec<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    for c in code.chars() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => in_string = Some(c),
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return vec![format!("unbalanced '{c}'")];
                }
            }
            _ => {}
        }
    }
    if let Some(open) = stack.last() {
        return vec![format!("unclosed '{open}'")];
    }
    Vec::new()
}

/// Build the testing host over the given harness.
pub fn host(harness: Arc<dyn TestHarness>) -> Result<CapabilityHost> {
    let mut host = CapabilityHost::new(TESTING_HOST, env!("CARGO_PKG_VERSION"));

    {
        let harness = Arc::clone(&harness);
        host.registry_mut().register(
            "validate_syntax",
            "Check that a module parses",
            json!({
                "type": "object",
                "properties": { "code": { "type": "string" } },
                "required": ["code"],
            }),
            tool_handler(move |args| {
                let harness = Arc::clone(&harness);
                async move {
                    let code = required_str(&args, "code")?;
                    let report = harness.check_syntax(&code).await?;
                    Ok(serde_json::to_value(report)?)
                }
            }),
        )?;
    }

    {
        let harness = Arc::clone(&harness);
        host.registry_mut().register(
            "check_dependencies",
            "Check that declared dependencies are resolvable",
            json!({
                "type": "object",
                "properties": { "dependencies": { "type": "array" } },
                "required": ["dependencies"],
            }),
            tool_handler(move |args| {
                let harness = Arc::clone(&harness);
                async move {
                    let dependencies: Vec<String> = args
                        .get("dependencies")
                        .and_then(Value::as_array)
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default();
                    let report = harness.check_dependencies(&dependencies).await?;
                    Ok(serde_json::to_value(report)?)
                }
            }),
        )?;
    }

    {
        let harness = Arc::clone(&harness);
        host.registry_mut().register(
            "run_linting",
            "Count style issues in a module",
            json!({
                "type": "object",
                "properties": { "code": { "type": "string" } },
                "required": ["code"],
            }),
            tool_handler(move |args| {
                let harness = Arc::clone(&harness);
                async move {
                    let code = required_str(&args, "code")?;
                    let report = harness.lint(&code).await?;
                    Ok(serde_json::to_value(report)?)
                }
            }),
        )?;
    }

    {
        let harness = Arc::clone(&harness);
        host.registry_mut().register(
            "run_tests",
            "Execute the test module against the implementation",
            json!({
                "type": "object",
                "properties": {
                    "mainModule": { "type": "string" },
                    "testModule": { "type": "string" },
                },
                "required": ["mainModule", "testModule"],
            }),
            tool_handler(move |args| {
                let harness = Arc::clone(&harness);
                async move {
                    let main_module = required_str(&args, "mainModule")?;
                    let test_module = required_str(&args, "testModule")?;
                    let report = harness.run_tests(&main_module, &test_module).await?;
                    Ok(serde_json::to_value(report)?)
                }
            }),
        )?;
    }

    Ok(host)
}

fn required_str(args: &serde_json::Map<String, Value>, key: &str) -> Result<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Tool(format!("missing '{key}' argument")))
}
