//! Analysis capability
//!
//! Code-quality, performance, and pattern tools behind one trait. The
//! default analyzer is heuristic; its defining property is that structural
//! incompleteness (placeholder or unimplemented bodies) dominates the
//! quality score: a stylistically perfect stub must still score badly.
//! The penalty curve is configuration, not a constant.

use super::ANALYSIS_HOST;
use crate::protocol::{tool_handler, CapabilityHost};
use crate::{Error, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub code_quality_score: f64,
    /// Estimated share of implemented (non-placeholder) behavior, 0-100.
    pub completeness: f64,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub performance_score: f64,
    #[serde(default)]
    pub bottlenecks: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternReport {
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub anti_patterns: Vec<String>,
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn code_quality(&self, code: &str) -> Result<QualityReport>;
    async fn performance(&self, code: &str) -> Result<PerformanceReport>;
    async fn patterns(&self, code: &str) -> Result<PatternReport>;
}

/// Penalty curve for the default analyzer. The multiplier makes
/// incompleteness dominate: every missing percentage point costs more than
/// a style issue does.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Quality points lost per point of incompleteness.
    pub completeness_multiplier: f64,
    /// Flat penalty per critical placeholder (unimplemented body).
    pub critical_marker_penalty: f64,
    /// Completeness points lost per placeholder marker.
    pub marker_weight: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            completeness_multiplier: 1.5,
            critical_marker_penalty: 25.0,
            marker_weight: 25.0,
        }
    }
}

/// Marker-scanning analyzer. Critical markers are bodies that cannot run;
/// soft markers are deferred work that still executes.
pub struct HeuristicAnalyzer {
    config: AnalyzerConfig,
    critical_markers: Vec<&'static str>,
    soft_markers: Vec<&'static str>,
    loop_pattern: Regex,
}

impl Default for HeuristicAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

impl HeuristicAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            critical_markers: vec!["NotImplementedError", "unimplemented!", "todo!"],
            soft_markers: vec!["TODO", "FIXME", "XXX", "placeholder"],
            loop_pattern: Regex::new(r"(?m)^\s*(for |while |loop\b)").expect("static regex"),
        }
    }

    fn count_hits(code: &str, markers: &[&str]) -> usize {
        markers
            .iter()
            .map(|marker| code.matches(marker).count())
            .sum()
    }
}

#[async_trait]
impl Analyzer for HeuristicAnalyzer {
    async fn code_quality(&self, code: &str) -> Result<QualityReport> {
        let critical = Self::count_hits(code, &self.critical_markers);
        let soft = Self::count_hits(code, &self.soft_markers);

        let completeness = (100.0
            - (critical + soft) as f64 * self.config.marker_weight)
            .max(0.0);

        let mut issues = Vec::new();
        let mut suggestions = Vec::new();
        if critical > 0 {
            issues.push(format!("{critical} unimplemented bodies"));
            suggestions.push("implement every placeholder body before polishing style".to_string());
        }
        if soft > 0 {
            issues.push(format!("{soft} deferred-work markers"));
        }
        for (number, line) in code.lines().enumerate() {
            if line.len() > 120 {
                issues.push(format!("line {}: overly long line", number + 1));
            }
        }

        let mut score = 100.0;
        score -= (100.0 - completeness) * self.config.completeness_multiplier;
        score -= critical as f64 * self.config.critical_marker_penalty;
        // Style issues cost little by comparison.
        score -= issues.len() as f64 * 2.0;

        Ok(QualityReport {
            code_quality_score: score.clamp(0.0, 100.0),
            completeness,
            issues,
            suggestions,
        })
    }

    async fn performance(&self, code: &str) -> Result<PerformanceReport> {
        let loops: Vec<&str> = self
            .loop_pattern
            .find_iter(code)
            .map(|m| m.as_str().trim())
            .collect();
        let mut bottlenecks = Vec::new();
        if loops.len() > 3 {
            bottlenecks.push(format!("{} loops in one module", loops.len()));
        }
        if code.contains("sleep(") {
            bottlenecks.push("blocking sleep in module body".to_string());
        }
        let score = (85.0 - bottlenecks.len() as f64 * 10.0).clamp(0.0, 100.0);
        let suggestions = if bottlenecks.is_empty() {
            Vec::new()
        } else {
            vec!["restructure hot paths to avoid repeated scans".to_string()]
        };
        Ok(PerformanceReport {
            performance_score: score,
            bottlenecks,
            suggestions,
        })
    }

    async fn patterns(&self, code: &str) -> Result<PatternReport> {
        let mut patterns = Vec::new();
        let mut anti_patterns = Vec::new();
        if code.contains("class ") {
            patterns.push("class-based structure".to_string());
        }
        if code.contains("def ") || code.contains("fn ") {
            patterns.push("function decomposition".to_string());
        }
        if code.contains("except:") || code.contains("catch (_)") {
            anti_patterns.push("swallowed errors".to_string());
        }
        if code.contains("global ") {
            anti_patterns.push("mutable global state".to_string());
        }
        Ok(PatternReport {
            patterns,
            anti_patterns,
        })
    }
}

/// Build the analysis host over the given analyzer.
pub fn host(analyzer: Arc<dyn Analyzer>) -> Result<CapabilityHost> {
    let mut host = CapabilityHost::new(ANALYSIS_HOST, env!("CARGO_PKG_VERSION"));
    let code_schema = json!({
        "type": "object",
        "properties": { "code": { "type": "string" } },
        "required": ["code"],
    });

    {
        let analyzer = Arc::clone(&analyzer);
        host.registry_mut().register(
            "analyze_code_quality",
            "Score structure and completeness of a module",
            code_schema.clone(),
            tool_handler(move |args| {
                let analyzer = Arc::clone(&analyzer);
                async move {
                    let code = required_str(&args, "code")?;
                    Ok(serde_json::to_value(analyzer.code_quality(&code).await?)?)
                }
            }),
        )?;
    }

    {
        let analyzer = Arc::clone(&analyzer);
        host.registry_mut().register(
            "analyze_performance",
            "Estimate runtime characteristics of a module",
            code_schema.clone(),
            tool_handler(move |args| {
                let analyzer = Arc::clone(&analyzer);
                async move {
                    let code = required_str(&args, "code")?;
                    Ok(serde_json::to_value(analyzer.performance(&code).await?)?)
                }
            }),
        )?;
    }

    {
        let analyzer = Arc::clone(&analyzer);
        host.registry_mut().register(
            "identify_patterns",
            "Identify design patterns and anti-patterns in a module",
            code_schema,
            tool_handler(move |args| {
                let analyzer = Arc::clone(&analyzer);
                async move {
                    let code = required_str(&args, "code")?;
                    Ok(serde_json::to_value(analyzer.patterns(&code).await?)?)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_module_scores_high() {
        let analyzer = HeuristicAnalyzer::default();
        let report = analyzer
            .code_quality("def add(a, b):\n    return a + b\n")
            .await
            .unwrap();
        assert!(report.code_quality_score > 90.0);
        assert_eq!(report.completeness, 100.0);
    }

    #[tokio::test]
    async fn incompleteness_dominates_style() {
        let analyzer = HeuristicAnalyzer::default();
        let stub = analyzer
            .code_quality("def pay(order):\n    raise NotImplementedError\n")
            .await
            .unwrap();
        let long_lines = analyzer
            .code_quality(&format!("x = 1  # {}\n", "y".repeat(150)))
            .await
            .unwrap();
        // One unimplemented body must cost far more than style noise.
        assert!(stub.code_quality_score < long_lines.code_quality_score - 30.0);
    }

    #[tokio::test]
    async fn penalty_curve_is_configurable() {
        let strict = HeuristicAnalyzer::new(AnalyzerConfig {
            completeness_multiplier: 3.0,
            ..Default::default()
        });
        let lenient = HeuristicAnalyzer::new(AnalyzerConfig {
            completeness_multiplier: 0.5,
            critical_marker_penalty: 5.0,
            ..Default::default()
        });
        let code = "def sync():\n    # TODO wire this up\n    pass\n";
        let strict_report = strict.code_quality(code).await.unwrap();
        let lenient_report = lenient.code_quality(code).await.unwrap();
        assert!(strict_report.code_quality_score < lenient_report.code_quality_score);
    }

    #[tokio::test]
    async fn blocking_sleep_is_a_bottleneck() {
        let analyzer = HeuristicAnalyzer::default();
        let report = analyzer
            .performance("import time\ntime.sleep(5)\n")
            .await
            .unwrap();
        assert!(!report.bottlenecks.is_empty());
        assert!(report.performance_score < 85.0);
    }

    #[tokio::test]
    async fn swallowed_errors_are_an_anti_pattern() {
        let analyzer = HeuristicAnalyzer::default();
        let report = analyzer
            .patterns("try:\n    run()\nexcept:\n    pass\n")
            .await
            .unwrap();
        assert!(report
            .anti_patterns
            .iter()
            .any(|p| p.contains("swallowed")));
    }
}
