//! Configuration management
//!
//! Layered settings: built-in defaults, then an optional TOML file, then
//! `CRUCIBLE_*` environment variables. Per-backend timeout overrides let
//! slower backends get longer invocation budgets.

use crate::scoring::ScoringWeights;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cycle: CycleSettings,
    pub scoring: ScoringWeights,
    pub timeouts: TimeoutSettings,
    pub generation: GenerationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleSettings {
    /// Score at which the cycle succeeds (0-100).
    pub target_score: u32,
    /// Iteration budget; the loop never runs more than this many passes.
    pub max_iterations: u32,
    /// Render container artifacts after a successful cycle.
    pub package_artifacts: bool,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            target_score: 80,
            max_iterations: 5,
            package_artifacts: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Budget for a single capability invocation.
    pub default_secs: u64,
    /// Overrides keyed by capability host name.
    pub per_backend: HashMap<String, u64>,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            default_secs: 120,
            per_backend: HashMap::new(),
        }
    }
}

impl TimeoutSettings {
    pub fn for_backend(&self, name: &str) -> Duration {
        let secs = self
            .per_backend
            .get(name)
            .copied()
            .unwrap_or(self.default_secs);
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// External command invoked for generation; prompt on stdin, reply on
    /// stdout. When unset, a deterministic template backend is used.
    pub command: Option<String>,
    pub cache_max_age_secs: u64,
    pub cache_capacity: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            command: None,
            cache_max_age_secs: 86_400,
            cache_capacity: 256,
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file, then apply environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                toml::from_str(&content)?
            }
            None => Self::default(),
        };
        settings.merge_env();
        settings.validate()?;
        Ok(settings)
    }

    fn merge_env(&mut self) {
        if let Some(target) = env_parse::<u32>("CRUCIBLE_TARGET_SCORE") {
            self.cycle.target_score = target;
        }
        if let Some(max) = env_parse::<u32>("CRUCIBLE_MAX_ITERATIONS") {
            self.cycle.max_iterations = max;
        }
        if let Ok(command) = std::env::var("CRUCIBLE_BACKEND_CMD") {
            if !command.trim().is_empty() {
                self.generation.command = Some(command);
            }
        }
        if let Some(secs) = env_parse::<u64>("CRUCIBLE_TIMEOUT_SECS") {
            self.timeouts.default_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cycle.max_iterations == 0 {
            return Err(Error::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.cycle.target_score > 100 {
            return Err(Error::Config(
                "target_score must be between 0 and 100".to_string(),
            ));
        }
        if self.timeouts.default_secs == 0 {
            return Err(Error::Config(
                "default timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.cycle.target_score, 80);
        assert_eq!(settings.cycle.max_iterations, 5);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let settings: Settings = toml::from_str(
            r#"
[cycle]
target_score = 90
max_iterations = 3

[scoring]
test_weight = 50

[timeouts]
default_secs = 60

[timeouts.per_backend]
generation = 300

[generation]
command = "claude --print"
"#,
        )
        .unwrap();
        assert_eq!(settings.cycle.target_score, 90);
        assert_eq!(settings.scoring.test_weight, 50);
        assert_eq!(
            settings.timeouts.for_backend("generation"),
            Duration::from_secs(300)
        );
        assert_eq!(
            settings.timeouts.for_backend("testing"),
            Duration::from_secs(60)
        );
        assert_eq!(settings.generation.command.as_deref(), Some("claude --print"));
    }

    #[test]
    fn zero_iteration_budget_is_rejected() {
        let mut settings = Settings::default();
        settings.cycle.max_iterations = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn out_of_range_target_is_rejected() {
        let mut settings = Settings::default();
        settings.cycle.target_score = 150;
        assert!(settings.validate().is_err());
    }
}
