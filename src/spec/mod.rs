//! Behavioral specifications
//!
//! A specification seeds the first generation call: named scenarios with a
//! trigger and expected outcomes, plus free-form constraints that are
//! passed through to the generation capability untouched.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Specification {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
    #[serde(default)]
    pub constraints: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    /// Precondition, informational only.
    #[serde(default)]
    pub given: Option<String>,
    /// The action that starts the scenario.
    #[serde(default, alias = "when")]
    pub trigger: String,
    /// Observable outcomes the implementation must produce.
    #[serde(default, alias = "then")]
    pub expected: Vec<String>,
}

impl Scenario {
    /// A scenario is usable when it has both a trigger and at least one
    /// expected outcome.
    pub fn is_complete(&self) -> bool {
        !self.trigger.trim().is_empty()
            && self.expected.iter().any(|e| !e.trim().is_empty())
    }
}

impl Specification {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Specification(format!("cannot read {}: {e}", path.display()))
        })?;
        let spec: Specification = serde_yaml::from_str(&content)?;
        Ok(spec)
    }

    /// Minimum shape required before a cycle may start: a name and at
    /// least one complete scenario.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Specification(
                "specification has no name".to_string(),
            ));
        }
        if !self.scenarios.iter().any(Scenario::is_complete) {
            return Err(Error::Specification(format!(
                "specification '{}' has no scenario with a trigger and an expected outcome",
                self.name
            )));
        }
        Ok(())
    }

    /// Wire form sent to the generation capability.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_spec() -> Specification {
        serde_yaml::from_str(
            r#"
name: order-tracking
description: Track order status transitions
scenarios:
  - name: happy path
    given: an order exists
    when: the order ships
    then:
      - status becomes shipped
      - a notification is sent
constraints:
  latency_ms: 200
"#,
        )
        .unwrap()
    }

    #[test]
    fn complete_specification_validates() {
        let spec = complete_spec();
        assert!(spec.validate().is_ok());
        assert_eq!(spec.scenarios.len(), 1);
        assert_eq!(spec.scenarios[0].trigger, "the order ships");
        assert_eq!(spec.scenarios[0].expected.len(), 2);
    }

    #[test]
    fn scenario_without_trigger_is_incomplete() {
        let spec: Specification = serde_yaml::from_str(
            r#"
name: broken
scenarios:
  - name: missing trigger
    then: [something happens]
"#,
        )
        .unwrap();
        let err = spec.validate().unwrap_err();
        assert!(matches!(err, Error::Specification(_)));
    }

    #[test]
    fn scenario_without_outcome_is_incomplete() {
        let spec: Specification = serde_yaml::from_str(
            r#"
name: broken
scenarios:
  - name: no outcome
    when: the user logs in
"#,
        )
        .unwrap();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn empty_specification_is_rejected() {
        let spec = Specification::default();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn constraints_pass_through_to_wire_form() {
        let value = complete_spec().to_value();
        assert_eq!(value["constraints"]["latency_ms"], serde_json::json!(200));
    }
}
