//! Canonical artifact record
//!
//! The unit under improvement: a source module, its test module, and the
//! metadata that travels with them. Artifacts are copy-on-write: every
//! refinement produces a new value and history keeps the old ones.

pub mod literal;
pub mod normalize;

pub use normalize::normalize;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Artifact {
    pub main_module: String,
    pub test_module: String,
    pub dependencies: Vec<String>,
    pub service_name: String,
    pub metadata: Map<String, Value>,
}

impl Artifact {
    pub fn has_tests(&self) -> bool {
        !self.test_module.trim().is_empty()
    }

    /// Wire form used when an artifact is handed back to a capability
    /// (e.g. as refinement input).
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Deterministic minimal stand-in used when a generation reply cannot be
/// normalized twice in the same iteration. Always structurally valid so the
/// test and analysis stages have something to operate on.
pub fn fallback_artifact(service_name: &str) -> Artifact {
    let service = slugify(service_name);
    let main_module = format!(
        "class {class}:\n    def __init__(self):\n        self.name = \"{service}\"\n\n    def process(self, data):\n        return {{\"status\": \"processed\", \"data\": data}}\n",
        class = class_name(&service),
        service = service,
    );
    let test_module = format!(
        "from main import {class}\n\n\ndef test_process():\n    service = {class}()\n    result = service.process({{\"probe\": 1}})\n    assert result[\"status\"] == \"processed\"\n",
        class = class_name(&service),
    );
    let mut metadata = Map::new();
    metadata.insert("fallback".to_string(), Value::Bool(true));
    Artifact {
        main_module,
        test_module,
        dependencies: vec!["pytest".to_string()],
        service_name: service,
        metadata,
    }
}

fn slugify(name: &str) -> String {
    let mut slug: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect::<String>()
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if slug.is_empty() || slug.starts_with(|c: char| c.is_ascii_digit()) {
        slug = format!("service_{slug}");
    }
    slug
}

fn class_name(slug: &str) -> String {
    slug.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_deterministic() {
        let a = fallback_artifact("Order Tracking");
        let b = fallback_artifact("Order Tracking");
        assert_eq!(a, b);
        assert_eq!(a.service_name, "order_tracking");
        assert!(a.has_tests());
        assert_eq!(a.metadata.get("fallback"), Some(&Value::Bool(true)));
    }

    #[test]
    fn numeric_leading_names_get_a_prefix() {
        let artifact = fallback_artifact("2fa login");
        assert_eq!(artifact.service_name, "service_2fa_login");
    }

    #[test]
    fn wire_form_uses_camel_case() {
        let artifact = fallback_artifact("billing");
        let value = artifact.to_value();
        assert!(value.get("mainModule").is_some());
        assert!(value.get("serviceName").is_some());
    }
}
