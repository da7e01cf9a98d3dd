//! Response normalization
//!
//! Capability handlers and their backends reply in one of three observed
//! shapes: an already-structured map, a content-block list whose first
//! element carries a `text` field, or a bare string. The text forms hold
//! either strict JSON or a Python-literal rendering of the same structure,
//! optionally inside a fenced code block. The chain below tries each
//! interpretation in a fixed order and reports a `Normalize` error instead
//! of propagating parse faults; the caller decides the fallback.

use super::{literal, Artifact};
use crate::{Error, Result};
use serde_json::{Map, Value};

const CANONICAL_KEYS: [&str; 5] = [
    "mainModule",
    "testModule",
    "dependencies",
    "serviceName",
    "metadata",
];

/// Convert a raw capability reply into a canonical [`Artifact`].
pub fn normalize(raw: &Value) -> Result<Artifact> {
    match raw {
        Value::Object(map) => from_map(map),
        Value::Array(items) => {
            let text = items
                .first()
                .and_then(|block| block.get("text"))
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Error::Normalize(
                        "content list has no text block to parse".to_string(),
                    )
                })?;
            from_text(text)
        }
        Value::String(text) => from_text(text),
        other => Err(Error::Normalize(format!(
            "unsupported reply shape: {}",
            value_kind(other)
        ))),
    }
}

/// Two-step parse of reply text: strict JSON first, Python literal second.
fn from_text(text: &str) -> Result<Artifact> {
    let body = strip_code_fence(text);
    let parsed = serde_json::from_str::<Value>(body)
        .ok()
        .or_else(|| literal::parse(body).ok())
        .ok_or_else(|| {
            Error::Normalize(format!(
                "reply is neither JSON nor a literal structure: {}",
                truncate(body, 120)
            ))
        })?;
    match parsed {
        Value::Object(map) => from_map(&map),
        other => Err(Error::Normalize(format!(
            "parsed reply is not a map: {}",
            value_kind(&other)
        ))),
    }
}

fn from_map(map: &Map<String, Value>) -> Result<Artifact> {
    let main_module = get_str(map, "mainModule", "main_module").ok_or_else(|| {
        Error::Normalize("reply has no mainModule field".to_string())
    })?;

    let mut metadata = map
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    // Unknown keys ride along rather than being dropped.
    for (key, value) in map {
        if !is_canonical_key(key) {
            metadata.insert(key.clone(), value.clone());
        }
    }

    Ok(Artifact {
        main_module,
        test_module: get_str(map, "testModule", "test_module").unwrap_or_default(),
        dependencies: get_string_list(map, "dependencies"),
        service_name: get_str(map, "serviceName", "service_name").unwrap_or_default(),
        metadata,
    })
}

fn is_canonical_key(key: &str) -> bool {
    CANONICAL_KEYS.contains(&key)
        || matches!(key, "main_module" | "test_module" | "service_name")
}

fn get_str(map: &Map<String, Value>, key: &str, alias: &str) -> Option<String> {
    map.get(key)
        .or_else(|| map.get(alias))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn get_string_list(map: &Map<String, Value>, key: &str) -> Vec<String> {
    map.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Unwrap ```json ... ``` (or bare ```) fences around a payload.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest
        .split_once('\n')
        .map(|(_lang, body)| body)
        .unwrap_or(rest);
    rest.rsplit_once("```")
        .map(|(body, _)| body.trim())
        .unwrap_or(trimmed)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let cut: String = text.chars().take(limit).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Artifact {
        Artifact {
            main_module: "def handle(event):\n    return event\n".to_string(),
            test_module: "def test_handle():\n    assert handle(1) == 1\n".to_string(),
            dependencies: vec!["fastapi".to_string(), "pytest".to_string()],
            service_name: "event_router".to_string(),
            metadata: Map::new(),
        }
    }

    #[test]
    fn structured_map_round_trips() {
        let artifact = sample();
        let normalized = normalize(&artifact.to_value()).unwrap();
        assert_eq!(normalized, artifact);
    }

    #[test]
    fn content_list_round_trips() {
        let artifact = sample();
        let wire = json!([{ "type": "text", "text": artifact.to_value().to_string() }]);
        assert_eq!(normalize(&wire).unwrap(), artifact);
    }

    #[test]
    fn bare_literal_string_round_trips() {
        let artifact = sample();
        let literal_text = format!(
            "{{'mainModule': {main:?}, 'testModule': {test:?}, 'dependencies': ['fastapi', 'pytest'], 'serviceName': 'event_router'}}",
            main = artifact.main_module,
            test = artifact.test_module,
        );
        assert_eq!(normalize(&json!(literal_text)).unwrap(), artifact);
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let text = format!("```json\n{}\n```", sample().to_value());
        assert_eq!(normalize(&json!(text)).unwrap(), sample());
    }

    #[test]
    fn snake_case_keys_are_accepted() {
        let wire = json!({
            "main_module": "code",
            "test_module": "tests",
            "service_name": "svc",
            "dependencies": ["pytest"],
        });
        let artifact = normalize(&wire).unwrap();
        assert_eq!(artifact.main_module, "code");
        assert_eq!(artifact.service_name, "svc");
    }

    #[test]
    fn unknown_keys_are_preserved_in_metadata() {
        let wire = json!({
            "mainModule": "code",
            "apiEndpoints": ["/health"],
            "metadata": { "generator": "v2" },
        });
        let artifact = normalize(&wire).unwrap();
        assert_eq!(artifact.metadata["apiEndpoints"], json!(["/health"]));
        assert_eq!(artifact.metadata["generator"], json!("v2"));
    }

    #[test]
    fn missing_main_module_is_a_normalize_error() {
        let err = normalize(&json!({ "testModule": "tests" })).unwrap_err();
        assert!(matches!(err, Error::Normalize(_)));
    }

    #[test]
    fn prose_reply_is_a_normalize_error() {
        let err = normalize(&json!("Sure! Here is the implementation you asked for."))
            .unwrap_err();
        assert!(matches!(err, Error::Normalize(_)));
    }

    #[test]
    fn empty_content_list_is_a_normalize_error() {
        assert!(matches!(
            normalize(&json!([])).unwrap_err(),
            Error::Normalize(_)
        ));
    }
}
