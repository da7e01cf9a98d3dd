//! Generation capability
//!
//! Wraps an opaque completion backend behind the `generate_implementation`
//! and `refine_implementation` tools. Replies are returned raw; the
//! normalizer downstream absorbs whatever shape the backend produced.
//! Results are cached by a content hash of the request with a max-age
//! check on every read, so repeated identical requests within one session
//! do not re-invoke the backend.

use super::GENERATION_HOST;
use crate::config::GenerationSettings;
use crate::protocol::{tool_handler, CapabilityHost};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// An opaque completion capability: structured prompt in, free-form text
/// out. Implementations decide everything else.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Runs a configured external command per completion. The prompt is
/// written to stdin and the reply read from stdout, so any CLI that speaks
/// that contract can serve as the backend.
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
}

impl CommandBackend {
    pub fn new(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::Config("backend command is empty".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait]
impl Backend for CommandBackend {
    fn name(&self) -> &str {
        &self.program
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Backend(format!("failed to spawn {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| Error::Backend(format!("failed to write prompt: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::Backend(format!("backend did not exit cleanly: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Backend(format!(
                "{} exited with {:?}: {}",
                self.program,
                output.status.code(),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Deterministic offline backend: renders a minimal structurally valid
/// artifact straight from the prompt. Used when no external command is
/// configured, and as the safety net in demos.
#[derive(Default)]
pub struct TemplateBackend;

#[async_trait]
impl Backend for TemplateBackend {
    fn name(&self) -> &str {
        "template"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let service = prompt
            .lines()
            .find_map(|line| line.strip_prefix("Service name: "))
            .unwrap_or("generated_service")
            .trim();
        let artifact = crate::artifact::fallback_artifact(service);
        Ok(artifact.to_value().to_string())
    }
}

struct CacheEntry {
    reply: String,
    inserted_at: Instant,
}

/// Explicit, owned response cache keyed by a content hash of the request
/// arguments. Stale entries are evicted on read; the oldest entry is
/// evicted when capacity is reached.
pub struct GenerationCache {
    max_age: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl GenerationCache {
    pub fn new(max_age: Duration, capacity: usize) -> Self {
        Self {
            max_age,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn key(arguments: &Map<String, Value>) -> String {
        let canonical = Value::Object(arguments.clone()).to_string();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let fresh = match entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() <= self.max_age,
            None => return None,
        };
        if !fresh {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|entry| entry.reply.clone())
    }

    pub fn store(&self, key: String, reply: String) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                reply,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the generation host over the given backend.
pub fn host(
    backend: Arc<dyn Backend>,
    settings: &GenerationSettings,
) -> Result<CapabilityHost> {
    let cache = Arc::new(GenerationCache::new(
        Duration::from_secs(settings.cache_max_age_secs),
        settings.cache_capacity,
    ));
    let mut host = CapabilityHost::new(GENERATION_HOST, env!("CARGO_PKG_VERSION"));

    {
        let backend = Arc::clone(&backend);
        let cache = Arc::clone(&cache);
        host.registry_mut().register(
            "generate_implementation",
            "Generate an initial implementation from a behavioral specification",
            json!({
                "type": "object",
                "properties": {
                    "specification": { "type": "object" },
                },
                "required": ["specification"],
            }),
            tool_handler(move |args| {
                let backend = Arc::clone(&backend);
                let cache = Arc::clone(&cache);
                async move {
                    let prompt = generation_prompt(&args)?;
                    complete_cached(backend.as_ref(), &cache, &args, &prompt).await
                }
            }),
        )?;
    }

    {
        let backend = Arc::clone(&backend);
        let cache = Arc::clone(&cache);
        host.registry_mut().register(
            "refine_implementation",
            "Refine an implementation using failing tests and analysis findings",
            json!({
                "type": "object",
                "properties": {
                    "previousArtifact": { "type": "object" },
                    "testFailures": { "type": "array" },
                    "qualityIssues": { "type": "array" },
                    "suggestions": { "type": "array" },
                    "targetScore": { "type": "integer" },
                },
                "required": ["previousArtifact"],
            }),
            tool_handler(move |args| {
                let backend = Arc::clone(&backend);
                let cache = Arc::clone(&cache);
                async move {
                    let prompt = refinement_prompt(&args)?;
                    complete_cached(backend.as_ref(), &cache, &args, &prompt).await
                }
            }),
        )?;
    }

    Ok(host)
}

async fn complete_cached(
    backend: &dyn Backend,
    cache: &GenerationCache,
    args: &Map<String, Value>,
    prompt: &str,
) -> Result<Value> {
    let key = GenerationCache::key(args);
    if let Some(cached) = cache.get(&key) {
        debug!(backend = backend.name(), "generation cache hit");
        return Ok(Value::String(cached));
    }
    let reply = backend.complete(prompt).await?;
    cache.store(key, reply.clone());
    Ok(Value::String(reply))
}

const REPLY_CONTRACT: &str = r#"Reply with a single JSON object:
{
  "mainModule": "<implementation source>",
  "testModule": "<test source>",
  "dependencies": ["<package>", ...],
  "serviceName": "<snake_case name>"
}"#;

fn generation_prompt(args: &Map<String, Value>) -> Result<String> {
    let spec = args
        .get("specification")
        .ok_or_else(|| Error::Tool("generate_implementation needs a specification".to_string()))?;
    let name = spec
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("generated_service");
    let scenarios = spec.get("scenarios").cloned().unwrap_or(Value::Array(vec![]));
    let constraints = spec
        .get("constraints")
        .cloned()
        .unwrap_or(Value::Object(Map::new()));

    Ok(format!(
        "You are an expert developer. Implement the behavior described by these scenarios.\n\
         Service name: {name}\n\n\
         SCENARIOS:\n{scenarios}\n\n\
         CONSTRAINTS:\n{constraints}\n\n\
         Write a complete implementation and a matching test module. Every scenario must be\n\
         covered by at least one test. Do not leave placeholder bodies.\n\n\
         {REPLY_CONTRACT}\n",
        scenarios = serde_json::to_string_pretty(&scenarios)?,
        constraints = serde_json::to_string_pretty(&constraints)?,
    ))
}

fn refinement_prompt(args: &Map<String, Value>) -> Result<String> {
    let previous = args
        .get("previousArtifact")
        .ok_or_else(|| Error::Tool("refine_implementation needs previousArtifact".to_string()))?;
    let main_module = previous
        .get("mainModule")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let test_module = previous
        .get("testModule")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let service = previous
        .get("serviceName")
        .and_then(Value::as_str)
        .unwrap_or("generated_service");
    let failures = args.get("testFailures").cloned().unwrap_or(Value::Array(vec![]));
    let issues = args.get("qualityIssues").cloned().unwrap_or(Value::Array(vec![]));
    let suggestions = args.get("suggestions").cloned().unwrap_or(Value::Array(vec![]));
    let target = args
        .get("targetScore")
        .and_then(Value::as_u64)
        .unwrap_or(80);

    Ok(format!(
        "You are an expert developer. Refine this implementation while preserving its behavior.\n\
         Service name: {service}\n\n\
         CURRENT IMPLEMENTATION:\n{main_module}\n\n\
         CURRENT TESTS:\n{test_module}\n\n\
         TEST FAILURES TO ADDRESS:\n{failures}\n\n\
         QUALITY ISSUES TO FIX:\n{issues}\n\n\
         SUGGESTIONS:\n{suggestions}\n\n\
         TARGET QUALITY SCORE: {target}/100\n\n\
         Fix every failure, address the issues, and keep the tests in sync with any interface\n\
         change.\n\n\
         {REPLY_CONTRACT}\n",
        failures = serde_json::to_string_pretty(&failures)?,
        issues = serde_json::to_string_pretty(&issues)?,
        suggestions = serde_json::to_string_pretty(&suggestions)?,
    ))
}
