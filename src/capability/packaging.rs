//! Packaging capability
//!
//! Renders container artifacts for a finished implementation. Only invoked
//! after a cycle succeeds; a packaging failure never affects the cycle
//! outcome.

use super::PACKAGING_HOST;
use crate::artifact::Artifact;
use crate::protocol::{tool_handler, CapabilityHost};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

#[async_trait]
pub trait Packager: Send + Sync {
    async fn dockerfile(&self, artifact: &Artifact) -> Result<String>;
    async fn compose(&self, artifact: &Artifact) -> Result<String>;
}

/// Straightforward single-stage container recipe: non-root user, pinned
/// workdir, dependencies installed ahead of the source copy for layer
/// caching.
#[derive(Default)]
pub struct ContainerPackager;

#[async_trait]
impl Packager for ContainerPackager {
    async fn dockerfile(&self, artifact: &Artifact) -> Result<String> {
        let requirements = if artifact.dependencies.is_empty() {
            String::new()
        } else {
            format!(
                "RUN pip install --no-cache-dir {}\n",
                artifact.dependencies.join(" ")
            )
        };
        Ok(format!(
            "FROM python:3.12-slim\n\
             WORKDIR /app\n\
             RUN useradd --create-home appuser\n\
             {requirements}\
             COPY main.py test_main.py ./\n\
             USER appuser\n\
             CMD [\"python\", \"main.py\"]\n"
        ))
    }

    async fn compose(&self, artifact: &Artifact) -> Result<String> {
        let service = if artifact.service_name.is_empty() {
            "app"
        } else {
            &artifact.service_name
        };
        Ok(format!(
            "services:\n\
             \x20 {service}:\n\
             \x20   build: .\n\
             \x20   restart: unless-stopped\n\
             \x20   ports:\n\
             \x20     - \"8000:8000\"\n"
        ))
    }
}

/// Build the packaging host over the given packager.
pub fn host(packager: Arc<dyn Packager>) -> Result<CapabilityHost> {
    let mut host = CapabilityHost::new(PACKAGING_HOST, env!("CARGO_PKG_VERSION"));
    let artifact_schema = json!({
        "type": "object",
        "properties": { "artifact": { "type": "object" } },
        "required": ["artifact"],
    });

    {
        let packager = Arc::clone(&packager);
        host.registry_mut().register(
            "generate_dockerfile",
            "Render a container build recipe for an artifact",
            artifact_schema.clone(),
            tool_handler(move |args| {
                let packager = Arc::clone(&packager);
                async move {
                    let artifact = artifact_arg(&args)?;
                    Ok(Value::String(packager.dockerfile(&artifact).await?))
                }
            }),
        )?;
    }

    {
        let packager = Arc::clone(&packager);
        host.registry_mut().register(
            "generate_compose",
            "Render a compose file for an artifact",
            artifact_schema,
            tool_handler(move |args| {
                let packager = Arc::clone(&packager);
                async move {
                    let artifact = artifact_arg(&args)?;
                    Ok(Value::String(packager.compose(&artifact).await?))
                }
            }),
        )?;
    }

    Ok(host)
}

fn artifact_arg(args: &serde_json::Map<String, Value>) -> Result<Artifact> {
    let value = args
        .get("artifact")
        .ok_or_else(|| Error::Tool("missing 'artifact' argument".to_string()))?;
    serde_json::from_value(value.clone())
        .map_err(|e| Error::Tool(format!("malformed artifact: {e}")))
}
