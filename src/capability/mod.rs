//! Capability providers
//!
//! Each provider builds a [`CapabilityHost`] exposing its operations
//! through the shared invocation envelope. The development cycle only ever
//! talks to hosts; swapping a provider means registering a different
//! implementation, never changing the loop.

pub mod analysis;
pub mod generation;
pub mod packaging;
pub mod testing;

pub use analysis::{Analyzer, AnalyzerConfig, HeuristicAnalyzer};
pub use generation::{Backend, CommandBackend, GenerationCache, TemplateBackend};
pub use packaging::{ContainerPackager, Packager};
pub use testing::{HeuristicHarness, TestHarness};

use crate::config::Settings;
use crate::protocol::CapabilityHost;
use crate::Result;
use std::sync::Arc;

pub const GENERATION_HOST: &str = "generation";
pub const TESTING_HOST: &str = "testing";
pub const ANALYSIS_HOST: &str = "analysis";
pub const PACKAGING_HOST: &str = "packaging";

/// The full set of hosts one development cycle talks to. Hosts are
/// read-only after construction and safe to share across concurrent
/// cycles.
#[derive(Clone)]
pub struct CapabilitySet {
    pub generation: Arc<CapabilityHost>,
    pub testing: Arc<CapabilityHost>,
    pub analysis: Arc<CapabilityHost>,
    pub packaging: Option<Arc<CapabilityHost>>,
}

impl CapabilitySet {
    pub fn new(
        generation: CapabilityHost,
        testing: CapabilityHost,
        analysis: CapabilityHost,
        packaging: Option<CapabilityHost>,
    ) -> Self {
        Self {
            generation: Arc::new(generation),
            testing: Arc::new(testing),
            analysis: Arc::new(analysis),
            packaging: packaging.map(Arc::new),
        }
    }

    /// Wire up the default providers: the configured command backend (or
    /// the deterministic template backend when none is configured), the
    /// heuristic test harness, the heuristic analyzer, and the container
    /// packager.
    pub fn with_defaults(settings: &Settings) -> Result<Self> {
        let backend: Arc<dyn Backend> = match &settings.generation.command {
            Some(command) => Arc::new(CommandBackend::new(command)?),
            None => Arc::new(TemplateBackend::default()),
        };
        let generation = generation::host(backend, &settings.generation)?;
        let testing = testing::host(Arc::new(HeuristicHarness::default()))?;
        let analysis = analysis::host(Arc::new(HeuristicAnalyzer::default()))?;
        let packaging = packaging::host(Arc::new(ContainerPackager::default()))?;
        Ok(Self::new(generation, testing, analysis, Some(packaging)))
    }

    pub fn hosts(&self) -> Vec<&Arc<CapabilityHost>> {
        let mut hosts = vec![&self.generation, &self.testing, &self.analysis];
        if let Some(packaging) = &self.packaging {
            hosts.push(packaging);
        }
        hosts
    }
}
