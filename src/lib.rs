//! # Crucible
//!
//! An orchestration engine for iterative, feedback-driven development: a
//! behavioral specification seeds a generate → test → analyze → refine
//! loop in which pluggable capability providers are invoked through one
//! uniform tool protocol and a 0-100 quality score decides convergence.
//!
//! ## Usage
//!
//! ```bash
//! crucible run spec.yaml [--target 85] [-n 5] [--package]
//! ```
//!
//! ## Modules
//!
//! - `protocol` - Tool invocation envelope, per-provider registries, hosts
//! - `artifact` - Canonical artifact record and response normalization
//! - `scoring` - Pure quality scorer with a configurable weight table
//! - `cycle` - The iteration engine, history, and cycle summary
//! - `capability` - Generation, testing, analysis, and packaging providers
//! - `spec` - Behavioral specification model and validation
//! - `config` - Layered settings (defaults, TOML file, environment)
//! - `context` - Request-scoped correlation context
//! - `testkit` - Scripted providers for tests

pub mod artifact;
pub mod capability;
pub mod config;
pub mod context;
pub mod cycle;
pub mod error;
pub mod protocol;
pub mod scoring;
pub mod spec;

pub mod testkit;

pub use error::{Error, Result};
