//! # polka - container pipelines described in YAML
//!
//! A pipeline is an ordered list of named stages. Each stage runs exactly one
//! execution unit:
//!
//! - **Command**: shell commands executed by a generated script inside a fresh
//!   container, with optional cache volumes and stash hand-off between stages
//! - **Build**: an image built from a Dockerfile and a context directory
//! - **Push**: tagged images pushed to a registry
//!
//! Stages run strictly in declaration order and the first failure stops the
//! pipeline.
//!
//! ## Example
//!
//! ```yaml
//! build:
//!   image: maven:3.3.3-jdk-8
//!   cached: [/root/.m2]
//!   commands:
//!     - mvn package
//! image:
//!   build: shop/api:1.0 shop/api:latest
//! publish:
//!   push: shop/api:1.0
//!   registry: registry.example.com
//! ```
//!
//! ```no_run
//! use std::sync::Arc;
//! use polka::prelude::*;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let pipeline = parse_file("docker-pipeline.yml".as_ref())?;
//! let runtime = DockerRuntime::connect(None)?;
//! let ctx = ExecContext::new(Arc::new(runtime), Config::default());
//! pipeline.run(&ctx).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod executor;
pub mod infrastructure;
pub mod pipeline;

// Prelude module for common imports
pub mod prelude;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use executor::{CacheVolumeResolver, ExecContext, StageDriver};
pub use infrastructure::{Config, ContainerRuntime, DockerRuntime, RuntimeError};
pub use pipeline::{
    Build, Command, ConfigError, Exec, Pipeline, PipelineError, Push, Stage, StashError,
    StashStore, Validate, ValidationError,
};

/// Version of the polka crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
