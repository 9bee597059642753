//! `polka check` - Validate a pipeline file
//!
//! Loads the pipeline exactly as `run` would, without touching the container
//! runtime, and renders the stage listing in execution order.
//!
//! ```bash
//! polka check -f docker-pipeline.yml
//! # #0 :: 0:build:Command:maven:3.3.3-jdk-8::cmds[mvn package]
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use polka::pipeline::parse_file;

/// Loads `file` and returns its stage listing, or its JSON form when `json` is set.
pub fn check_pipeline(file: &Path, json: bool) -> Result<String> {
    tracing::debug!("Validating pipeline: {}", file.display());

    let pipeline = parse_file(file)
        .with_context(|| format!("Invalid pipeline: {}", file.display()))?;

    if json {
        serde_json::to_string_pretty(&pipeline).context("Failed to serialize pipeline")
    } else {
        Ok(pipeline.to_string().trim_end().to_string())
    }
}
