//! Pipeline definition and sequential execution

#![allow(clippy::must_use_candidate)]

use std::collections::HashSet;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::errors::{ConfigError, PipelineError};
use super::stage::Stage;
use super::types::Validate;
use crate::executor::ExecContext;

/// An ordered sequence of stages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PipelineParts")]
pub struct Pipeline {
    /// Project identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    stages: Vec<Stage>,
}

impl Pipeline {
    /// Creates a pipeline; stages are kept sorted by their `order`.
    pub fn new(project: Option<String>, mut stages: Vec<Stage>) -> Self {
        stages.sort_by_key(|stage| stage.order);
        Self { project, stages }
    }

    /// Stages in ascending `order`
    pub fn stages(&self) -> impl ExactSizeIterator<Item = &Stage> + Clone {
        self.stages.iter()
    }

    /// Looks a stage up by name
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    /// Returns number of stages
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Runs every stage in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that did not succeed; later
    /// stages are not started. A cancelled run returns
    /// [`PipelineError::Interrupted`] once the current stage is cleaned up.
    pub async fn run(&self, ctx: &ExecContext) -> Result<(), PipelineError> {
        tracing::info!(
            project = %self.project.as_deref().unwrap_or("unnamed"),
            stages = self.stages.len(),
            "Starting pipeline"
        );

        for stage in self.stages() {
            if ctx.is_cancelled() {
                tracing::warn!(stage = %stage.name, "Run cancelled, skipping remaining stages");
                return Err(PipelineError::Interrupted);
            }

            println!("-----------------------------------------");
            println!(" Stage: {}", stage.name);
            println!("-----------------------------------------");

            let start = Instant::now();
            if let Err(err) = stage.exec.run(ctx, stage).await {
                tracing::error!(stage = %stage.name, error = %err, "Stage failed, stopping pipeline");
                return Err(err);
            }
            tracing::info!(
                stage = %stage.name,
                duration_ms = start.elapsed().as_millis(),
                "Stage completed"
            );
        }

        Ok(())
    }
}

/// Serialized form of a [`Pipeline`], re-sorted and validated on the way in
#[derive(Deserialize)]
struct PipelineParts {
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    stages: Vec<Stage>,
}

impl TryFrom<PipelineParts> for Pipeline {
    type Error = ConfigError;

    fn try_from(parts: PipelineParts) -> Result<Self, Self::Error> {
        let pipeline = Self::new(parts.project, parts.stages);
        pipeline.validate()?;
        Ok(pipeline)
    }
}

impl Validate for Pipeline {
    type Error = ConfigError;

    fn validate(&self) -> Result<(), Self::Error> {
        // YAML sources never get here with a repeated key (the parser rejects
        // it first); this catches pipelines built in code or from JSON.
        let mut seen = HashSet::new();
        for stage in &self.stages {
            stage.validate()?;
            if !seen.insert(stage.name.as_str()) {
                return Err(ConfigError::DuplicateStage {
                    stage: stage.name.clone(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, stage) in self.stages().enumerate() {
            writeln!(f, "#{index} :: {stage}")?;
        }
        Ok(())
    }
}
