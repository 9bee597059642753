//! Pipeline loader
//!
//! Reads a YAML mapping of `stage name -> stage spec`. Stage order is the
//! position of each entry in the source mapping.
//!
//! ```yaml
//! project: demo
//! build:
//!   image: maven:3.3.3-jdk-8
//!   commands:
//!     - mvn package
//! image:
//!   build: demo/app:latest
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use serde_yaml::Value;

use super::errors::ConfigError;
use super::exec::{Build, Command, Exec, Push};
use super::pipeline_def::Pipeline;
use super::stage::Stage;
use super::types::Validate;

/// Top-level key holding the project identifier instead of a stage
const PROJECT_KEY: &str = "project";

/// Raw fields a stage may declare
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct StageSpec {
    // Command
    image: String,
    commands: Vec<String>,
    env: BTreeMap<String, String>,
    cached: Vec<String>,
    shell: Option<String>,
    workdir: Option<String>,
    stash: BTreeMap<String, String>,
    unstash: Vec<String>,

    // Build
    build: String,
    dockerfile: Option<String>,
    context: Option<String>,

    // Push
    push: String,
    registry: Option<String>,
}

impl StageSpec {
    fn into_exec(self, stage: &str) -> Result<Exec, ConfigError> {
        let declared = (
            !self.image.trim().is_empty(),
            !self.build.trim().is_empty(),
            !self.push.trim().is_empty(),
        );

        match declared {
            (true, false, false) => Ok(Exec::Command(Command {
                image: self.image,
                commands: self.commands,
                env: self.env,
                cached: self.cached,
                shell: self.shell.filter(|s| !s.is_empty()),
                workdir: self.workdir,
                stash: self.stash,
                unstash: self.unstash,
            })),
            (false, true, false) => Ok(Exec::Build(Build {
                tags: split_tags(&self.build),
                dockerfile: self.dockerfile.unwrap_or_else(|| "Dockerfile".to_string()),
                context: self.context.unwrap_or_else(|| ".".to_string()),
            })),
            (false, false, true) => Ok(Exec::Push(Push {
                tags: split_tags(&self.push),
                registry: self.registry.filter(|r| !r.is_empty()),
            })),
            (false, false, false) => Err(ConfigError::NoExec {
                stage: stage.to_string(),
            }),
            _ => Err(ConfigError::AmbiguousExec {
                stage: stage.to_string(),
            }),
        }
    }
}

fn split_tags(tags: &str) -> Vec<String> {
    tags.split_whitespace().map(str::to_string).collect()
}

/// Parses pipeline source bytes.
///
/// # Errors
///
/// Returns a [`ConfigError`] when the source is not a YAML mapping of
/// stages, a stage selects no or several execution kinds, a stage fails
/// validation, or a stage name repeats.
pub fn parse(source: &[u8]) -> Result<Pipeline, ConfigError> {
    let document: Value =
        serde_yaml::from_slice(source).map_err(|e| ConfigError::Malformed(e.to_string()))?;

    let entries = match document {
        Value::Null => return Ok(Pipeline::default()),
        Value::Mapping(entries) => entries,
        _ => {
            return Err(ConfigError::Malformed(
                "expected a mapping of stage names to stage definitions".to_string(),
            ));
        }
    };

    let mut project = None;
    let mut stages = Vec::with_capacity(entries.len());

    for (key, value) in entries {
        let Some(name) = key.as_str().map(str::to_string) else {
            return Err(ConfigError::Malformed(format!(
                "stage names must be strings, got {key:?}"
            )));
        };

        if name == PROJECT_KEY {
            if let Value::String(id) = value {
                project = Some(id);
                continue;
            }
        }

        if value.is_null() {
            return Err(ConfigError::NoExec { stage: name });
        }

        let spec: StageSpec = serde_yaml::from_value(value)
            .map_err(|e| ConfigError::Malformed(format!("stage '{name}': {e}")))?;
        let exec = spec.into_exec(&name)?;
        stages.push(Stage::new(stages.len(), name, exec));
    }

    let pipeline = Pipeline::new(project, stages);
    pipeline.validate()?;

    tracing::debug!(stages = pipeline.stage_count(), "Pipeline loaded");
    Ok(pipeline)
}

/// Reads and parses a pipeline file.
///
/// # Errors
///
/// Returns [`ConfigError::Read`] when the file cannot be read, or any
/// error [`parse`] reports.
pub fn parse_file(path: &Path) -> Result<Pipeline, ConfigError> {
    let source = std::fs::read(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse(&source)
}

impl FromStr for Pipeline {
    type Err = ConfigError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        parse(source.as_bytes())
    }
}
