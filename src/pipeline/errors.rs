//! Error types for pipeline domain

use thiserror::Error;

use crate::infrastructure::RuntimeError;

/// Errors that can occur while running a pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The pipeline definition could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A container runtime call failed while driving a stage
    #[error("Stage '{stage}': {source}")]
    Runtime {
        /// Name of the stage being executed.
        stage: String,
        /// Underlying runtime failure.
        #[source]
        source: RuntimeError,
    },

    /// A cache volume could not be listed or created
    #[error("Cache volume for '{path}' unavailable: {source}")]
    Cache {
        /// Cache path being resolved.
        path: String,
        /// Underlying runtime failure.
        #[source]
        source: RuntimeError,
    },

    /// The stage container ran to completion with a nonzero exit code
    #[error("Stage {stage} didn't complete (exit code {exit_code})")]
    StageFailed {
        /// Name of the stage that failed.
        stage: String,
        /// Exit code reported by the container.
        exit_code: i64,
    },

    /// The run was cancelled; the current stage's container was removed
    #[error("Pipeline interrupted")]
    Interrupted,

    /// Stash lookup failed
    #[error(transparent)]
    Stash(#[from] StashError),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl PipelineError {
    /// Wraps a runtime failure with the name of the stage it occurred in.
    pub fn runtime(stage: impl Into<String>) -> impl FnOnce(RuntimeError) -> Self {
        let stage = stage.into();
        move |source| Self::Runtime { stage, source }
    }

    /// Returns true when the error is a stage that ran and exited nonzero
    #[must_use]
    pub fn is_stage_failure(&self) -> bool {
        matches!(self, Self::StageFailed { .. })
    }
}

/// Errors produced while turning source bytes into a pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The source is not valid YAML or does not match the stage schema
    #[error("Malformed pipeline source: {0}")]
    Malformed(String),

    /// A stage declares none of `image`, `build` or `push`
    #[error("Stage '{stage}' has nothing to execute: set one of image, build or push")]
    NoExec {
        /// Name of the stage.
        stage: String,
    },

    /// A stage declares more than one of `image`, `build` or `push`
    #[error("Stage '{stage}' is ambiguous: only one of image, build or push may be set")]
    AmbiguousExec {
        /// Name of the stage.
        stage: String,
    },

    /// The same stage name appears twice
    #[error("Duplicate stage name: '{stage}'")]
    DuplicateStage {
        /// Name of the repeated stage.
        stage: String,
    },

    /// A stage failed validation
    #[error("Invalid stage: {0}")]
    Validation(#[from] ValidationError),

    /// The pipeline file could not be read
    #[error("Cannot read '{path}': {reason}")]
    Read {
        /// Path of the file.
        path: String,
        /// OS error message.
        reason: String,
    },
}

/// Validation errors for pipeline components
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Name cannot be empty
    #[error("Name cannot be empty")]
    EmptyName,

    /// Name too long
    #[error("Name too long: max {max} characters, got {len}")]
    NameTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length of the name.
        len: usize,
    },

    /// Command stage without an image
    #[error("Stage '{stage}' must name an image")]
    EmptyImage {
        /// Name of the stage.
        stage: String,
    },

    /// Build or push stage without any tag
    #[error("Stage '{stage}' must declare at least one tag")]
    NoTags {
        /// Name of the stage.
        stage: String,
    },

    /// Stash target without a container path
    #[error("Stash '{name}' in stage '{stage}' has no path")]
    EmptyStashPath {
        /// Name of the stage.
        stage: String,
        /// Name of the stash entry.
        name: String,
    },
}

/// Errors from the stash store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StashError {
    /// Nothing was stashed under this name
    #[error("No stash named {name}")]
    NotFound {
        /// The missing key.
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failed_message_names_stage() {
        let err = PipelineError::StageFailed {
            stage: "build".to_string(),
            exit_code: 2,
        };
        assert_eq!(err.to_string(), "Stage build didn't complete (exit code 2)");
        assert!(err.is_stage_failure());
    }

    #[test]
    fn test_runtime_error_wrapping() {
        let err = PipelineError::runtime("test")(RuntimeError::new("start", "boom"));
        assert!(matches!(err, PipelineError::Runtime { ref stage, .. } if stage == "test"));
        assert!(!err.is_stage_failure());
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_stash_error_display() {
        let err = StashError::NotFound {
            name: "jar".to_string(),
        };
        assert_eq!(err.to_string(), "No stash named jar");
    }
}
