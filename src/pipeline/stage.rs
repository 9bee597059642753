//! Stage type
//!
//! A stage is one ordered unit of pipeline work: a name, its position in the
//! source file and the execution unit it runs.

#![allow(clippy::must_use_candidate)]

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Validate;
use super::errors::ValidationError;
use super::exec::Exec;

/// Longest accepted stage name
pub const MAX_STAGE_NAME: usize = 100;

/// A stage in a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Position in declaration order, starting at 0
    pub order: usize,

    /// Stage name, unique within its pipeline
    pub name: String,

    /// What the stage runs
    pub exec: Exec,
}

impl Stage {
    /// Creates a stage
    pub fn new(order: usize, name: impl Into<String>, exec: Exec) -> Self {
        Self {
            order,
            name: name.into(),
            exec,
        }
    }

    /// Deterministic container name derived from the stage name
    pub fn container_name(&self) -> String {
        let sanitized: String = self
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("stage_{sanitized}")
    }
}

impl Validate for Stage {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName);
        }

        if self.name.len() > MAX_STAGE_NAME {
            return Err(ValidationError::NameTooLong {
                max: MAX_STAGE_NAME,
                len: self.name.len(),
            });
        }

        self.exec.validate(&self.name)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.order, self.name, self.exec)
    }
}
