//! Prelude module for common imports

pub use crate::executor::{ExecContext, StageDriver};
pub use crate::infrastructure::{Config, ContainerRuntime, DockerRuntime, init_logging};
pub use crate::pipeline::{
    Build, Command, ConfigError, Exec, Pipeline, PipelineError, Push, Stage, Validate, parse,
    parse_file,
};
