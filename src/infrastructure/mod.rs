//! Infrastructure layer
//!
//! This module contains the container runtime adapter, configuration and logging.

mod config;
pub mod docker;
mod logging;
pub mod runtime;

pub use config::Config;
pub use docker::DockerRuntime;
pub use logging::init_logging;
pub use runtime::{
    ContainerRuntime, ContainerSpec, ContainerState, ImageBuild, OutputStream, RuntimeError,
    RuntimeResult,
};
