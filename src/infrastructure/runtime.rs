//! Container runtime trait and the request/response types it exchanges.
//!
//! Everything the stage executors need from a container daemon goes through
//! [`ContainerRuntime`], so any backend implementing it is substitutable.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Failure of a single container runtime call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed: {reason}")]
pub struct RuntimeError {
    /// Runtime operation that failed (`create`, `start`, `inspect`, ...).
    pub operation: &'static str,
    /// Message reported by the runtime.
    pub reason: String,
}

impl RuntimeError {
    /// Creates a runtime error for `operation`.
    pub fn new(operation: &'static str, reason: impl Into<String>) -> Self {
        Self {
            operation,
            reason: reason.into(),
        }
    }
}

/// Result alias for runtime calls
pub type RuntimeResult<T = ()> = Result<T, RuntimeError>;

/// Combined stdout/stderr of an attached container
pub type OutputStream = BoxStream<'static, RuntimeResult<Vec<u8>>>;

/// Everything needed to create a stage container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name
    pub name: String,
    /// Image reference
    pub image: String,
    /// Working directory inside the container
    pub working_dir: Option<String>,
    /// Entrypoint command
    pub cmd: Vec<String>,
    /// `KEY=value` assignments
    pub env: Vec<String>,
    /// `source:target` bind mounts (host paths or volume names)
    pub binds: Vec<String>,
    /// Allocate a TTY and capture stdout/stderr
    pub tty: bool,
}

/// Snapshot of a container's state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerState {
    /// Whether the container is still running
    pub running: bool,
    /// Exit code, meaningful once `running` is false
    pub exit_code: i64,
}

/// An image build request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageBuild {
    /// Tar archive of the build context
    pub context: Vec<u8>,
    /// Dockerfile path relative to the context root
    pub dockerfile: String,
    /// Tags to apply to the resulting image
    pub tags: Vec<String>,
}

/// Container runtime capabilities used by stage execution
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Short runtime name for diagnostics
    fn name(&self) -> &str;

    /// Checks the daemon answers
    async fn ping(&self) -> RuntimeResult;

    /// Creates a container and returns its id
    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String>;

    /// Extracts a tar archive into `dir` inside the container
    async fn upload_archive(&self, id: &str, dir: &str, archive: Vec<u8>) -> RuntimeResult;

    /// Returns a tar archive of `path` inside the container
    async fn download_archive(&self, id: &str, path: &str) -> RuntimeResult<Vec<u8>>;

    /// Attaches to the container output
    async fn attach(&self, id: &str) -> RuntimeResult<OutputStream>;

    /// Starts the container
    async fn start(&self, id: &str) -> RuntimeResult;

    /// Stops the container; stopping a stopped container is not an error
    async fn stop(&self, id: &str) -> RuntimeResult;

    /// Removes the container, optionally with its anonymous volumes
    async fn remove(&self, id: &str, remove_volumes: bool) -> RuntimeResult;

    /// Reports the container state
    async fn inspect(&self, id: &str) -> RuntimeResult<ContainerState>;

    /// Lists volume names matching `name`
    async fn list_volumes(&self, name: &str) -> RuntimeResult<Vec<String>>;

    /// Creates a named volume and returns its name
    async fn create_volume(&self, name: &str) -> RuntimeResult<String>;

    /// Builds an image, forwarding the build log to stdout
    async fn build_image(&self, build: ImageBuild) -> RuntimeResult;

    /// Pushes `tag`, to `registry` when given
    async fn push_image(&self, tag: &str, registry: Option<&str>) -> RuntimeResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_error_display() {
        let err = RuntimeError::new("create", "no such image");
        assert_eq!(err.to_string(), "create failed: no such image");
    }

    #[test]
    fn test_container_state_default_is_stopped() {
        let state = ContainerState::default();
        assert!(!state.running);
        assert_eq!(state.exit_code, 0);
    }
}
