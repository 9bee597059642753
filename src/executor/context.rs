//! Shared state of one pipeline run

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use super::cache::CacheVolumeResolver;
use crate::infrastructure::{Config, ContainerRuntime};
use crate::pipeline::{PipelineError, StashStore};

/// Host environment lookup used for `$NAME` env values
pub type HostEnv = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Everything a stage needs while it runs
pub struct ExecContext {
    /// Container runtime driving every stage
    pub runtime: Arc<dyn ContainerRuntime>,

    /// Artifacts handed from one stage to the next
    pub stash: StashStore,

    /// Cache volume names, resolved once per path
    pub volumes: CacheVolumeResolver,

    /// Runtime settings
    pub config: Config,

    host_env: HostEnv,
    cancel: watch::Sender<bool>,
}

impl ExecContext {
    /// Creates a context reading `$NAME` values from the process environment
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: Config) -> Self {
        Self {
            runtime,
            stash: StashStore::new(),
            volumes: CacheVolumeResolver::new(config.volume_prefix.clone()),
            config,
            host_env: Arc::new(|name| std::env::var(name).ok()),
            cancel: watch::channel(false).0,
        }
    }

    /// Replaces the host environment lookup
    #[must_use]
    pub fn with_host_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.host_env = Arc::new(lookup);
        self
    }

    /// Value of the host variable `name`
    pub fn host_var(&self, name: &str) -> Option<String> {
        (self.host_env)(name)
    }

    /// Asks the running stage to stop. Its container is still cleaned up
    /// and no further stage starts.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Returns true once [`cancel`](Self::cancel) has been called
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once the run is cancelled
    pub async fn cancelled(&self) {
        let mut cancelled = self.cancel.subscribe();
        if cancelled.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Runs `work` unless the run is cancelled first.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Interrupted`] when cancelled, otherwise the
    /// result of `work`.
    pub async fn until_cancelled<T, F>(&self, work: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        tokio::select! {
            result = work => result,
            () = self.cancelled() => Err(PipelineError::Interrupted),
        }
    }
}

impl fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecContext")
            .field("runtime", &self.runtime.name())
            .field("stash", &self.stash)
            .field("volumes", &self.volumes)
            .field("config", &self.config)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
