//! Command stage lifecycle
//!
//! Drives one container from creation to removal:
//!
//! ```text
//! Created -> VolumesResolved -> ContainerCreated -> ScriptUploaded
//!         -> StreamAttached -> Started -> Running (polled)
//!         -> Stopped{Success|Failed} -> Removed
//! ```
//!
//! Removal is owned by [`ContainerGuard`]: the driver releases it explicitly
//! on every return path, including a cancelled run (see
//! [`ExecContext::cancel`]). Dropping an unreleased guard (a panicking stage)
//! still schedules the stop and remove on the runtime.

use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::context::ExecContext;
use super::script::{SCRIPT_NAME, script_archive};
use crate::infrastructure::{ContainerRuntime, ContainerSpec, OutputStream, RuntimeError};
use crate::pipeline::{Command, PipelineError, Stage};

/// Runs a [`Command`] stage in a fresh container
#[derive(Debug)]
pub struct StageDriver<'a> {
    ctx: &'a ExecContext,
    stage: &'a Stage,
    command: &'a Command,
}

impl<'a> StageDriver<'a> {
    /// Creates a driver for `command`, the execution unit of `stage`
    #[must_use]
    pub fn new(ctx: &'a ExecContext, stage: &'a Stage, command: &'a Command) -> Self {
        Self {
            ctx,
            stage,
            command,
        }
    }

    /// Runs the stage to completion and removes its container.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::StageFailed`] when the container exits
    /// nonzero, [`PipelineError::Interrupted`] when the run is cancelled, or
    /// the first runtime, cache, stash or IO error hit while setting the
    /// container up. Cleanup failures are logged only.
    pub async fn run(&self) -> Result<(), PipelineError> {
        let spec = self.container_spec().await?;

        let id = self
            .ctx
            .runtime
            .create_container(&spec)
            .await
            .map_err(self.runtime_error())?;
        println!(" run stage in {id}");

        let guard = ContainerGuard::new(Arc::clone(&self.ctx.runtime), id);
        let outcome = self.ctx.until_cancelled(self.drive(guard.id())).await;
        guard.release().await;
        outcome
    }

    /// Environment, binds and entrypoint of the stage container
    async fn container_spec(&self) -> Result<ContainerSpec, PipelineError> {
        let env = self.command.resolve_env(|name| self.ctx.host_var(name));
        let workdir = self.command.resolve_workdir()?;

        let mut binds: Vec<String> = workdir.bind.into_iter().collect();
        for path in &self.command.cached {
            let volume = self
                .ctx
                .volumes
                .resolve(self.ctx.runtime.as_ref(), path)
                .await?;
            info!(stage = %self.stage.name, volume = %volume, path = %path, "Mounting cache volume");
            binds.push(format!("{volume}:{path}"));
        }

        Ok(ContainerSpec {
            name: self.stage.container_name(),
            image: self.command.image.clone(),
            working_dir: workdir.container_dir,
            cmd: vec![self.script_path()],
            env,
            binds,
            tty: true,
        })
    }

    fn script_path(&self) -> String {
        let dir = self.ctx.config.script_dir.trim_end_matches('/');
        format!("{dir}/{SCRIPT_NAME}")
    }

    fn shell(&self) -> &str {
        self.command
            .shell
            .as_deref()
            .unwrap_or(&self.ctx.config.default_shell)
    }

    async fn drive(&self, id: &str) -> Result<(), PipelineError> {
        let runtime = self.ctx.runtime.as_ref();

        let script = script_archive(self.shell(), &self.command.commands)?;
        runtime
            .upload_archive(id, &self.ctx.config.script_dir, script)
            .await
            .map_err(self.runtime_error())?;

        self.restore_stashes(id).await?;

        let output = runtime.attach(id).await.map_err(self.runtime_error())?;
        spawn_output_copy(self.stage.name.clone(), output);

        runtime.start(id).await.map_err(self.runtime_error())?;
        debug!(stage = %self.stage.name, container = %id, "Container started");

        let exit_code = self.wait(id).await?;
        if exit_code != 0 {
            println!("[FAILURE] stage {} exited with code {exit_code}", self.stage.name);
            return Err(PipelineError::StageFailed {
                stage: self.stage.name.clone(),
                exit_code,
            });
        }

        self.save_stashes(id).await
    }

    /// Polls until the container stops and returns its exit code
    async fn wait(&self, id: &str) -> Result<i64, PipelineError> {
        let interval = self.ctx.config.poll_interval();
        loop {
            tokio::time::sleep(interval).await;
            let state = self
                .ctx
                .runtime
                .inspect(id)
                .await
                .map_err(self.runtime_error())?;
            if !state.running {
                return Ok(state.exit_code);
            }
        }
    }

    async fn restore_stashes(&self, id: &str) -> Result<(), PipelineError> {
        let target = self
            .command
            .resolve_workdir()?
            .container_dir
            .unwrap_or_else(|| "/".to_string());

        for name in &self.command.unstash {
            let archive = self.ctx.stash.unstash(name)?;
            self.ctx
                .runtime
                .upload_archive(id, &target, archive)
                .await
                .map_err(self.runtime_error())?;
            debug!(stage = %self.stage.name, stash = %name, target = %target, "Restored stash");
        }
        Ok(())
    }

    async fn save_stashes(&self, id: &str) -> Result<(), PipelineError> {
        for (name, path) in &self.command.stash {
            let archive = self
                .ctx
                .runtime
                .download_archive(id, path)
                .await
                .map_err(self.runtime_error())?;
            self.ctx.stash.stash(name.as_str(), archive);
        }
        Ok(())
    }

    fn runtime_error(&self) -> impl FnOnce(RuntimeError) -> PipelineError {
        PipelineError::runtime(self.stage.name.as_str())
    }
}

/// Copies container output to stdout until the stream closes.
///
/// The task is detached: stage success never waits on it, and copy errors
/// are logged at warn level.
fn spawn_output_copy(stage: String, mut output: OutputStream) {
    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(chunk) = output.next().await {
            let written = match chunk {
                Ok(bytes) => stdout.write_all(&bytes).await,
                Err(err) => {
                    warn!(stage = %stage, error = %err, "Container output stream failed");
                    break;
                }
            };
            if let Err(err) = written {
                warn!(stage = %stage, error = %err, "Cannot forward container output");
                break;
            }
        }
        if let Err(err) = stdout.flush().await {
            warn!(stage = %stage, error = %err, "Cannot flush container output");
        }
    });
}

/// Stops and removes a container when released or dropped
pub struct ContainerGuard {
    runtime: Arc<dyn ContainerRuntime>,
    id: String,
    released: bool,
}

impl ContainerGuard {
    /// Takes ownership of the cleanup of container `id`
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, id: String) -> Self {
        Self {
            runtime,
            id,
            released: false,
        }
    }

    /// Container id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stops and removes the container, volumes included
    pub async fn release(mut self) {
        self.released = true;
        cleanup(self.runtime.as_ref(), &self.id).await;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(container = %self.id, "No async runtime left, container not removed");
            return;
        };

        let runtime = Arc::clone(&self.runtime);
        let id = std::mem::take(&mut self.id);
        handle.spawn(async move {
            cleanup(runtime.as_ref(), &id).await;
        });
    }
}

async fn cleanup(runtime: &dyn ContainerRuntime, id: &str) {
    if let Err(err) = runtime.stop(id).await {
        warn!(container = %id, error = %err, "Cannot stop container");
    }
    if let Err(err) = runtime.remove(id, true).await {
        warn!(container = %id, error = %err, "Cannot remove container");
    }
    debug!(container = %id, "Container removed");
}
