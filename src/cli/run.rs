//! `polka run` - Execute a pipeline

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use polka::executor::ExecContext;
use polka::infrastructure::{Config, ContainerRuntime, DockerRuntime, init_logging};
use polka::pipeline::parse_file;

/// Loads the pipeline and runs it against the configured Docker daemon.
///
/// Returns [`ExitCode::FAILURE`] when a stage fails or the run is
/// interrupted; the failure itself is printed to stderr.
pub async fn run_pipeline(file: &Path, config: Option<&Path>, verbose: bool) -> Result<ExitCode> {
    let mut config = match config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if verbose {
        config.log_level = "debug".to_string();
    }
    init_logging(&config.log_level);

    let pipeline = parse_file(file)
        .with_context(|| format!("Failed to load pipeline: {}", file.display()))?;
    tracing::debug!(pipeline = %pipeline, "Loaded pipeline");

    let runtime = DockerRuntime::connect(config.docker_host.as_deref())
        .context("Failed to create Docker client")?;
    runtime
        .ping()
        .await
        .context("Docker daemon is not reachable")?;

    let ctx = ExecContext::new(Arc::new(runtime), config);
    let run = pipeline.run(&ctx);
    tokio::pin!(run);

    // Ctrl-C cancels the run; the current container is still removed
    let result = tokio::select! {
        result = &mut run => result,
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                eprintln!("Interrupted, cleaning up");
                ctx.cancel();
                run.await
            }
            Err(err) => {
                tracing::warn!(error = %err, "Cannot listen for Ctrl-C");
                run.await
            }
        }
    };

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            eprintln!("{err}");
            Ok(ExitCode::FAILURE)
        }
    }
}
