//! Image build and push stages

use std::io;
use std::path::PathBuf;

use tracing::info;

use super::context::ExecContext;
use crate::infrastructure::ImageBuild;
use crate::pipeline::{Build, PipelineError, Push, Stage};

/// Builds the image described by `build`, tagging it with every tag.
///
/// # Errors
///
/// Returns [`PipelineError::Io`] when the build context cannot be archived
/// and [`PipelineError::Runtime`] when the runtime rejects the build.
pub async fn build(ctx: &ExecContext, stage: &Stage, build: &Build) -> Result<(), PipelineError> {
    println!(" build image {}", build.tags.join(" "));

    let context = archive_context(PathBuf::from(&build.context)).await?;
    info!(
        stage = %stage.name,
        context = %build.context,
        bytes = context.len(),
        "Build context archived"
    );

    ctx.runtime
        .build_image(ImageBuild {
            context,
            dockerfile: build.dockerfile.clone(),
            tags: build.tags.clone(),
        })
        .await
        .map_err(PipelineError::runtime(stage.name.as_str()))
}

/// Pushes every tag of `push` in order, stopping at the first failure.
///
/// # Errors
///
/// Returns [`PipelineError::Runtime`] for the first tag the runtime fails
/// to push; remaining tags are skipped.
pub async fn push(ctx: &ExecContext, stage: &Stage, push: &Push) -> Result<(), PipelineError> {
    for tag in &push.tags {
        match &push.registry {
            Some(registry) => println!(" push {tag} to {registry}"),
            None => println!(" push {tag}"),
        }
        ctx.runtime
            .push_image(tag, push.registry.as_deref())
            .await
            .map_err(PipelineError::runtime(stage.name.as_str()))?;
    }
    Ok(())
}

/// Tars the context directory off the async threads
async fn archive_context(dir: PathBuf) -> Result<Vec<u8>, PipelineError> {
    let archive = tokio::task::spawn_blocking(move || -> io::Result<Vec<u8>> {
        let mut builder = tar::Builder::new(Vec::new());
        builder.follow_symlinks(false);
        builder.append_dir_all(".", &dir)?;
        builder.into_inner()
    })
    .await
    .map_err(|e| PipelineError::Io(e.to_string()))?;

    Ok(archive?)
}
