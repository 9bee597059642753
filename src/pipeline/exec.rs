//! Execution units attached to stages
//!
//! Every stage carries exactly one [`Exec`] variant, selected when the
//! pipeline is loaded from whichever field the stage declares.

#![allow(clippy::must_use_candidate)]

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{PipelineError, ValidationError};
use super::stage::Stage;
use crate::executor::{ExecContext, StageDriver, image};

/// Prefix marking an env value as a reference to a host variable
pub const HOST_ENV_SIGIL: char = '$';

/// What a stage does when it runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Exec {
    /// Run shell commands inside a container
    Command(Command),
    /// Build an image
    Build(Build),
    /// Push images to a registry
    Push(Push),
}

impl Exec {
    /// Runs this unit of work for `stage`.
    ///
    /// # Errors
    ///
    /// Returns the first runtime, cache, stash or exit-code failure; the
    /// caller aborts the pipeline on any error.
    pub async fn run(&self, ctx: &ExecContext, stage: &Stage) -> Result<(), PipelineError> {
        match self {
            Self::Command(command) => StageDriver::new(ctx, stage, command).run().await,
            Self::Build(build) => ctx.until_cancelled(image::build(ctx, stage, build)).await,
            Self::Push(push) => ctx.until_cancelled(image::push(ctx, stage, push)).await,
        }
    }

    /// Human-readable rendering, as used in the pipeline listing
    pub fn render(&self) -> String {
        self.to_string()
    }

    pub(crate) fn validate(&self, stage: &str) -> Result<(), ValidationError> {
        match self {
            Self::Command(command) => {
                if command.image.is_empty() {
                    return Err(ValidationError::EmptyImage {
                        stage: stage.to_string(),
                    });
                }
                if let Some((name, _)) = command.stash.iter().find(|(_, path)| path.is_empty()) {
                    return Err(ValidationError::EmptyStashPath {
                        stage: stage.to_string(),
                        name: name.clone(),
                    });
                }
            }
            Self::Build(Build { tags, .. }) | Self::Push(Push { tags, .. }) => {
                if tags.is_empty() {
                    return Err(ValidationError::NoTags {
                        stage: stage.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Exec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(command) => command.fmt(f),
            Self::Build(build) => build.fmt(f),
            Self::Push(push) => push.fmt(f),
        }
    }
}

/// Shell commands run in a container built from `image`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Image reference
    pub image: String,
    /// Command lines, in execution order
    pub commands: Vec<String>,
    /// Environment; a value starting with `$` names a host variable
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Container paths persisted across runs in cache volumes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cached: Vec<String>,
    /// Interpreter name; the configured default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    /// `hostPath:containerPath` bind, or a plain container working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    /// Stash name -> container path, saved after a successful run
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stash: BTreeMap<String, String>,
    /// Stashes restored into the working directory before the run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unstash: Vec<String>,
}

/// Working directory resolution of a [`Command`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workdir {
    /// Working directory inside the container
    pub container_dir: Option<String>,
    /// `absoluteHostPath:containerDir` bind mount, when requested
    pub bind: Option<String>,
}

impl Command {
    /// Builds `KEY=value` assignments, replacing `$NAME` values with the
    /// host value of `NAME` as returned by `lookup` (empty when unset).
    pub fn resolve_env<F>(&self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.env
            .iter()
            .map(|(key, value)| match value.strip_prefix(HOST_ENV_SIGIL) {
                Some(host_var) => format!("{key}={}", lookup(host_var).unwrap_or_default()),
                None => format!("{key}={value}"),
            })
            .collect()
    }

    /// Splits `workdir` into the container directory and an optional bind.
    ///
    /// # Errors
    ///
    /// Fails when the host side cannot be made absolute.
    pub fn resolve_workdir(&self) -> std::io::Result<Workdir> {
        let Some(spec) = self.workdir.as_deref().filter(|w| !w.is_empty()) else {
            return Ok(Workdir::default());
        };

        match spec.find(':') {
            Some(i) if i > 0 => {
                let host = std::path::absolute(Path::new(&spec[..i]))?;
                let container_dir = &spec[i + 1..];
                Ok(Workdir {
                    container_dir: Some(container_dir.to_string()),
                    bind: Some(format!("{}:{container_dir}", host.display())),
                })
            }
            _ => Ok(Workdir {
                container_dir: Some(spec.to_string()),
                bind: None,
            }),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Command:{}:{}:cmds[{}]",
            self.image,
            self.shell.as_deref().unwrap_or_default(),
            self.commands.join(",")
        )?;

        if !self.env.is_empty() {
            let env: Vec<String> = self.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
            write!(f, ":env[{}]", env.join(","))?;
        }

        if !self.cached.is_empty() {
            write!(f, ":cached[{}]", self.cached.join(","))?;
        }

        Ok(())
    }
}

/// Builds an image from a Dockerfile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    /// Tags applied to the built image
    pub tags: Vec<String>,
    /// Dockerfile path, relative to the context
    pub dockerfile: String,
    /// Build context directory
    pub context: String,
}

impl fmt::Display for Build {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Build:{}:{}:tags[{}]",
            self.dockerfile,
            self.context,
            self.tags.join(",")
        )
    }
}

/// Pushes tagged images
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Push {
    /// Tags to push, in order
    pub tags: Vec<String>,
    /// Destination registry; the tag's own registry when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
}

impl fmt::Display for Push {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Push:{}:tags[{}]",
            self.registry.as_deref().unwrap_or_default(),
            self.tags.join(",")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn command(image: &str, commands: &[&str]) -> Command {
        Command {
            image: image.to_string(),
            commands: commands.iter().map(ToString::to_string).collect(),
            ..Command::default()
        }
    }

    #[test]
    fn test_command_render_minimal() {
        let exec = Exec::Command(command("img1", &["run1"]));
        assert_eq!(exec.render(), "Command:img1::cmds[run1]");
    }

    #[test]
    fn test_command_render_full() {
        let mut cmd = command("maven:3.3.3-jdk-8", &["echo hello", "mvn -version"]);
        cmd.shell = Some("sh".to_string());
        cmd.env.insert("B".to_string(), "$HOME".to_string());
        cmd.env.insert("A".to_string(), "1".to_string());
        cmd.cached = vec!["/root/.m2".to_string(), "/cache".to_string()];

        assert_eq!(
            cmd.to_string(),
            "Command:maven:3.3.3-jdk-8:sh:cmds[echo hello,mvn -version]:env[A=1,B=$HOME]:cached[/root/.m2,/cache]"
        );
    }

    #[test]
    fn test_command_render_omits_stash_clauses() {
        let mut cmd = command("img", &["make"]);
        cmd.stash.insert("bin".to_string(), "/out".to_string());
        cmd.unstash.push("src".to_string());
        assert_eq!(cmd.to_string(), "Command:img::cmds[make]");
    }

    #[test]
    fn test_build_and_push_render() {
        let build = Exec::Build(Build {
            tags: vec!["app:1".to_string(), "app:latest".to_string()],
            dockerfile: "Dockerfile".to_string(),
            context: ".".to_string(),
        });
        assert_eq!(build.render(), "Build:Dockerfile:.:tags[app:1,app:latest]");

        let push = Exec::Push(Push {
            tags: vec!["app:1".to_string()],
            registry: Some("registry.local:5000".to_string()),
        });
        assert_eq!(push.render(), "Push:registry.local:5000:tags[app:1]");
    }

    #[test]
    fn test_resolve_env_indirection() {
        let mut cmd = command("img", &[]);
        cmd.env.insert("TOKEN".to_string(), "$CI_TOKEN".to_string());
        cmd.env.insert("MODE".to_string(), "release".to_string());
        cmd.env.insert("MISSING".to_string(), "$NOT_SET".to_string());

        let env = cmd.resolve_env(|name| (name == "CI_TOKEN").then(|| "s3cr3t".to_string()));
        assert_eq!(env, vec!["MISSING=", "MODE=release", "TOKEN=s3cr3t"]);
    }

    #[test]
    fn test_resolve_env_empty_value_is_literal() {
        let mut cmd = command("img", &[]);
        cmd.env.insert("EMPTY".to_string(), String::new());
        assert_eq!(cmd.resolve_env(|_| None), vec!["EMPTY="]);
    }

    #[test]
    fn test_resolve_workdir_bind() {
        let mut cmd = command("img", &[]);
        cmd.workdir = Some(".:/work".to_string());

        let workdir = cmd.resolve_workdir().unwrap();
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(workdir.container_dir.as_deref(), Some("/work"));
        let bind = workdir.bind.unwrap();
        assert!(bind.ends_with(":/work"));
        assert!(Path::new(bind.trim_end_matches(":/work")).is_absolute());
        assert!(bind.starts_with(&cwd.display().to_string()));
    }

    #[test]
    fn test_resolve_workdir_plain_directory() {
        let mut cmd = command("img", &[]);
        cmd.workdir = Some("/src".to_string());

        let workdir = cmd.resolve_workdir().unwrap();
        assert_eq!(workdir.container_dir.as_deref(), Some("/src"));
        assert!(workdir.bind.is_none());
    }

    #[test]
    fn test_resolve_workdir_unset() {
        let cmd = command("img", &[]);
        assert_eq!(cmd.resolve_workdir().unwrap(), Workdir::default());
    }

    #[test]
    fn test_validate_rejects_missing_tags() {
        let push = Exec::Push(Push {
            tags: vec![],
            registry: None,
        });
        assert!(matches!(
            push.validate("publish"),
            Err(ValidationError::NoTags { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_stash_path() {
        let mut cmd = command("img", &["make"]);
        cmd.stash.insert("bin".to_string(), String::new());
        assert!(matches!(
            Exec::Command(cmd).validate("build"),
            Err(ValidationError::EmptyStashPath { .. })
        ));
    }
}
