//! Docker runtime
//!
//! Implements [`ContainerRuntime`] against the Docker Engine API.

use std::collections::HashMap;
use std::pin::pin;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    DownloadFromContainerOptions, InspectContainerOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions, UploadToContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::{BuildImageOptions, CreateImageOptions, PushImageOptions, TagImageOptions};
use bollard::models::HostConfig;
use bollard::volume::{CreateVolumeOptions, ListVolumesOptions};
use bollard::{API_DEFAULT_VERSION, Docker};
use futures::StreamExt;
use hyper::Body;
use tracing::{debug, info};
use url::Url;

use super::runtime::{
    ContainerRuntime, ContainerSpec, ContainerState, ImageBuild, OutputStream, RuntimeError,
    RuntimeResult,
};

/// Request timeout; stages may legitimately stream output for a long time.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Container runtime backed by a Docker daemon
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects to the daemon at `host` (`unix://`, `tcp://` or `http://`),
    /// or to the local defaults (honouring `DOCKER_HOST`) when `None`.
    ///
    /// # Errors
    ///
    /// Returns a [`RuntimeError`] when the address is invalid or the client
    /// cannot be constructed.
    pub fn connect(host: Option<&str>) -> RuntimeResult<Self> {
        let docker = match host {
            None => Docker::connect_with_local_defaults(),
            Some(host) => {
                let url = Url::parse(host).map_err(|e| RuntimeError::new("connect", e.to_string()))?;
                match url.scheme() {
                    "unix" => Docker::connect_with_unix(url.path(), 120, API_DEFAULT_VERSION),
                    "tcp" | "http" => Docker::connect_with_http(host, 120, API_DEFAULT_VERSION),
                    other => {
                        return Err(RuntimeError::new(
                            "connect",
                            format!("unsupported docker host scheme '{other}'"),
                        ));
                    }
                }
            }
        }
        .map_err(failed("connect"))?;

        Ok(Self {
            docker: docker.with_timeout(REQUEST_TIMEOUT),
        })
    }

    async fn pull(&self, image: &str) -> RuntimeResult {
        let (repo, tag) = split_image_reference(image);
        info!(image = %image, "Pulling image");

        let options = CreateImageOptions {
            from_image: repo,
            tag,
            ..Default::default()
        };
        let mut progress = pin!(self.docker.create_image(Some(options), None, None));
        while let Some(update) = progress.next().await {
            let update = update.map_err(failed("pull"))?;
            if let Some(error) = update.error {
                return Err(RuntimeError::new("pull", error));
            }
        }
        Ok(())
    }

    async fn tag(&self, source: &str, target: &str) -> RuntimeResult {
        let (repo, tag) = split_image_reference(target);
        debug!(source = %source, target = %target, "Tagging image");
        self.docker
            .tag_image(source, Some(TagImageOptions { repo, tag }))
            .await
            .map_err(failed("tag"))
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String, DockerError> {
        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };
        let config = Config {
            image: Some(spec.image.clone()),
            tty: Some(spec.tty),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            working_dir: spec.working_dir.clone(),
            cmd: Some(spec.cmd.clone()),
            env: Some(spec.env.clone()),
            host_config: Some(HostConfig {
                binds: Some(spec.binds.clone()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let created = self.docker.create_container(Some(options), config).await?;
        Ok(created.id)
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    async fn ping(&self) -> RuntimeResult {
        self.docker.ping().await.map(|_| ()).map_err(failed("ping"))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String> {
        match self.create(spec).await {
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                self.pull(&spec.image).await?;
                self.create(spec).await.map_err(failed("create"))
            }
            other => other.map_err(failed("create")),
        }
    }

    async fn upload_archive(&self, id: &str, dir: &str, archive: Vec<u8>) -> RuntimeResult {
        let options = UploadToContainerOptions {
            path: dir.to_string(),
            ..Default::default()
        };
        self.docker
            .upload_to_container(id, Some(options), Body::from(archive))
            .await
            .map_err(failed("copy"))
    }

    async fn download_archive(&self, id: &str, path: &str) -> RuntimeResult<Vec<u8>> {
        let options = DownloadFromContainerOptions {
            path: path.to_string(),
        };
        let mut chunks = pin!(self.docker.download_from_container(id, Some(options)));
        let mut archive = Vec::new();
        while let Some(chunk) = chunks.next().await {
            archive.extend_from_slice(&chunk.map_err(failed("download"))?);
        }
        Ok(archive)
    }

    async fn attach(&self, id: &str) -> RuntimeResult<OutputStream> {
        let options = AttachContainerOptions::<String> {
            stream: Some(true),
            stdout: Some(true),
            stderr: Some(true),
            ..Default::default()
        };
        let AttachContainerResults { output, .. } = self
            .docker
            .attach_container(id, Some(options))
            .await
            .map_err(failed("attach"))?;

        Ok(output
            .map(|chunk| chunk.map(log_bytes).map_err(failed("attach")))
            .boxed())
    }

    async fn start(&self, id: &str) -> RuntimeResult {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(failed("start"))
    }

    async fn stop(&self, id: &str) -> RuntimeResult {
        match self.docker.stop_container(id, None).await {
            // 304: already stopped
            Err(DockerError::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            other => other.map_err(failed("stop")),
        }
    }

    async fn remove(&self, id: &str, remove_volumes: bool) -> RuntimeResult {
        let options = RemoveContainerOptions {
            v: remove_volumes,
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(failed("remove"))
    }

    async fn inspect(&self, id: &str) -> RuntimeResult<ContainerState> {
        let response = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(failed("inspect"))?;
        let state = response
            .state
            .ok_or_else(|| RuntimeError::new("inspect", "container reported no state"))?;

        Ok(ContainerState {
            running: state.running.unwrap_or(false),
            exit_code: state.exit_code.unwrap_or(0),
        })
    }

    async fn list_volumes(&self, name: &str) -> RuntimeResult<Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert("name", vec![name]);
        let response = self
            .docker
            .list_volumes(Some(ListVolumesOptions { filters }))
            .await
            .map_err(failed("list volumes"))?;

        // the daemon's name filter matches substrings
        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|volume| volume.name)
            .filter(|found| found == name)
            .collect())
    }

    async fn create_volume(&self, name: &str) -> RuntimeResult<String> {
        let options = CreateVolumeOptions {
            name: name.to_string(),
            driver: "local".to_string(),
            ..Default::default()
        };
        self.docker
            .create_volume(options)
            .await
            .map(|volume| volume.name)
            .map_err(failed("create volume"))
    }

    async fn build_image(&self, build: ImageBuild) -> RuntimeResult {
        let Some((first, others)) = build.tags.split_first() else {
            return Err(RuntimeError::new("build", "no tag given"));
        };

        let options = BuildImageOptions {
            dockerfile: build.dockerfile.clone(),
            t: first.clone(),
            rm: true,
            ..Default::default()
        };
        let mut log = pin!(self.docker.build_image(
            options,
            None,
            Some(Body::from(build.context))
        ));
        while let Some(info) = log.next().await {
            let info = info.map_err(failed("build"))?;
            if let Some(error) = info.error {
                return Err(RuntimeError::new("build", error));
            }
            if let Some(line) = info.stream {
                print!("{line}");
            }
        }

        for tag in others {
            self.tag(first, tag).await?;
        }
        Ok(())
    }

    async fn push_image(&self, tag: &str, registry: Option<&str>) -> RuntimeResult {
        let target = match registry {
            Some(registry) => {
                let target = format!("{}/{}", registry.trim_end_matches('/'), tag);
                self.tag(tag, &target).await?;
                target
            }
            None => tag.to_string(),
        };

        let (repo, tag) = split_image_reference(&target);
        let mut progress = pin!(
            self.docker
                .push_image(repo, Some(PushImageOptions { tag }), None)
        );
        while let Some(info) = progress.next().await {
            let info = info.map_err(failed("push"))?;
            if let Some(error) = info.error {
                return Err(RuntimeError::new("push", error));
            }
            if let Some(status) = info.status {
                debug!(image = %target, status = %status, "Push progress");
            }
        }
        Ok(())
    }
}

fn failed(operation: &'static str) -> impl Fn(DockerError) -> RuntimeError {
    move |err| RuntimeError::new(operation, err.to_string())
}

fn log_bytes(output: LogOutput) -> Vec<u8> {
    match output {
        LogOutput::StdOut { message }
        | LogOutput::StdErr { message }
        | LogOutput::StdIn { message }
        | LogOutput::Console { message } => message.to_vec(),
    }
}

/// Splits `repo[:tag]` into repository and tag, defaulting the tag to `latest`.
/// A `:` inside the registry host part is not a tag separator.
fn split_image_reference(reference: &str) -> (&str, &str) {
    let name_start = reference.rfind('/').map_or(0, |i| i + 1);
    match reference[name_start..].rfind(':') {
        Some(i) => (
            &reference[..name_start + i],
            &reference[name_start + i + 1..],
        ),
        None => (reference, "latest"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_image_reference_with_tag() {
        assert_eq!(
            split_image_reference("maven:3.3.3-jdk-8"),
            ("maven", "3.3.3-jdk-8")
        );
    }

    #[test]
    fn test_split_image_reference_defaults_to_latest() {
        assert_eq!(split_image_reference("alpine"), ("alpine", "latest"));
    }

    #[test]
    fn test_split_image_reference_registry_port() {
        assert_eq!(
            split_image_reference("localhost:5000/team/app"),
            ("localhost:5000/team/app", "latest")
        );
        assert_eq!(
            split_image_reference("localhost:5000/team/app:1.2"),
            ("localhost:5000/team/app", "1.2")
        );
    }

    #[test]
    fn test_connect_rejects_unknown_scheme() {
        let err = DockerRuntime::connect(Some("ftp://example.org")).unwrap_err();
        assert_eq!(err.operation, "connect");
    }

    #[test]
    fn test_log_bytes_keeps_payload() {
        let out = LogOutput::StdOut {
            message: "hello\n".into(),
        };
        assert_eq!(log_bytes(out), b"hello\n".to_vec());
    }
}
