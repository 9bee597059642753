//! In-memory container runtime for tests

use std::collections::BTreeSet;

use ahash::AHashMap;
use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;

use crate::infrastructure::{
    Config, ContainerRuntime, ContainerSpec, ContainerState, ImageBuild, OutputStream,
    RuntimeError, RuntimeResult,
};

/// Config with a 1ms poll interval
pub(crate) fn test_config() -> Config {
    Config {
        poll_interval_ms: 1,
        ..Config::default()
    }
}

#[derive(Debug)]
struct Container {
    spec: ContainerSpec,
    polls_left: usize,
    removed: bool,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<&'static str>,
    containers: AHashMap<String, Container>,
    created: Vec<ContainerSpec>,
    uploads: Vec<(String, Vec<u8>)>,
    volumes: BTreeSet<String>,
    builds: Vec<ImageBuild>,
    pushes: Vec<(String, Option<String>)>,
}

/// Records every call; containers exit after a scripted number of polls
#[derive(Debug, Default)]
pub(crate) struct FakeRuntime {
    state: Mutex<State>,
    failures: BTreeSet<String>,
    exit_codes: AHashMap<String, i64>,
    archives: AHashMap<String, Vec<u8>>,
    output: Vec<RuntimeResult<Vec<u8>>>,
    running_polls: usize,
}

impl FakeRuntime {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fails `operation`, or only `operation:argument` when an argument is given
    pub(crate) fn fail_on(mut self, operation: &str) -> Self {
        self.failures.insert(operation.to_string());
        self
    }

    /// Exit code of containers whose image or name is `key`
    pub(crate) fn with_exit_code(mut self, key: &str, code: i64) -> Self {
        self.exit_codes.insert(key.to_string(), code);
        self
    }

    /// Content returned when downloading `path`
    pub(crate) fn with_archive(mut self, path: &str, content: &[u8]) -> Self {
        self.archives.insert(path.to_string(), content.to_vec());
        self
    }

    /// Chunks emitted on the attached output stream
    pub(crate) fn with_output(mut self, chunk: &str) -> Self {
        self.output.push(Ok(chunk.as_bytes().to_vec()));
        self
    }

    /// A failing read on the attached output stream
    pub(crate) fn with_output_error(mut self, reason: &str) -> Self {
        self.output.push(Err(RuntimeError::new("attach", reason)));
        self
    }

    /// Number of inspections reporting a running container before it stops
    pub(crate) fn with_running_polls(mut self, polls: usize) -> Self {
        self.running_polls = polls;
        self
    }

    pub(crate) fn add_volume(&self, name: &str) {
        self.state.lock().volumes.insert(name.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    pub(crate) fn count_calls(&self, operation: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| **call == operation)
            .count()
    }

    pub(crate) fn created(&self) -> Vec<ContainerSpec> {
        self.state.lock().created.clone()
    }

    pub(crate) fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.state.lock().uploads.clone()
    }

    pub(crate) fn volumes(&self) -> Vec<String> {
        self.state.lock().volumes.iter().cloned().collect()
    }

    pub(crate) fn builds(&self) -> Vec<ImageBuild> {
        self.state.lock().builds.clone()
    }

    pub(crate) fn pushes(&self) -> Vec<(String, Option<String>)> {
        self.state.lock().pushes.clone()
    }

    /// Containers created and not yet removed
    pub(crate) fn live_containers(&self) -> usize {
        self.state
            .lock()
            .containers
            .values()
            .filter(|c| !c.removed)
            .count()
    }

    fn record(&self, operation: &'static str, argument: &str) -> RuntimeResult {
        self.state.lock().calls.push(operation);
        if self.failures.contains(operation)
            || self.failures.contains(&format!("{operation}:{argument}"))
        {
            return Err(RuntimeError::new(operation, format!("injected failure ({argument})")));
        }
        Ok(())
    }

    fn exit_code(&self, spec: &ContainerSpec) -> i64 {
        self.exit_codes
            .get(&spec.name)
            .or_else(|| self.exit_codes.get(&spec.image))
            .copied()
            .unwrap_or(0)
    }

    fn with_container<T>(
        &self,
        operation: &'static str,
        id: &str,
        f: impl FnOnce(&mut Container) -> T,
    ) -> RuntimeResult<T> {
        let mut state = self.state.lock();
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| RuntimeError::new(operation, format!("no such container: {id}")))?;
        Ok(f(container))
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn name(&self) -> &str {
        "fake"
    }

    async fn ping(&self) -> RuntimeResult {
        self.record("ping", "")
    }

    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String> {
        self.record("create_container", &spec.name)?;
        let mut state = self.state.lock();
        let id = format!("ctr-{}", state.created.len() + 1);
        state.created.push(spec.clone());
        state.containers.insert(
            id.clone(),
            Container {
                spec: spec.clone(),
                polls_left: self.running_polls,
                removed: false,
            },
        );
        Ok(id)
    }

    async fn upload_archive(&self, id: &str, dir: &str, archive: Vec<u8>) -> RuntimeResult {
        self.record("upload_archive", dir)?;
        self.with_container("upload_archive", id, |_| ())?;
        self.state.lock().uploads.push((dir.to_string(), archive));
        Ok(())
    }

    async fn download_archive(&self, id: &str, path: &str) -> RuntimeResult<Vec<u8>> {
        self.record("download_archive", path)?;
        self.with_container("download_archive", id, |_| ())?;
        self.archives
            .get(path)
            .cloned()
            .ok_or_else(|| RuntimeError::new("download_archive", format!("no such path: {path}")))
    }

    async fn attach(&self, id: &str) -> RuntimeResult<OutputStream> {
        self.record("attach", id)?;
        self.with_container("attach", id, |_| ())?;
        Ok(Box::pin(stream::iter(self.output.clone())))
    }

    async fn start(&self, id: &str) -> RuntimeResult {
        self.record("start", id)?;
        self.with_container("start", id, |_| ())
    }

    async fn stop(&self, id: &str) -> RuntimeResult {
        self.record("stop", id)?;
        self.with_container("stop", id, |c| c.polls_left = 0)
    }

    async fn remove(&self, id: &str, _remove_volumes: bool) -> RuntimeResult {
        self.record("remove", id)?;
        self.with_container("remove", id, |c| c.removed = true)
    }

    async fn inspect(&self, id: &str) -> RuntimeResult<ContainerState> {
        self.record("inspect", id)?;
        let (running, spec) = self.with_container("inspect", id, |c| {
            let running = c.polls_left > 0;
            c.polls_left = c.polls_left.saturating_sub(1);
            (running, c.spec.clone())
        })?;
        Ok(ContainerState {
            running,
            exit_code: if running { 0 } else { self.exit_code(&spec) },
        })
    }

    async fn list_volumes(&self, name: &str) -> RuntimeResult<Vec<String>> {
        self.record("list_volumes", name)?;
        Ok(self
            .state
            .lock()
            .volumes
            .iter()
            .filter(|volume| *volume == name)
            .cloned()
            .collect())
    }

    async fn create_volume(&self, name: &str) -> RuntimeResult<String> {
        self.record("create_volume", name)?;
        self.state.lock().volumes.insert(name.to_string());
        Ok(name.to_string())
    }

    async fn build_image(&self, build: ImageBuild) -> RuntimeResult {
        self.record("build_image", &build.tags.join(" "))?;
        self.state.lock().builds.push(build);
        Ok(())
    }

    async fn push_image(&self, tag: &str, registry: Option<&str>) -> RuntimeResult {
        self.record("push_image", tag)?;
        self.state
            .lock()
            .pushes
            .push((tag.to_string(), registry.map(str::to_string)));
        Ok(())
    }
}
