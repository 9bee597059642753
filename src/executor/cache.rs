//! Cache volume resolution
//!
//! Each cached container path maps to a named runtime volume that survives
//! between runs. The volume name is derived from a hash of the path, so the
//! same path always lands on the same volume and different paths never share one.

use ahash::AHashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::infrastructure::{ContainerRuntime, RuntimeError};
use crate::pipeline::PipelineError;

/// Maps cache paths to runtime volumes, creating them when absent
#[derive(Debug)]
pub struct CacheVolumeResolver {
    prefix: String,
    resolved: Mutex<AHashMap<String, String>>,
}

impl CacheVolumeResolver {
    /// Creates a resolver naming volumes `<prefix>_cache_<hash>`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            resolved: Mutex::new(AHashMap::new()),
        }
    }

    /// Volume name for `path`
    #[must_use]
    pub fn volume_name(&self, path: &str) -> String {
        let digest = Sha256::digest(path.as_bytes());
        format!("{}_cache_{}", self.prefix, hex::encode(&digest[..8]))
    }

    /// Returns the volume backing `path`, creating it if the runtime has none.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cache`] when the volume can neither be found
    /// nor created.
    pub async fn resolve(
        &self,
        runtime: &dyn ContainerRuntime,
        path: &str,
    ) -> Result<String, PipelineError> {
        if let Some(volume) = self.resolved.lock().get(path) {
            return Ok(volume.clone());
        }

        let name = self.volume_name(path);
        let cache_error = |source: RuntimeError| PipelineError::Cache {
            path: path.to_string(),
            source,
        };

        let existing = runtime.list_volumes(&name).await.map_err(cache_error)?;
        let volume = if let Some(volume) = existing.into_iter().next() {
            debug!(volume = %volume, path = %path, "Reusing cache volume");
            volume
        } else {
            match runtime.create_volume(&name).await {
                Ok(volume) => {
                    info!(volume = %volume, path = %path, "Created cache volume");
                    volume
                }
                // another run may have created it in the meantime
                Err(err) => {
                    warn!(volume = %name, error = %err, "Volume creation failed, checking again");
                    let existing = runtime.list_volumes(&name).await.map_err(cache_error)?;
                    existing.into_iter().next().ok_or_else(|| cache_error(err))?
                }
            }
        };

        self.resolved
            .lock()
            .insert(path.to_string(), volume.clone());
        Ok(volume)
    }
}
