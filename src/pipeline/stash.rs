//! In-memory stash store
//!
//! Lets a later stage retrieve an artifact produced by an earlier one. One
//! store lives for exactly one pipeline run; entries are never evicted.

use ahash::AHashMap;
use parking_lot::Mutex;

use super::errors::StashError;

/// Keyed blob store shared by all stages of a run
#[derive(Debug, Default)]
pub struct StashStore {
    entries: Mutex<AHashMap<String, Vec<u8>>>,
}

impl StashStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `content` under `name`, replacing any previous value.
    pub fn stash(&self, name: impl Into<String>, content: Vec<u8>) {
        let name = name.into();
        tracing::debug!(stash = %name, bytes = content.len(), "Stashing content");
        self.entries.lock().insert(name, content);
    }

    /// Returns a copy of the content stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StashError::NotFound`] if nothing was stashed under `name`.
    pub fn unstash(&self, name: &str) -> Result<Vec<u8>, StashError> {
        self.entries
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| StashError::NotFound {
                name: name.to_string(),
            })
    }

    /// Number of stashed entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true when nothing has been stashed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
