//! Current control-plane state, as a set of natural keys.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use switchyard_core::NaturalKey;

/// Errors reading or writing a state file.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Resources known to exist in the control plane, identified by natural key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentState {
    #[serde(default)]
    applied: BTreeSet<NaturalKey>,
}

impl CurrentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keys(keys: impl IntoIterator<Item = NaturalKey>) -> Self {
        Self {
            applied: keys.into_iter().collect(),
        }
    }

    pub fn contains(&self, key: &NaturalKey) -> bool {
        self.applied.contains(key)
    }

    /// Record a key. Returns `false` if it was already present.
    pub fn record(&mut self, key: NaturalKey) -> bool {
        self.applied.insert(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &NaturalKey> {
        self.applied.iter()
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    /// Load a JSON state file. A missing file is an empty state.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "State file not found, assuming empty state");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StateError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }
}

impl Extend<NaturalKey> for CurrentState {
    fn extend<T: IntoIterator<Item = NaturalKey>>(&mut self, iter: T) {
        self.applied.extend(iter);
    }
}

impl FromIterator<NaturalKey> for CurrentState {
    fn from_iter<T: IntoIterator<Item = NaturalKey>>(iter: T) -> Self {
        Self::from_keys(iter)
    }
}
