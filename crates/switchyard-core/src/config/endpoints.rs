//! Discovered endpoint URLs.
//!
//! Service URLs only exist after a deployment, so they live in a separate
//! file (`endpoints.yaml` by default) that the deployment step appends to and
//! that is overlaid onto the inline `services` section when the topology is
//! loaded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::ConfigError;

/// Contents of an endpoints file: service name to base URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointsFile {
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
}

impl EndpointsFile {
    /// Load an endpoints file. A missing file is an empty file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Endpoints file not found, starting empty");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Resolve `endpoints_file` relative to `base_dir` unless it is absolute.
    pub fn resolve_path(endpoints_file: impl AsRef<Path>, base_dir: impl AsRef<Path>) -> PathBuf {
        let endpoints_file = endpoints_file.as_ref();
        if endpoints_file.is_absolute() {
            endpoints_file.to_path_buf()
        } else {
            base_dir.as_ref().join(endpoints_file)
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// Record (or replace) the URL for a service.
    pub fn record(&mut self, service: impl Into<String>, base_url: impl Into<String>) -> Option<String> {
        self.endpoints.insert(service.into(), base_url.into())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }
}
