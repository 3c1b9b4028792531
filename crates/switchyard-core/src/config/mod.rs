//! Configuration types for Switchyard.
//!
//! The topology is described in a single YAML file (`switchyard.yaml`) with an
//! optional overlay of discovered service URLs (`endpoints_file`) that the
//! deployment step maintains.
//!
//! # Sections
//!
//! - **identities**: logical identity name to principal
//! - **services**: logical service name to (optional) base URL
//! - **triggers**: cron and topic triggers wired to service paths
//! - **apply**: execution retry policy, audit log and gcloud settings
//! - **logging**: log level and format for the CLI

pub mod endpoints;
pub mod trigger;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::endpoint::EndpointRegistry;
use crate::error::TopologyError;
use crate::graph::TriggerGraph;
use crate::identity::IdentityRegistry;
use crate::retry::RetryConfig;

pub use endpoints::EndpointsFile;
pub use trigger::{CronConfig, IdentityConfig, ServiceConfig, TargetConfig, TopicConfig, TriggerConfig};

/// Complete topology configuration loaded from files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Cloud project that owns every resource.
    #[serde(default)]
    pub project: Option<String>,

    /// Region of the services and scheduler jobs.
    #[serde(default)]
    pub region: Option<String>,

    /// Path to the discovered-endpoints file (relative to this file).
    #[serde(default)]
    pub endpoints_file: Option<PathBuf>,

    #[serde(default)]
    pub identities: BTreeMap<String, IdentityConfig>,

    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,

    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,

    #[serde(default)]
    pub apply: ApplyConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for executing a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyConfig {
    /// Retry policy for each control-plane operation.
    #[serde(default = "default_apply_retry")]
    pub retry: RetryConfig,

    /// JSON Lines audit log of executed operations.
    #[serde(default)]
    pub audit_log: Option<PathBuf>,

    /// gcloud binary used by the gcloud backend.
    #[serde(default = "default_gcloud_binary")]
    pub gcloud_binary: String,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            retry: default_apply_retry(),
            audit_log: None,
            gcloud_binary: default_gcloud_binary(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_apply_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 5,
        min_backoff: "2s".to_string(),
        max_backoff: "60s".to_string(),
        deadline: "10m".to_string(),
    }
}

fn default_gcloud_binary() -> String {
    "gcloud".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

impl TopologyConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// Load configuration and overlay discovered endpoint URLs.
    ///
    /// URLs from `endpoints_file` win over inline `services.*.url` values and
    /// declare services that are not listed inline.
    pub fn load_with_context(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = Self::from_file(path)?;

        if let Some(endpoints_path) = config.endpoints_path(path) {
            let discovered = EndpointsFile::load(&endpoints_path)?;
            tracing::debug!(
                path = %endpoints_path.display(),
                count = discovered.endpoints.len(),
                "Loaded discovered endpoints"
            );
            config.overlay_endpoints(&discovered);
        }

        Ok(config)
    }

    /// Absolute location of the endpoints file, if one is configured.
    pub fn endpoints_path(&self, config_path: impl AsRef<Path>) -> Option<PathBuf> {
        let base_dir = config_path
            .as_ref()
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        self.endpoints_file
            .as_ref()
            .map(|file| EndpointsFile::resolve_path(file, &base_dir))
    }

    /// Apply discovered URLs on top of the inline service definitions.
    pub fn overlay_endpoints(&mut self, discovered: &EndpointsFile) {
        for (service, url) in &discovered.endpoints {
            self.services.entry(service.clone()).or_default().url = Some(url.clone());
        }
    }

    /// Build the identity registry.
    pub fn identity_registry(&self) -> Result<IdentityRegistry, TopologyError> {
        let mut registry = IdentityRegistry::new();
        for (name, identity) in &self.identities {
            registry.insert(identity.to_identity(name))?;
        }
        Ok(registry)
    }

    /// Build the endpoint registry. Services without a URL are declared only.
    pub fn endpoint_registry(&self) -> Result<EndpointRegistry, TopologyError> {
        let mut registry = EndpointRegistry::new();
        for (name, service) in &self.services {
            match &service.url {
                Some(url) => registry.register(name.clone(), url)?,
                None => registry.declare(name.clone()),
            }
        }
        Ok(registry)
    }

    /// Build the trigger graph, failing on the first invalid trigger.
    pub fn build_graph(&self) -> Result<TriggerGraph, TopologyError> {
        let mut graph = TriggerGraph::new(self.identity_registry()?, self.endpoint_registry()?);
        for trigger in &self.triggers {
            graph.add_edge(trigger.to_edge()?)?;
        }
        Ok(graph)
    }

    /// Build the trigger graph from every valid trigger and collect the errors
    /// of the invalid ones instead of stopping at the first.
    pub fn build_graph_collecting(&self) -> Result<(TriggerGraph, Vec<TopologyError>), TopologyError> {
        let mut graph = TriggerGraph::new(self.identity_registry()?, self.endpoint_registry()?);
        let mut errors = Vec::new();
        for trigger in &self.triggers {
            if let Err(e) = trigger.to_edge().and_then(|edge| graph.add_edge(edge)) {
                errors.push(e);
            }
        }
        Ok((graph, errors))
    }

    /// Identities not referenced by any trigger.
    pub fn unused_identities(&self) -> Vec<&str> {
        self.identities
            .keys()
            .filter(|name| !self.triggers.iter().any(|t| &t.identity == *name))
            .map(String::as_str)
            .collect()
    }

    /// Services that no trigger points at.
    pub fn untriggered_services(&self) -> Vec<&str> {
        self.services
            .keys()
            .filter(|name| !self.triggers.iter().any(|t| &t.target.service == *name))
            .map(String::as_str)
            .collect()
    }
}
