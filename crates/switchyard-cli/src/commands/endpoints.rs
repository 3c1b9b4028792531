//! `switchyard endpoints` command implementation.
//!
//! `register` is called by the deployment step once a service has a URL.
//! The URL is validated the same way the topology validates inline URLs.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use switchyard_core::{EndpointRegistry, EndpointsFile, TopologyConfig};

pub fn register(config_path: &Path, service: &str, url: &str) -> Result<()> {
    let endpoints_path = endpoints_path(config_path)?;

    // Reject malformed URLs before they reach the file.
    EndpointRegistry::new().register(service, url)?;

    let mut file = EndpointsFile::load(&endpoints_path)?;
    match file.record(service, url.trim_end_matches('/')) {
        Some(previous) => tracing::info!(service, previous = %previous, url, "Endpoint updated"),
        None => tracing::info!(service, url, "Endpoint registered"),
    }
    file.save(&endpoints_path)
        .with_context(|| format!("Failed to write {}", endpoints_path.display()))?;

    println!("Registered {} -> {}", service, url.trim_end_matches('/'));
    Ok(())
}

pub fn list(config_path: &Path) -> Result<()> {
    let config = TopologyConfig::load_with_context(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let registry = config.endpoint_registry()?;

    for (service, url) in registry.services() {
        println!("{:<32} {}", service, url.unwrap_or("(not deployed)"));
    }
    Ok(())
}

fn endpoints_path(config_path: &Path) -> Result<PathBuf> {
    let config = TopologyConfig::from_file(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    config.endpoints_path(config_path).with_context(|| {
        format!(
            "{} has no endpoints_file; add one to record deployed URLs",
            config_path.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const TOPOLOGY: &str = r#"
endpoints_file: endpoints.yaml
identities:
  scheduler-invoker-sa:
    principal: scheduler-invoker-sa@fixture-scout.iam.gserviceaccount.com
services:
  scout-service: {}
triggers:
  - name: daily-scout
    cron: { schedule: "30 0 * * *" }
    target: { service: scout-service, path: /scout/process-user-fixtures }
    identity: scheduler-invoker-sa
"#;

    #[test]
    fn test_register_resolves_endpoint_on_next_load() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("switchyard.yaml");
        fs::write(&config_path, TOPOLOGY).unwrap();

        // Not deployed yet: the trigger cannot be wired.
        let config = TopologyConfig::load_with_context(&config_path).unwrap();
        assert!(config.build_graph().is_err());

        register(&config_path, "scout-service", "https://scout-abc123.a.run.app/").unwrap();

        let config = TopologyConfig::load_with_context(&config_path).unwrap();
        let graph = config.build_graph().unwrap();
        assert_eq!(
            graph.get("daily-scout").unwrap().destination.url(),
            "https://scout-abc123.a.run.app/scout/process-user-fixtures"
        );
    }

    #[test]
    fn test_register_rejects_invalid_url() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("switchyard.yaml");
        fs::write(&config_path, TOPOLOGY).unwrap();

        assert!(register(&config_path, "scout-service", "not a url").is_err());
        assert!(!dir.path().join("endpoints.yaml").exists());
    }

    #[test]
    fn test_register_requires_endpoints_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("switchyard.yaml");
        fs::write(&config_path, TOPOLOGY.replace("endpoints_file: endpoints.yaml\n", "")).unwrap();

        assert!(register(&config_path, "scout-service", "https://scout.example.run").is_err());
    }
}
