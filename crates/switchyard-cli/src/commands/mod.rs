//! CLI command implementations.

pub mod apply;
pub mod check;
pub mod endpoints;
pub mod plan;
pub mod render;

use anyhow::{Context, Result};
use std::path::Path;

use switchyard_core::{TopologyConfig, TriggerGraph};
use switchyard_planner::CurrentState;
use switchyard_runtime::{GcloudControlPlane, GcloudSettings};

/// Load the topology and build its trigger graph, stopping at the first invalid trigger.
pub(crate) fn load_graph(config_path: &Path) -> Result<(TopologyConfig, TriggerGraph)> {
    let config = TopologyConfig::load_with_context(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let graph = config
        .build_graph()
        .context("Invalid topology. Run `switchyard check` for every problem")?;
    Ok((config, graph))
}

/// Current state from a state file, or empty when none is given.
pub(crate) fn load_state(state_path: Option<&Path>) -> Result<CurrentState> {
    match state_path {
        Some(path) => CurrentState::load(path)
            .with_context(|| format!("Failed to read state file {}", path.display())),
        None => Ok(CurrentState::new()),
    }
}

pub(crate) fn gcloud_control_plane(config: &TopologyConfig) -> GcloudControlPlane {
    GcloudControlPlane::new(GcloudSettings {
        binary: config.apply.gcloud_binary.clone(),
        project: config.project.clone(),
        region: config.region.clone(),
    })
}
