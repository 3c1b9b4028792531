//! `switchyard render` command implementation.
//!
//! Prints the plan as the gcloud commands that would execute it, one per
//! line, without running anything.

use anyhow::Result;
use std::path::Path;

use switchyard_planner::{DiffPlanner, Plan, Planner};
use switchyard_runtime::GcloudControlPlane;

use super::{gcloud_control_plane, load_graph, load_state};

pub fn run(config_path: &Path, state_path: Option<&Path>) -> Result<()> {
    let (config, graph) = load_graph(config_path)?;
    let current = load_state(state_path)?;
    let plan = DiffPlanner.plan(&graph, &current);

    print!("{}", render_script(&gcloud_control_plane(&config), &plan)?);
    Ok(())
}

pub(crate) fn render_script(control_plane: &GcloudControlPlane, plan: &Plan) -> Result<String> {
    if plan.is_empty() {
        return Ok("# No changes. Control plane matches the topology.\n".to_string());
    }
    let mut script = String::new();
    for step in plan {
        script.push_str(&format!("# {}\n", step.key));
        script.push_str(&control_plane.render(&step.operation)?);
        script.push('\n');
    }
    Ok(script)
}
