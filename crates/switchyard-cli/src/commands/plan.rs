//! `switchyard plan` command implementation.

use anyhow::{Context, Result};
use std::path::Path;

use switchyard_planner::{DiffPlanner, Plan, Planner};
use switchyard_runtime::observe;

use super::{gcloud_control_plane, load_graph, load_state};
use crate::OutputFormat;

pub async fn run(
    config_path: &Path,
    state_path: Option<&Path>,
    observe_live: bool,
    format: OutputFormat,
) -> Result<()> {
    let (config, graph) = load_graph(config_path)?;

    let current = if observe_live {
        let control_plane = gcloud_control_plane(&config);
        observe(&control_plane, &graph)
            .await
            .context("Failed to observe control-plane state")?
    } else {
        load_state(state_path)?
    };
    tracing::debug!(edges = graph.len(), known = current.len(), "Planning");

    let plan = DiffPlanner.plan(&graph, &current);
    print!("{}", format_plan(&plan, format)?);
    Ok(())
}

pub(crate) fn format_plan(plan: &Plan, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(plan.to_string()),
        OutputFormat::Json => Ok(format!("{}\n", serde_json::to_string_pretty(plan)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::TopologyConfig;
    use switchyard_planner::CurrentState;

    const TOPOLOGY: &str = r#"
identities:
  pubsub-push-sa:
    principal: pubsub-push-sa@fixture-scout.iam.gserviceaccount.com
services:
  notification-service: { url: https://notify.example.run }
triggers:
  - name: email-delivery
    topic: { topic: email-notifications-topic }
    target: { service: notification-service, path: /notifications/handle/email }
    identity: pubsub-push-sa
"#;

    fn sample_plan() -> Plan {
        let graph = TopologyConfig::from_yaml(TOPOLOGY)
            .unwrap()
            .build_graph()
            .unwrap();
        DiffPlanner.plan(&graph, &CurrentState::new())
    }

    #[test]
    fn test_text_plan_lists_steps_in_order() {
        let text = format_plan(&sample_plan(), OutputFormat::Text).unwrap();
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim_start().starts_with("after:")).collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("roles/run.invoker"));
        assert!(lines[1].contains("email-notifications-topic"));
        assert!(lines[2].contains("email-delivery-push"));
    }

    #[test]
    fn test_json_plan_is_parseable() {
        let json = format_plan(&sample_plan(), OutputFormat::Json).unwrap();
        let parsed: Plan = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, sample_plan());
    }
}
