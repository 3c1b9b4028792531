//! `switchyard apply` command implementation.
//!
//! Plans against the current state, then executes the plan with the
//! configured retry policy. The local backend keeps state in the `--state`
//! file; the gcloud backend observes live state unless a state file is given.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::sync::watch;

use switchyard_core::TopologyConfig;
use switchyard_planner::{CurrentState, DiffPlanner, Plan, Planner};
use switchyard_runtime::{
    AuditSink, ControlPlane, ExecutionReport, Executor, InMemoryControlPlane, JsonLinesAuditSink,
    TeeAuditSink, TracingAuditSink, observe,
};

use super::{gcloud_control_plane, load_graph, load_state};
use crate::Backend;

pub async fn run(
    config_path: &Path,
    state_path: Option<&Path>,
    backend: Backend,
    dry_run: bool,
) -> Result<()> {
    let (config, graph) = load_graph(config_path)?;

    let current = match (backend, state_path) {
        (Backend::Gcloud, None) => observe(&gcloud_control_plane(&config), &graph)
            .await
            .context("Failed to observe control-plane state")?,
        _ => load_state(state_path)?,
    };
    let plan = DiffPlanner.plan(&graph, &current);

    if dry_run || plan.is_empty() {
        print!("{}", plan);
        return Ok(());
    }
    if backend == Backend::Local && state_path.is_none() {
        tracing::warn!("No --state file given; local apply results will not be kept");
    }

    let audit = audit_sink(&config, config_path)?;
    let shutdown = shutdown_on_ctrl_c();

    let report = match backend {
        Backend::Local => {
            let control_plane = InMemoryControlPlane::with_state(current);
            let (control_plane, report) =
                execute(control_plane, audit, &config, &plan, shutdown).await?;
            if let Some(path) = state_path {
                control_plane
                    .snapshot()
                    .save(path)
                    .with_context(|| format!("Failed to write state file {}", path.display()))?;
            }
            report
        }
        Backend::Gcloud => {
            let control_plane = gcloud_control_plane(&config);
            let (_, report) = execute(control_plane, audit, &config, &plan, shutdown).await?;
            if let Some(path) = state_path {
                record_applied(&current, &report)
                    .save(path)
                    .with_context(|| format!("Failed to write state file {}", path.display()))?;
            }
            report
        }
    };

    println!("{}", report);
    if !report.is_success() {
        anyhow::bail!(
            "Apply incomplete: {} step(s) failed, {} skipped, {} cancelled. Re-run to resume.",
            report.count("failed"),
            report.count("skipped"),
            report.count("cancelled")
        );
    }
    Ok(())
}

/// Run the plan and hand back the control plane with the report.
async fn execute<C: ControlPlane>(
    control_plane: C,
    audit: Box<dyn AuditSink>,
    config: &TopologyConfig,
    plan: &Plan,
    shutdown: watch::Receiver<bool>,
) -> Result<(C, ExecutionReport)> {
    let retry = config
        .apply
        .retry
        .to_policy()
        .context("Invalid apply.retry policy")?;
    let executor = Executor::new(control_plane, audit, retry);
    let report = executor.run_with_shutdown(plan, shutdown).await;
    Ok((executor.into_control_plane(), report))
}

/// State after a run: what was known before plus everything now present.
fn record_applied(before: &CurrentState, report: &ExecutionReport) -> CurrentState {
    let mut after = before.clone();
    after.extend(report.present_keys().cloned());
    after
}

fn audit_sink(config: &TopologyConfig, config_path: &Path) -> Result<Box<dyn AuditSink>> {
    let Some(audit_log) = &config.apply.audit_log else {
        return Ok(Box::new(TracingAuditSink));
    };
    let path = match config_path.parent() {
        Some(dir) if audit_log.is_relative() => dir.join(audit_log),
        _ => audit_log.clone(),
    };
    let file_sink = JsonLinesAuditSink::open(&path)
        .with_context(|| format!("Failed to open audit log {}", path.display()))?;
    Ok(Box::new(TeeAuditSink(vec![
        Box::new(TracingAuditSink),
        Box::new(file_sink),
    ])))
}

/// A receiver that flips to `true` on the first Ctrl-C.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current operation");
            let _ = tx.send(true);
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use switchyard_core::NaturalKey;

    const TOPOLOGY: &str = r#"
identities:
  scheduler-invoker-sa:
    principal: scheduler-invoker-sa@fixture-scout.iam.gserviceaccount.com
services:
  scout-service: { url: https://scout.example.run }
triggers:
  - name: daily-scout
    cron: { schedule: "30 0 * * *" }
    target: { service: scout-service, path: /scout/process-user-fixtures }
    identity: scheduler-invoker-sa
apply:
  audit_log: audit.jsonl
"#;

    #[tokio::test]
    async fn test_local_apply_persists_state_and_audit() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("switchyard.yaml");
        let state_path = dir.path().join("state.json");
        fs::write(&config_path, TOPOLOGY).unwrap();

        run(&config_path, Some(&state_path), Backend::Local, false)
            .await
            .unwrap();

        let state = CurrentState::load(&state_path).unwrap();
        assert_eq!(state.len(), 2);
        assert!(state.contains(&NaturalKey::ScheduleJob {
            name: "daily-scout".to_string()
        }));

        let audit = fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
        assert_eq!(audit.lines().count(), 2);

        // Second apply has nothing to do and leaves the state untouched.
        run(&config_path, Some(&state_path), Backend::Local, false)
            .await
            .unwrap();
        assert_eq!(CurrentState::load(&state_path).unwrap(), state);
        assert_eq!(fs::read_to_string(dir.path().join("audit.jsonl")).unwrap(), audit);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("switchyard.yaml");
        let state_path = dir.path().join("state.json");
        fs::write(&config_path, TOPOLOGY).unwrap();

        run(&config_path, Some(&state_path), Backend::Local, true)
            .await
            .unwrap();

        assert!(!state_path.exists());
        assert!(!dir.path().join("audit.jsonl").exists());
    }
}
