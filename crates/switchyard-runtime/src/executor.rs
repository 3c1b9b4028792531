use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tokio::sync::watch;
use uuid::Uuid;

use switchyard_core::{NaturalKey, RetryPolicy};
use switchyard_planner::{Plan, PlanStep};

use crate::audit::{AuditEvent, AuditSink};
use crate::control_plane::{ControlPlane, ProvisionError};

/// Outcome of a single plan step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Applied { attempts: u32 },
    /// The control plane reported the resource as already present.
    AlreadyExisted { attempts: u32 },
    Failed { attempts: u32, error: String },
    /// Not attempted because a dependency failed or was skipped in this run.
    Skipped { blocked_by: NaturalKey },
    /// Not attempted because the run was cancelled.
    Cancelled,
}

impl StepStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StepStatus::Applied { .. } => "applied",
            StepStatus::AlreadyExisted { .. } => "already_existed",
            StepStatus::Failed { .. } => "failed",
            StepStatus::Skipped { .. } => "skipped",
            StepStatus::Cancelled => "cancelled",
        }
    }

    /// Whether the resource is known to exist after this step.
    pub fn is_present(&self) -> bool {
        matches!(
            self,
            StepStatus::Applied { .. } | StepStatus::AlreadyExisted { .. }
        )
    }

    fn attempts(&self) -> u32 {
        match self {
            StepStatus::Applied { attempts }
            | StepStatus::AlreadyExisted { attempts }
            | StepStatus::Failed { attempts, .. } => *attempts,
            StepStatus::Skipped { .. } | StepStatus::Cancelled => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub key: NaturalKey,
    pub action: String,
    #[serde(flatten)]
    pub status: StepStatus,
}

/// Per-step results of one execution run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub run_id: Uuid,
    pub outcomes: Vec<StepOutcome>,
}

impl ExecutionReport {
    /// True when every step ended with the resource present.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.status.is_present())
    }

    /// Keys known to exist after the run.
    pub fn present_keys(&self) -> impl Iterator<Item = &NaturalKey> {
        self.outcomes
            .iter()
            .filter(|o| o.status.is_present())
            .map(|o| &o.key)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, StepStatus::Failed { .. }))
    }

    pub fn count(&self, label: &str) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status.label() == label)
            .count()
    }

    pub fn status_of(&self, key: &NaturalKey) -> Option<&StepStatus> {
        self.outcomes.iter().find(|o| &o.key == key).map(|o| &o.status)
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            match &outcome.status {
                StepStatus::Failed { attempts, error } => writeln!(
                    f,
                    "  {:<16} {} (after {} attempt(s)): {}",
                    "failed", outcome.key, attempts, error
                )?,
                StepStatus::Skipped { blocked_by } => writeln!(
                    f,
                    "  {:<16} {} (blocked by {})",
                    "skipped", outcome.key, blocked_by
                )?,
                status => writeln!(f, "  {:<16} {}", status.label(), outcome.key)?,
            }
        }
        write!(
            f,
            "{} applied, {} already existed, {} failed, {} skipped, {} cancelled",
            self.count("applied"),
            self.count("already_existed"),
            self.count("failed"),
            self.count("skipped"),
            self.count("cancelled")
        )
    }
}

/// Applies plan steps sequentially against a control plane.
///
/// Each attempt is bounded by the policy deadline; a timed-out attempt is
/// retried like an unavailable control plane. Each step is retried with
/// bounded exponential backoff. "Already exists"
/// counts as success. A failed step blocks only the steps that depend on it;
/// unrelated steps still run.
pub struct Executor<C: ControlPlane, S: AuditSink> {
    control_plane: C,
    audit: S,
    retry: RetryPolicy,
}

impl<C: ControlPlane, S: AuditSink> Executor<C, S> {
    pub fn new(control_plane: C, audit: S, retry: RetryPolicy) -> Self {
        Self {
            control_plane,
            audit,
            retry,
        }
    }

    pub fn control_plane(&self) -> &C {
        &self.control_plane
    }

    pub fn into_control_plane(self) -> C {
        self.control_plane
    }

    /// Execute a plan to completion.
    pub async fn run(&self, plan: &Plan) -> ExecutionReport {
        let (_keep_open, shutdown) = watch::channel(false);
        self.run_with_shutdown(plan, shutdown).await
    }

    /// Execute a plan, stopping between operations once `shutdown` flips to true.
    pub async fn run_with_shutdown(
        &self,
        plan: &Plan,
        mut shutdown: watch::Receiver<bool>,
    ) -> ExecutionReport {
        let run_id = Uuid::new_v4();
        let mut unavailable: BTreeSet<NaturalKey> = BTreeSet::new();
        let mut outcomes = Vec::with_capacity(plan.len());

        tracing::info!(run_id = %run_id, steps = plan.len(), "Executing plan");

        for step in plan {
            let status = if *shutdown.borrow() {
                StepStatus::Cancelled
            } else if let Some(blocked_by) =
                step.depends_on.iter().find(|dep| unavailable.contains(*dep))
            {
                tracing::warn!(key = %step.key, blocked_by = %blocked_by, "Skipping step, dependency unavailable");
                StepStatus::Skipped {
                    blocked_by: blocked_by.clone(),
                }
            } else {
                self.apply_with_retry(step, &mut shutdown).await
            };

            if !status.is_present() {
                unavailable.insert(step.key.clone());
            }

            self.audit.record(AuditEvent {
                run_id,
                occurred_at: Utc::now(),
                key: step.key.to_string(),
                action: step.operation.action().to_string(),
                status: status.label().to_string(),
                attempts: status.attempts(),
                error: match &status {
                    StepStatus::Failed { error, .. } => Some(error.clone()),
                    _ => None,
                },
            });

            outcomes.push(StepOutcome {
                key: step.key.clone(),
                action: step.operation.action().to_string(),
                status,
            });
        }

        let report = ExecutionReport { run_id, outcomes };
        tracing::info!(
            run_id = %run_id,
            applied = report.count("applied"),
            failed = report.count("failed"),
            skipped = report.count("skipped"),
            "Plan execution finished"
        );
        report
    }

    async fn apply_with_retry(
        &self,
        step: &PlanStep,
        shutdown: &mut watch::Receiver<bool>,
    ) -> StepStatus {
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = tokio::select! {
                result = self.attempt(step) => result,
                _ = wait_for_shutdown(shutdown) => {
                    tracing::warn!(key = %step.key, attempt, "Interrupted during attempt");
                    return StepStatus::Failed {
                        attempts: attempt,
                        error: "cancelled during attempt".to_string(),
                    };
                }
            };
            let error = match result {
                Ok(()) => {
                    tracing::info!(key = %step.key, attempt, "Applied {}", step.operation.action());
                    return StepStatus::Applied { attempts: attempt };
                }
                Err(ProvisionError::AlreadyExists { .. }) => {
                    tracing::info!(key = %step.key, "Already exists");
                    return StepStatus::AlreadyExisted { attempts: attempt };
                }
                Err(e) => e,
            };

            if !error.is_retryable() || attempt >= max_attempts {
                tracing::error!(key = %step.key, attempt, error = %error, "Step failed");
                return StepStatus::Failed {
                    attempts: attempt,
                    error: error.to_string(),
                };
            }

            let delay = self.retry.backoff_for(attempt);
            tracing::warn!(
                key = %step.key,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying step"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_for_shutdown(shutdown) => {
                    return StepStatus::Failed {
                        attempts: attempt,
                        error: format!("cancelled while retrying: {}", error),
                    };
                }
            }
        }
    }

    /// One call to the control plane, bounded by the policy deadline.
    async fn attempt(&self, step: &PlanStep) -> Result<(), ProvisionError> {
        let deadline = self.retry.deadline();
        match tokio::time::timeout(deadline, self.control_plane.apply(&step.operation)).await {
            Ok(result) => result,
            Err(_) => Err(ProvisionError::Unavailable(format!(
                "no response within {}s",
                deadline.as_secs()
            ))),
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryControlPlane;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use switchyard_core::{
        EndpointRef, EndpointRegistry, Identity, IdentityRegistry, ProvisioningOperation,
        TriggerEdge, TriggerGraph, TriggerSource,
    };
    use switchyard_planner::{CurrentState, plan};

    #[derive(Clone, Default)]
    struct CapturingSink(Arc<Mutex<Vec<AuditEvent>>>);

    impl AuditSink for CapturingSink {
        fn record(&self, event: AuditEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn retry(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_secs(2), Duration::from_secs(60)).unwrap()
    }

    fn graph() -> TriggerGraph {
        let mut identities = IdentityRegistry::new();
        identities
            .insert(Identity::service_account(
                "scheduler-invoker-sa",
                "scheduler-invoker-sa@fixture-scout.iam.gserviceaccount.com",
            ))
            .unwrap();
        identities
            .insert(Identity::service_account(
                "pubsub-push-sa",
                "pubsub-push-sa@fixture-scout.iam.gserviceaccount.com",
            ))
            .unwrap();
        let mut endpoints = EndpointRegistry::new();
        endpoints
            .register("scout-service", "https://scout.example.run")
            .unwrap();
        endpoints
            .register("notification-service", "https://notify.example.run")
            .unwrap();

        let mut graph = TriggerGraph::new(identities, endpoints);
        graph
            .add_edge(TriggerEdge::new(
                "daily-scout",
                TriggerSource::cron("30 0 * * *"),
                EndpointRef::new("scout-service", "/scout/process-user-fixtures"),
                "scheduler-invoker-sa",
                retry(3),
            ))
            .unwrap();
        graph
            .add_edge(TriggerEdge::new(
                "email-delivery",
                TriggerSource::topic("email-notifications-topic", "email-notifications-push"),
                EndpointRef::new("notification-service", "/notifications/handle/email"),
                "pubsub-push-sa",
                retry(5),
            ))
            .unwrap();
        graph
    }

    fn key_of(plan: &Plan, action: &str, edge: &str) -> NaturalKey {
        plan.iter()
            .find(|s| s.operation.action() == action && s.edge == edge)
            .map(|s| s.key.clone())
            .unwrap()
    }

    #[tokio::test]
    async fn test_apply_full_plan_then_replan_is_empty() {
        let graph = graph();
        let plan = plan(&graph, &CurrentState::new());
        let executor = Executor::new(InMemoryControlPlane::new(), CapturingSink::default(), retry(3));

        let report = executor.run(&plan).await;
        assert!(report.is_success());
        assert_eq!(report.count("applied"), plan.len());

        let after = executor.control_plane().snapshot();
        assert!(switchyard_planner::plan(&graph, &after).is_empty());
        assert_eq!(executor.control_plane().apply_calls(), plan.keys().cloned().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_already_exists_is_success() {
        let graph = graph();
        let plan = plan(&graph, &CurrentState::new());
        let topic = key_of(&plan, "create-topic", "email-delivery");

        // Created out-of-band between plan and apply.
        let plane = InMemoryControlPlane::with_state(CurrentState::from_keys([topic.clone()]));
        let executor = Executor::new(plane, CapturingSink::default(), retry(3));

        let report = executor.run(&plan).await;
        assert!(report.is_success());
        assert_eq!(
            report.status_of(&topic),
            Some(&StepStatus::AlreadyExisted { attempts: 1 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let graph = graph();
        let plan = plan(&graph, &CurrentState::new());
        let job = key_of(&plan, "create-schedule-job", "daily-scout");

        let plane = InMemoryControlPlane::new();
        plane.fail_times(
            job.clone(),
            2,
            ProvisionError::PermissionDenied("binding not propagated".to_string()),
        );
        let executor = Executor::new(plane, CapturingSink::default(), retry(3));

        let report = executor.run(&plan).await;
        assert!(report.is_success());
        assert_eq!(report.status_of(&job), Some(&StepStatus::Applied { attempts: 3 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_grant_blocks_only_its_dependents() {
        let graph = graph();
        let plan = plan(&graph, &CurrentState::new());
        let grant = key_of(&plan, "grant-invoker-role", "daily-scout");
        let job = key_of(&plan, "create-schedule-job", "daily-scout");
        let subscription = key_of(&plan, "create-subscription", "email-delivery");

        let plane = InMemoryControlPlane::new();
        plane.fail_times(grant.clone(), 10, ProvisionError::Unavailable("503".to_string()));
        let sink = CapturingSink::default();
        let executor = Executor::new(plane, sink.clone(), retry(3));

        let report = executor.run(&plan).await;
        assert!(!report.is_success());
        assert_eq!(
            report.status_of(&grant),
            Some(&StepStatus::Failed {
                attempts: 3,
                error: "control plane unavailable: 503".to_string()
            })
        );
        assert_eq!(
            report.status_of(&job),
            Some(&StepStatus::Skipped {
                blocked_by: grant.clone()
            })
        );
        assert!(report.status_of(&subscription).unwrap().is_present());

        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), plan.len());
        assert!(events.iter().all(|e| e.run_id == report.run_id));
        assert!(!executor.control_plane().apply_calls().contains(&job));
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let graph = graph();
        let plan = plan(&graph, &CurrentState::new());
        let topic = key_of(&plan, "create-topic", "email-delivery");

        let plane = InMemoryControlPlane::new();
        plane.fail_times(
            topic.clone(),
            1,
            ProvisionError::InvalidRequest("bad topic name".to_string()),
        );
        let executor = Executor::new(plane, CapturingSink::default(), retry(5));

        let report = executor.run(&plan).await;
        assert!(matches!(
            report.status_of(&topic),
            Some(StepStatus::Failed { attempts: 1, .. })
        ));
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.count("skipped"), 1);
    }

    /// Accepts requests and never answers.
    struct HangingControlPlane;

    #[async_trait::async_trait]
    impl ControlPlane for HangingControlPlane {
        async fn exists(&self, _key: &NaturalKey) -> Result<bool, ProvisionError> {
            Ok(false)
        }

        async fn apply(&self, _operation: &ProvisioningOperation) -> Result<(), ProvisionError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_attempt_is_bounded_by_deadline() {
        let graph = graph();
        let plan = plan(&graph, &CurrentState::new());
        let policy = RetryPolicy::with_deadline(
            2,
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(600),
        )
        .unwrap();
        let executor = Executor::new(HangingControlPlane, CapturingSink::default(), policy);

        let report = tokio::time::timeout(Duration::from_secs(24 * 3600), executor.run(&plan))
            .await
            .expect("run finishes once every attempt times out");

        // Both grants and the topic time out; the job and subscription are skipped.
        assert_eq!(report.count("failed"), 3);
        assert_eq!(report.count("skipped"), 2);
        for outcome in report.failures() {
            assert_eq!(
                outcome.status,
                StepStatus::Failed {
                    attempts: 2,
                    error: "control plane unavailable: no response within 600s".to_string()
                }
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_hanging_attempt() {
        let graph = graph();
        let plan = plan(&graph, &CurrentState::new());
        let executor = Executor::new(HangingControlPlane, CapturingSink::default(), retry(3));

        let (tx, rx) = watch::channel(false);
        let run = executor.run_with_shutdown(&plan, rx);
        let interrupt = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            tx.send(true).unwrap();
        };
        let (report, ()) = tokio::join!(run, interrupt);

        assert_eq!(
            report.outcomes[0].status,
            StepStatus::Failed {
                attempts: 1,
                error: "cancelled during attempt".to_string()
            }
        );
        assert_eq!(report.count("cancelled"), plan.len() - 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_between_operations() {
        let graph = graph();
        let plan = plan(&graph, &CurrentState::new());
        let executor = Executor::new(InMemoryControlPlane::new(), CapturingSink::default(), retry(3));

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let report = executor.run_with_shutdown(&plan, rx).await;

        assert_eq!(report.count("cancelled"), plan.len());
        assert!(executor.control_plane().apply_calls().is_empty());
    }
}
