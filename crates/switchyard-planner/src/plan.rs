//! Plan generation.
//!
//! For every edge (in graph order) the planner emits, when missing from the
//! current state:
//!
//! 1. the invoker grant for the edge's identity on its destination,
//! 2. for topic edges, the topic,
//! 3. the scheduler job or push subscription itself.
//!
//! Grants and topics shared by several edges are emitted once, before the
//! first create that needs them. Anything whose natural key is already in
//! the current state is skipped, so planning against the state produced by
//! a full apply yields an empty plan.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use switchyard_core::{
    NaturalKey, ProvisioningOperation, RUN_INVOKER_ROLE, TriggerGraph, TriggerSource, WiredEdge,
};

use crate::state::CurrentState;

/// One operation in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub key: NaturalKey,
    pub operation: ProvisioningOperation,
    /// Steps earlier in the same plan that must succeed first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<NaturalKey>,
    /// Edge that first required this step.
    pub edge: String,
}

/// An ordered list of idempotent provisioning operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlanStep> {
        self.steps.iter()
    }

    pub fn operations(&self) -> impl Iterator<Item = &ProvisioningOperation> {
        self.steps.iter().map(|s| &s.operation)
    }

    pub fn keys(&self) -> impl Iterator<Item = &NaturalKey> {
        self.steps.iter().map(|s| &s.key)
    }

    /// Index of the step with `key`, if planned.
    pub fn position(&self, key: &NaturalKey) -> Option<usize> {
        self.steps.iter().position(|s| &s.key == key)
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a PlanStep;
    type IntoIter = std::slice::Iter<'a, PlanStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return writeln!(f, "No changes. Control plane matches the topology.");
        }
        for (idx, step) in self.steps.iter().enumerate() {
            writeln!(f, "{:>3}. {}", idx + 1, step.operation)?;
            if !step.depends_on.is_empty() {
                let deps: Vec<String> = step.depends_on.iter().map(|k| k.to_string()).collect();
                writeln!(f, "       after: {}", deps.join(", "))?;
            }
        }
        Ok(())
    }
}

/// Derives provisioning plans from a trigger graph.
pub trait Planner {
    fn plan(&self, graph: &TriggerGraph, current: &CurrentState) -> Plan;
}

/// The natural-key diff planner.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffPlanner;

impl Planner for DiffPlanner {
    fn plan(&self, graph: &TriggerGraph, current: &CurrentState) -> Plan {
        plan(graph, current)
    }
}

/// Compute the ordered operations needed to bring `current` to `graph`.
pub fn plan(graph: &TriggerGraph, current: &CurrentState) -> Plan {
    let mut steps = Vec::new();
    let mut emitted: BTreeSet<NaturalKey> = BTreeSet::new();

    for wired in graph.wired_edges() {
        for mut step in edge_steps(wired) {
            if current.contains(&step.key) {
                tracing::debug!(edge = %wired.edge.name, key = %step.key, "Already applied, skipping");
                continue;
            }
            if emitted.contains(&step.key) {
                continue;
            }
            step.depends_on.retain(|dep| emitted.contains(dep));
            emitted.insert(step.key.clone());
            steps.push(step);
        }
    }

    tracing::debug!(edges = graph.len(), steps = steps.len(), "Plan computed");
    Plan { steps }
}

/// Every operation the graph requires, ignoring current state.
pub fn candidate_operations(graph: &TriggerGraph) -> Vec<ProvisioningOperation> {
    plan(graph, &CurrentState::default())
        .steps
        .into_iter()
        .map(|s| s.operation)
        .collect()
}

/// The state a complete, successful apply of `graph` leaves behind.
pub fn already_applied(graph: &TriggerGraph) -> CurrentState {
    candidate_operations(graph)
        .iter()
        .map(ProvisioningOperation::natural_key)
        .collect()
}

/// Steps required by a single edge, grant first.
fn edge_steps(wired: &WiredEdge) -> Vec<PlanStep> {
    let edge = &wired.edge;
    let step = |operation: ProvisioningOperation, depends_on: Vec<NaturalKey>| PlanStep {
        key: operation.natural_key(),
        operation,
        depends_on,
        edge: edge.name.clone(),
    };

    let grant = ProvisioningOperation::GrantInvokerRole {
        identity: wired.identity.name.clone(),
        member: wired.identity.member(),
        service: wired.destination.logical_name.clone(),
        role: RUN_INVOKER_ROLE.to_string(),
    };
    let grant_key = grant.natural_key();
    let mut steps = vec![step(grant, Vec::new())];

    match &edge.source {
        TriggerSource::Cron {
            schedule,
            time_zone,
        } => {
            steps.push(step(
                ProvisioningOperation::CreateScheduleJob {
                    job: edge.name.clone(),
                    schedule: schedule.clone(),
                    time_zone: time_zone.clone(),
                    uri: wired.destination.url(),
                    http_method: edge.http_method.clone(),
                    audience: wired.destination.audience(),
                    service_account: wired.identity.principal.clone(),
                    retry: edge.retry,
                },
                vec![grant_key],
            ));
        }
        TriggerSource::Topic {
            topic,
            subscription,
        } => {
            let create_topic = ProvisioningOperation::CreateTopic {
                topic: topic.clone(),
            };
            let topic_key = create_topic.natural_key();
            steps.push(step(create_topic, Vec::new()));
            steps.push(step(
                ProvisioningOperation::CreateSubscription {
                    subscription: subscription.clone(),
                    topic: topic.clone(),
                    push_endpoint: wired.destination.url(),
                    audience: wired.destination.audience(),
                    service_account: wired.identity.principal.clone(),
                    retry: edge.retry,
                },
                vec![grant_key, topic_key],
            ));
        }
    }

    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use switchyard_core::{
        EndpointRef, EndpointRegistry, Identity, IdentityRegistry, RetryPolicy, TriggerEdge,
    };

    fn scout_graph() -> TriggerGraph {
        let mut identities = IdentityRegistry::new();
        identities
            .insert(Identity::service_account(
                "scheduler-invoker-sa",
                "scheduler-invoker-sa@fixture-scout.iam.gserviceaccount.com",
            ))
            .unwrap();
        let mut endpoints = EndpointRegistry::new();
        endpoints
            .register("scout-service", "https://scout.example.run")
            .unwrap();

        let mut graph = TriggerGraph::new(identities, endpoints);
        graph
            .add_edge(TriggerEdge::new(
                "daily-scout",
                TriggerSource::cron("30 0 * * *"),
                EndpointRef::new("scout-service", "/scout/process-user-fixtures"),
                "scheduler-invoker-sa",
                RetryPolicy::new(3, Duration::from_secs(30), Duration::from_secs(300)).unwrap(),
            ))
            .unwrap();
        graph
    }

    #[test]
    fn test_grant_then_job_on_empty_state() {
        let plan = plan(&scout_graph(), &CurrentState::new());
        let actions: Vec<_> = plan.operations().map(|op| op.action()).collect();
        assert_eq!(actions, vec!["grant-invoker-role", "create-schedule-job"]);
        assert_eq!(plan.steps[1].depends_on, vec![plan.steps[0].key.clone()]);
    }

    #[test]
    fn test_job_operation_carries_resolved_fields() {
        let plan = plan(&scout_graph(), &CurrentState::new());
        match &plan.steps[1].operation {
            ProvisioningOperation::CreateScheduleJob {
                job,
                uri,
                audience,
                service_account,
                retry,
                ..
            } => {
                assert_eq!(job, "daily-scout");
                assert_eq!(uri, "https://scout.example.run/scout/process-user-fixtures");
                assert_eq!(audience, "https://scout.example.run");
                assert_eq!(
                    service_account,
                    "scheduler-invoker-sa@fixture-scout.iam.gserviceaccount.com"
                );
                assert_eq!(retry.max_attempts(), 3);
            }
            other => panic!("unexpected operation {other}"),
        }
    }

    #[test]
    fn test_existing_job_missing_grant_regrants() {
        let graph = scout_graph();
        let state = CurrentState::from_keys([NaturalKey::ScheduleJob {
            name: "daily-scout".to_string(),
        }]);
        let plan = plan(&graph, &state);
        assert_eq!(plan.len(), 1);
        assert!(plan.steps[0].operation.is_grant());
    }

    #[test]
    fn test_diff_planner_matches_free_function() {
        let graph = scout_graph();
        let state = CurrentState::new();
        assert_eq!(DiffPlanner.plan(&graph, &state), plan(&graph, &state));
    }

    #[test]
    fn test_display_empty_plan() {
        let graph = scout_graph();
        let text = plan(&graph, &already_applied(&graph)).to_string();
        assert!(text.starts_with("No changes"));
    }
}
