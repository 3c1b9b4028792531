//! The trigger graph.
//!
//! Edges are validated when they are added: a graph only ever contains
//! edges whose retry policy is well formed and whose identity and
//! destination both resolve. Planning over a graph therefore cannot hit a
//! missing reference.

use crate::endpoint::{Endpoint, EndpointRegistry};
use crate::edge::{TriggerEdge, TriggerSource};
use crate::error::{Result, TopologyError};
use crate::identity::{Identity, IdentityRegistry, PrincipalKind};

/// An accepted edge together with the identity and endpoint it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiredEdge {
    pub edge: TriggerEdge,
    pub identity: Identity,
    pub destination: Endpoint,
}

/// Directed edges from trigger sources to destination endpoints.
#[derive(Debug, Clone)]
pub struct TriggerGraph {
    identities: IdentityRegistry,
    endpoints: EndpointRegistry,
    edges: Vec<WiredEdge>,
}

impl TriggerGraph {
    /// Create an empty graph over populated registries.
    pub fn new(identities: IdentityRegistry, endpoints: EndpointRegistry) -> Self {
        Self {
            identities,
            endpoints,
            edges: Vec::new(),
        }
    }

    /// Validate and add an edge. On error the graph is left unchanged.
    pub fn add_edge(&mut self, edge: TriggerEdge) -> Result<()> {
        let wired = self.wire(edge)?;
        tracing::debug!(
            edge = %wired.edge.name,
            source = %wired.edge.source,
            destination = %wired.destination,
            "Added trigger edge"
        );
        self.edges.push(wired);
        Ok(())
    }

    fn wire(&self, edge: TriggerEdge) -> Result<WiredEdge> {
        let name = edge.name.clone();
        let invalid = |reason: &dyn ToString| TopologyError::invalid_edge(&name, reason.to_string());

        if edge.name.trim().is_empty() {
            return Err(TopologyError::invalid_edge("<unnamed>", "edge name is empty"));
        }
        edge.retry.validate().map_err(|e| invalid(&e))?;
        validate_source(&edge.source).map_err(|reason| invalid(&reason))?;

        if self.edges.iter().any(|w| w.edge.name == edge.name) {
            return Err(invalid(&"an edge with this name already exists"));
        }
        if let Some(existing) = self
            .edges
            .iter()
            .find(|w| same_resource(&w.edge, &edge))
        {
            return Err(invalid(&format!(
                "{} '{}' is already created by edge '{}'",
                edge.source.kind(),
                edge.resource_name(),
                existing.edge.name
            )));
        }

        let identity = self
            .identities
            .resolve(&edge.identity)
            .map_err(|e| invalid(&e))?
            .clone();
        if identity.kind != PrincipalKind::ServiceAccount {
            return Err(invalid(&format!(
                "identity '{}' is not a service account and cannot mint OIDC tokens",
                identity.name
            )));
        }

        let destination = self
            .endpoints
            .endpoint(&edge.destination)
            .map_err(|e| invalid(&e))?;

        Ok(WiredEdge {
            edge,
            identity,
            destination,
        })
    }

    /// All edges, in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &TriggerEdge> + Clone + '_ {
        self.edges.iter().map(|w| &w.edge)
    }

    /// All edges with their resolved identity and destination.
    pub fn wired_edges(&self) -> impl Iterator<Item = &WiredEdge> + Clone + '_ {
        self.edges.iter()
    }

    /// Edges whose destination is `service`.
    ///
    /// The iterator is lazy and finite; call again (or clone it) to restart.
    pub fn edges_for_destination<'a>(
        &'a self,
        service: &'a str,
    ) -> impl Iterator<Item = &'a TriggerEdge> + Clone + 'a {
        self.edges
            .iter()
            .filter(move |w| w.edge.destination.service == service)
            .map(|w| &w.edge)
    }

    pub fn get(&self, name: &str) -> Option<&WiredEdge> {
        self.edges.iter().find(|w| w.edge.name == name)
    }

    pub fn identities(&self) -> &IdentityRegistry {
        &self.identities
    }

    pub fn endpoints(&self) -> &EndpointRegistry {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

fn same_resource(a: &TriggerEdge, b: &TriggerEdge) -> bool {
    match (&a.source, &b.source) {
        (TriggerSource::Cron { .. }, TriggerSource::Cron { .. }) => a.name == b.name,
        (
            TriggerSource::Topic {
                subscription: left,
                ..
            },
            TriggerSource::Topic {
                subscription: right,
                ..
            },
        ) => left == right,
        _ => false,
    }
}

fn validate_source(source: &TriggerSource) -> std::result::Result<(), String> {
    match source {
        TriggerSource::Cron {
            schedule,
            time_zone,
        } => {
            let fields = schedule.split_whitespace().count();
            if fields != 5 {
                return Err(format!(
                    "cron schedule '{}' must have 5 fields (got {})",
                    schedule, fields
                ));
            }
            if time_zone.trim().is_empty() {
                return Err("cron time zone is empty".to_string());
            }
        }
        TriggerSource::Topic {
            topic,
            subscription,
        } => {
            if topic.trim().is_empty() {
                return Err("topic name is empty".to_string());
            }
            if subscription.trim().is_empty() {
                return Err("subscription name is empty".to_string());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointRef;
    use crate::retry::RetryPolicy;
    use std::time::Duration;

    fn registries() -> (IdentityRegistry, EndpointRegistry) {
        let mut identities = IdentityRegistry::new();
        identities
            .insert(Identity::service_account(
                "scheduler-invoker-sa",
                "scheduler-invoker-sa@fixture-scout.iam.gserviceaccount.com",
            ))
            .unwrap();
        identities
            .insert(Identity::new(
                "ops",
                "ops@example.com",
                PrincipalKind::User,
            ))
            .unwrap();

        let mut endpoints = EndpointRegistry::new();
        endpoints
            .register("scout-service", "https://scout.example.run")
            .unwrap();
        endpoints
            .register("notification-service", "https://notify.example.run")
            .unwrap();
        endpoints.declare("reminder-service");
        (identities, endpoints)
    }

    fn retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(30), Duration::from_secs(300)).unwrap()
    }

    fn cron_edge(name: &str, service: &str, identity: &str) -> TriggerEdge {
        TriggerEdge::new(
            name,
            TriggerSource::cron("30 0 * * *"),
            EndpointRef::new(service, "/scout/process-user-fixtures"),
            identity,
            retry(),
        )
    }

    fn graph() -> TriggerGraph {
        let (identities, endpoints) = registries();
        TriggerGraph::new(identities, endpoints)
    }

    #[test]
    fn test_add_valid_edge() {
        let mut graph = graph();
        graph
            .add_edge(cron_edge("daily-scout", "scout-service", "scheduler-invoker-sa"))
            .unwrap();

        let wired = graph.get("daily-scout").unwrap();
        assert_eq!(
            wired.destination.url(),
            "https://scout.example.run/scout/process-user-fixtures"
        );
        assert_eq!(wired.identity.name, "scheduler-invoker-sa");
    }

    #[test]
    fn test_unresolved_endpoint_is_invalid_edge() {
        let mut graph = graph();
        let err = graph
            .add_edge(cron_edge("dispatch", "reminder-service", "scheduler-invoker-sa"))
            .unwrap_err();
        assert!(matches!(err, TopologyError::InvalidEdge { ref edge, .. } if edge == "dispatch"));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_unknown_identity_is_invalid_edge() {
        let mut graph = graph();
        let err = graph
            .add_edge(cron_edge("daily-scout", "scout-service", "ghost"))
            .unwrap_err();
        match err {
            TopologyError::InvalidEdge { reason, .. } => assert!(reason.contains("ghost")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_user_identity_rejected() {
        let mut graph = graph();
        assert!(graph
            .add_edge(cron_edge("daily-scout", "scout-service", "ops"))
            .is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut graph = graph();
        graph
            .add_edge(cron_edge("daily-scout", "scout-service", "scheduler-invoker-sa"))
            .unwrap();
        assert!(graph
            .add_edge(cron_edge("daily-scout", "scout-service", "scheduler-invoker-sa"))
            .is_err());

        let push = |name: &str| {
            TriggerEdge::new(
                name,
                TriggerSource::topic("email-notifications-topic", "email-push"),
                EndpointRef::new("notification-service", "/notifications/handle/email"),
                "scheduler-invoker-sa",
                retry(),
            )
        };
        graph.add_edge(push("email")).unwrap();
        let err = graph.add_edge(push("email-again")).unwrap_err();
        assert!(err.to_string().contains("email-push"));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_bad_cron_rejected() {
        let mut graph = graph();
        let mut edge = cron_edge("daily-scout", "scout-service", "scheduler-invoker-sa");
        edge.source = TriggerSource::cron("every day");
        assert!(graph.add_edge(edge).is_err());
    }

    #[test]
    fn test_edges_for_destination_is_restartable() {
        let mut graph = graph();
        graph
            .add_edge(cron_edge("daily-scout", "scout-service", "scheduler-invoker-sa"))
            .unwrap();
        graph
            .add_edge(cron_edge("weekly-scout", "scout-service", "scheduler-invoker-sa"))
            .unwrap();

        let iter = graph.edges_for_destination("scout-service");
        let again = iter.clone();
        assert_eq!(iter.count(), 2);
        let names: Vec<_> = again.map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["daily-scout", "weekly-scout"]);
        assert_eq!(graph.edges_for_destination("scout-service").count(), 2);
        assert_eq!(graph.edges_for_destination("notification-service").count(), 0);
    }
}
