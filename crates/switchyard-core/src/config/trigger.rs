//! Identity, service and trigger sections of the topology file.

use serde::{Deserialize, Serialize};

use crate::edge::{DEFAULT_HTTP_METHOD, DEFAULT_TIME_ZONE, TriggerEdge, TriggerSource};
use crate::endpoint::EndpointRef;
use crate::error::TopologyError;
use crate::identity::{Identity, PrincipalKind};
use crate::retry::RetryConfig;

/// An entry under `identities:`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Principal reference, typically a service-account e-mail.
    pub principal: String,

    #[serde(default)]
    pub kind: PrincipalKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl IdentityConfig {
    pub fn to_identity(&self, name: &str) -> Identity {
        Identity::new(name, self.principal.clone(), self.kind)
    }
}

/// An entry under `services:`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL, if the service has already been deployed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An entry under `triggers:`. Exactly one of `cron` or `topic` must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<CronConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<TopicConfig>,

    pub target: TargetConfig,

    /// Logical identity name.
    pub identity: String,

    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronConfig {
    pub schedule: String,

    #[serde(default = "default_time_zone")]
    pub time_zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Topic the push subscription is attached to.
    pub topic: String,

    /// Subscription name. Defaults to `<trigger name>-push`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
}

/// Destination of a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub service: String,

    #[serde(default = "default_path")]
    pub path: String,

    /// HTTP method for scheduler jobs (push subscriptions always POST).
    #[serde(default = "default_http_method")]
    pub method: String,
}

impl TriggerConfig {
    /// Convert to a [`TriggerEdge`]. Reference checks happen in the graph.
    pub fn to_edge(&self) -> Result<TriggerEdge, TopologyError> {
        let source = match (&self.cron, &self.topic) {
            (Some(cron), None) => TriggerSource::Cron {
                schedule: cron.schedule.clone(),
                time_zone: cron.time_zone.clone(),
            },
            (None, Some(topic)) => TriggerSource::Topic {
                topic: topic.topic.clone(),
                subscription: topic
                    .subscription
                    .clone()
                    .unwrap_or_else(|| format!("{}-push", self.name)),
            },
            (Some(_), Some(_)) => {
                return Err(TopologyError::invalid_edge(
                    &self.name,
                    "both 'cron' and 'topic' are set; a trigger has exactly one source",
                ));
            }
            (None, None) => {
                return Err(TopologyError::invalid_edge(
                    &self.name,
                    "neither 'cron' nor 'topic' is set",
                ));
            }
        };

        let retry = self
            .retry
            .to_policy()
            .map_err(|e| TopologyError::invalid_edge(&self.name, e))?;

        let mut edge = TriggerEdge::new(
            self.name.clone(),
            source,
            EndpointRef::new(self.target.service.clone(), self.target.path.clone()),
            self.identity.clone(),
            retry,
        );
        edge.http_method = self.target.method.to_uppercase();
        Ok(edge)
    }
}

fn default_time_zone() -> String {
    DEFAULT_TIME_ZONE.to_string()
}

fn default_path() -> String {
    "/".to_string()
}

fn default_http_method() -> String {
    DEFAULT_HTTP_METHOD.to_string()
}
