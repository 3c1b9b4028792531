//! Trigger edges: what fires, which endpoint it calls, under which identity.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::endpoint::EndpointRef;
use crate::retry::RetryPolicy;

/// Default time zone for cron schedules.
pub const DEFAULT_TIME_ZONE: &str = "UTC";

/// Default HTTP method used by scheduler jobs.
pub const DEFAULT_HTTP_METHOD: &str = "POST";

/// The event source of a trigger edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerSource {
    /// A cron schedule (scheduler job).
    Cron {
        /// Unix cron expression, e.g. `30 0 * * *`.
        schedule: String,
        time_zone: String,
    },
    /// A push subscription on a publish/subscribe topic.
    Topic {
        topic: String,
        subscription: String,
    },
}

impl TriggerSource {
    pub fn cron(schedule: impl Into<String>) -> Self {
        TriggerSource::Cron {
            schedule: schedule.into(),
            time_zone: DEFAULT_TIME_ZONE.to_string(),
        }
    }

    pub fn topic(topic: impl Into<String>, subscription: impl Into<String>) -> Self {
        TriggerSource::Topic {
            topic: topic.into(),
            subscription: subscription.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TriggerSource::Cron { .. } => "cron",
            TriggerSource::Topic { .. } => "topic",
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Cron {
                schedule,
                time_zone,
            } => write!(f, "cron '{}' ({})", schedule, time_zone),
            TriggerSource::Topic {
                topic,
                subscription,
            } => write!(f, "topic '{}' via '{}'", topic, subscription),
        }
    }
}

/// A configured relationship causing an external event to invoke an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerEdge {
    /// Edge name. For cron edges this is also the scheduler job name.
    pub name: String,
    pub source: TriggerSource,
    pub destination: EndpointRef,
    /// Logical identity name presented when invoking the destination.
    pub identity: String,
    pub retry: RetryPolicy,
    #[serde(default = "default_http_method")]
    pub http_method: String,
}

impl TriggerEdge {
    pub fn new(
        name: impl Into<String>,
        source: TriggerSource,
        destination: EndpointRef,
        identity: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            destination,
            identity: identity.into(),
            retry,
            http_method: default_http_method(),
        }
    }

    /// Name of the control-plane resource this edge creates.
    pub fn resource_name(&self) -> &str {
        match &self.source {
            TriggerSource::Cron { .. } => &self.name,
            TriggerSource::Topic { subscription, .. } => subscription,
        }
    }
}

impl fmt::Display for TriggerEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {}{} as {}",
            self.name, self.source, self.destination.service, self.destination.path, self.identity
        )
    }
}

fn default_http_method() -> String {
    DEFAULT_HTTP_METHOD.to_string()
}
