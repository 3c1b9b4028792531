//! Provisioning operations and their natural keys.
//!
//! A [`ProvisioningOperation`] is a single idempotent action against the
//! control plane. Its [`NaturalKey`] is the minimal set of fields that
//! identifies the resulting resource, and is what existence checks and
//! current-state diffs match on.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::retry::RetryPolicy;

/// Role granted to trigger identities on their destination service.
pub const RUN_INVOKER_ROLE: &str = "roles/run.invoker";

/// Identifies a provisioned resource independently of its settings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NaturalKey {
    /// IAM binding of `role` to `member` on `resource`.
    RoleBinding {
        role: String,
        member: String,
        resource: String,
    },
    ScheduleJob { name: String },
    Topic { name: String },
    Subscription { name: String },
}

impl NaturalKey {
    pub fn kind(&self) -> &'static str {
        match self {
            NaturalKey::RoleBinding { .. } => "binding",
            NaturalKey::ScheduleJob { .. } => "job",
            NaturalKey::Topic { .. } => "topic",
            NaturalKey::Subscription { .. } => "subscription",
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NaturalKey::RoleBinding {
                role,
                member,
                resource,
            } => write!(f, "binding:{}:{}:{}", role, member, resource),
            NaturalKey::ScheduleJob { name } => write!(f, "job:{}", name),
            NaturalKey::Topic { name } => write!(f, "topic:{}", name),
            NaturalKey::Subscription { name } => write!(f, "subscription:{}", name),
        }
    }
}

/// A single idempotent control-plane action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ProvisioningOperation {
    /// Grant `role` to an identity on a service.
    GrantInvokerRole {
        /// Logical identity name.
        identity: String,
        /// IAM member string of the identity.
        member: String,
        /// Logical service name.
        service: String,
        role: String,
    },

    /// Ensure a topic exists before subscriptions are attached to it.
    CreateTopic { topic: String },

    /// Create an HTTP scheduler job calling `uri` with an OIDC token.
    CreateScheduleJob {
        job: String,
        schedule: String,
        time_zone: String,
        uri: String,
        http_method: String,
        audience: String,
        /// Principal (service-account e-mail) used to mint OIDC tokens.
        service_account: String,
        retry: RetryPolicy,
    },

    /// Create a push subscription delivering to `push_endpoint`.
    CreateSubscription {
        subscription: String,
        topic: String,
        push_endpoint: String,
        audience: String,
        service_account: String,
        retry: RetryPolicy,
    },
}

impl ProvisioningOperation {
    /// Natural key used for existence-check-before-create.
    pub fn natural_key(&self) -> NaturalKey {
        match self {
            ProvisioningOperation::GrantInvokerRole {
                member,
                service,
                role,
                ..
            } => NaturalKey::RoleBinding {
                role: role.clone(),
                member: member.clone(),
                resource: service.clone(),
            },
            ProvisioningOperation::CreateTopic { topic } => NaturalKey::Topic {
                name: topic.clone(),
            },
            ProvisioningOperation::CreateScheduleJob { job, .. } => NaturalKey::ScheduleJob {
                name: job.clone(),
            },
            ProvisioningOperation::CreateSubscription { subscription, .. } => {
                NaturalKey::Subscription {
                    name: subscription.clone(),
                }
            }
        }
    }

    /// Short action name, e.g. `grant-invoker-role`.
    pub fn action(&self) -> &'static str {
        match self {
            ProvisioningOperation::GrantInvokerRole { .. } => "grant-invoker-role",
            ProvisioningOperation::CreateTopic { .. } => "create-topic",
            ProvisioningOperation::CreateScheduleJob { .. } => "create-schedule-job",
            ProvisioningOperation::CreateSubscription { .. } => "create-subscription",
        }
    }

    pub fn is_grant(&self) -> bool {
        matches!(self, ProvisioningOperation::GrantInvokerRole { .. })
    }
}

impl fmt::Display for ProvisioningOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisioningOperation::GrantInvokerRole {
                identity,
                service,
                role,
                ..
            } => write!(f, "grant-invoker-role({}, {}) [{}]", identity, service, role),
            ProvisioningOperation::CreateTopic { topic } => write!(f, "create-topic({})", topic),
            ProvisioningOperation::CreateScheduleJob {
                job, schedule, uri, ..
            } => write!(f, "create-schedule-job({}, '{}' -> {})", job, schedule, uri),
            ProvisioningOperation::CreateSubscription {
                subscription,
                topic,
                push_endpoint,
                ..
            } => write!(
                f,
                "create-subscription({} on {} -> {})",
                subscription, topic, push_endpoint
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_natural_key() {
        let op = ProvisioningOperation::GrantInvokerRole {
            identity: "scheduler-invoker-sa".to_string(),
            member: "serviceAccount:sa@p.iam.gserviceaccount.com".to_string(),
            service: "scout-service".to_string(),
            role: RUN_INVOKER_ROLE.to_string(),
        };
        assert_eq!(
            op.natural_key().to_string(),
            "binding:roles/run.invoker:serviceAccount:sa@p.iam.gserviceaccount.com:scout-service"
        );
        assert!(op.is_grant());
    }

    #[test]
    fn test_natural_key_json_shape() {
        let key = NaturalKey::ScheduleJob {
            name: "daily-scout".to_string(),
        };
        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "schedule_job", "name": "daily-scout"}));

        let back: NaturalKey = serde_json::from_value(json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_key_ignores_settings() {
        let a = ProvisioningOperation::CreateSubscription {
            subscription: "email-push".to_string(),
            topic: "email-notifications-topic".to_string(),
            push_endpoint: "https://n.example.run/notifications/handle/email".to_string(),
            audience: "https://n.example.run".to_string(),
            service_account: "push@p.iam.gserviceaccount.com".to_string(),
            retry: RetryPolicy::once(),
        };
        let mut b = a.clone();
        if let ProvisioningOperation::CreateSubscription { push_endpoint, .. } = &mut b {
            *push_endpoint = "https://elsewhere.example.run/".to_string();
        }
        assert_ne!(a, b);
        assert_eq!(a.natural_key(), b.natural_key());
    }
}
