use async_trait::async_trait;
use switchyard_core::{NaturalKey, ProvisioningOperation, TriggerGraph};
use switchyard_planner::{CurrentState, candidate_operations};

/// Errors returned by a control plane.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvisionError {
    /// The resource already exists. Executors treat this as success.
    #[error("{key} already exists")]
    AlreadyExists { key: String },

    /// Usually IAM propagation lag right after a grant.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("control plane unavailable: {0}")]
    Unavailable(String),

    /// The request can never succeed as issued (bad flags, missing region).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("operation failed: {0}")]
    Failed(String),
}

impl ProvisionError {
    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProvisionError::PermissionDenied(_)
                | ProvisionError::Unavailable(_)
                | ProvisionError::Failed(_)
        )
    }

    pub fn already_exists(key: &NaturalKey) -> Self {
        ProvisionError::AlreadyExists {
            key: key.to_string(),
        }
    }
}

/// The external system that stores IAM bindings, topics, subscriptions and
/// scheduler jobs.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Whether the resource identified by `key` exists.
    async fn exists(&self, key: &NaturalKey) -> Result<bool, ProvisionError>;

    /// Apply a single operation. Must be safe to repeat.
    async fn apply(&self, operation: &ProvisioningOperation) -> Result<(), ProvisionError>;
}

#[async_trait]
impl<T: ControlPlane + ?Sized> ControlPlane for std::sync::Arc<T> {
    async fn exists(&self, key: &NaturalKey) -> Result<bool, ProvisionError> {
        (**self).exists(key).await
    }

    async fn apply(&self, operation: &ProvisioningOperation) -> Result<(), ProvisionError> {
        (**self).apply(operation).await
    }
}

/// Build the current state by asking the control plane about every resource
/// the graph needs.
pub async fn observe<C: ControlPlane + ?Sized>(
    control_plane: &C,
    graph: &TriggerGraph,
) -> Result<CurrentState, ProvisionError> {
    let mut state = CurrentState::new();
    for operation in candidate_operations(graph) {
        let key = operation.natural_key();
        let present = control_plane.exists(&key).await?;
        tracing::debug!(key = %key, present, "Observed control-plane resource");
        if present {
            state.record(key);
        }
    }
    Ok(state)
}
