//! Structural error types for the topology model.
//!
//! Everything in here is a configuration bug: these errors are raised while
//! registries and the trigger graph are being built, before any provisioning
//! operation exists, and they are never retried.

use thiserror::Error;

/// Result alias used throughout switchyard-core.
pub type Result<T> = std::result::Result<T, TopologyError>;

/// Errors raised while building or querying the topology.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// A trigger referenced an identity that is not in the registry.
    #[error("unknown identity '{name}'")]
    UnknownIdentity {
        /// The identity name that failed to resolve.
        name: String,
    },

    /// A service has no known base URL yet (not deployed or never registered).
    #[error("endpoint '{name}' is unresolved: no base URL has been registered")]
    UnresolvedEndpoint {
        /// The logical service name.
        name: String,
    },

    /// A trigger edge failed validation and was not added to the graph.
    #[error("invalid trigger edge '{edge}': {reason}")]
    InvalidEdge {
        /// Name of the rejected edge.
        edge: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Retry policy bounds are inconsistent.
    #[error("invalid retry policy: {0}")]
    InvalidRetryPolicy(String),

    /// The same identity name was registered twice.
    #[error("identity '{name}' is already registered")]
    DuplicateIdentity {
        /// The duplicated identity name.
        name: String,
    },

    /// A registered base URL is not an absolute http(s) URL.
    #[error("invalid URL '{url}' for endpoint '{name}': {reason}")]
    InvalidUrl {
        /// The logical service name.
        name: String,
        /// The rejected URL.
        url: String,
        /// Parser or scheme failure.
        reason: String,
    },
}

impl TopologyError {
    /// Wrap any error as an [`TopologyError::InvalidEdge`] for the named edge.
    pub fn invalid_edge(edge: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidEdge {
            edge: edge.into(),
            reason: reason.to_string(),
        }
    }

    /// Name of the edge this error refers to, if any.
    pub fn edge_name(&self) -> Option<&str> {
        match self {
            Self::InvalidEdge { edge, .. } => Some(edge),
            _ => None,
        }
    }
}
