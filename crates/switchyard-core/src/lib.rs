//! # switchyard-core
//!
//! Trigger/identity topology model: which service is invoked by which
//! scheduler job or topic subscription, under which identity, with which
//! retry policy.
//!
//! - [`IdentityRegistry`] maps logical identity names to principals.
//! - [`EndpointRegistry`] maps logical service names to base URLs, which are
//!   only known once a service is deployed.
//! - [`TriggerGraph`] holds validated [`TriggerEdge`]s.
//! - [`ProvisioningOperation`] and [`NaturalKey`] describe the idempotent
//!   control-plane actions a planner derives from the graph.
//! - [`config`] loads all of the above from YAML.

pub mod config;
pub mod edge;
pub mod endpoint;
pub mod error;
pub mod graph;
pub mod identity;
pub mod operation;
pub mod retry;

pub use config::{ApplyConfig, ConfigError, EndpointsFile, LogFormat, LoggingConfig, TopologyConfig};
pub use edge::{TriggerEdge, TriggerSource};
pub use endpoint::{Endpoint, EndpointRef, EndpointRegistry};
pub use error::{Result, TopologyError};
pub use graph::{TriggerGraph, WiredEdge};
pub use identity::{Identity, IdentityRegistry, PrincipalKind};
pub use operation::{NaturalKey, ProvisioningOperation, RUN_INVOKER_ROLE};
pub use retry::{RetryConfig, RetryPolicy};
