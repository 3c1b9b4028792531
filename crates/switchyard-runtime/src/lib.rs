//! # switchyard-runtime
//!
//! Executes plans against a [`ControlPlane`]: sequential application with
//! bounded retries, cooperative cancellation and an audit trail of every step.

pub mod audit;
pub mod control_plane;
pub mod executor;
pub mod gcloud;
pub mod memory;

pub use audit::{AuditEvent, AuditSink, JsonLinesAuditSink, TeeAuditSink, TracingAuditSink};
pub use control_plane::{ControlPlane, ProvisionError, observe};
pub use executor::{ExecutionReport, Executor, StepOutcome, StepStatus};
pub use gcloud::{GcloudControlPlane, GcloudSettings};
pub use memory::InMemoryControlPlane;
