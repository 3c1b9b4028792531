//! # switchyard-planner
//!
//! Turns a [`TriggerGraph`](switchyard_core::TriggerGraph) and the current
//! control-plane state into an ordered, idempotent [`Plan`].
//!
//! Planning is a pure, synchronous function: it never talks to the control
//! plane. Callers either load a [`CurrentState`] from a state file or build
//! one by querying the control plane (see `switchyard-runtime`).

pub mod plan;
pub mod state;

pub use plan::{DiffPlanner, Plan, PlanStep, Planner, already_applied, candidate_operations, plan};
pub use state::{CurrentState, StateError};
