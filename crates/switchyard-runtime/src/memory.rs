//! In-memory control plane.
//!
//! Backs the CLI's `local` backend (seeded from and saved to a state file)
//! and the executor tests, which script failures per natural key.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use switchyard_core::{NaturalKey, ProvisioningOperation};
use switchyard_planner::CurrentState;

use crate::control_plane::{ControlPlane, ProvisionError};

#[derive(Debug, Default)]
pub struct InMemoryControlPlane {
    state: Mutex<CurrentState>,
    scripted_failures: Mutex<HashMap<NaturalKey, VecDeque<ProvisionError>>>,
    apply_calls: Mutex<Vec<NaturalKey>>,
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: CurrentState) -> Self {
        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    /// Make the next `times` applies of `key` fail with `error`.
    pub fn fail_times(&self, key: NaturalKey, times: usize, error: ProvisionError) {
        let mut failures = self
            .scripted_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        failures
            .entry(key)
            .or_default()
            .extend(std::iter::repeat_n(error, times));
    }

    /// Current contents.
    pub fn snapshot(&self) -> CurrentState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Keys passed to `apply`, in call order, including failed calls.
    pub fn apply_calls(&self) -> Vec<NaturalKey> {
        self.apply_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn exists(&self, key: &NaturalKey) -> Result<bool, ProvisionError> {
        Ok(self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key))
    }

    async fn apply(&self, operation: &ProvisioningOperation) -> Result<(), ProvisionError> {
        let key = operation.natural_key();
        self.apply_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.clone());

        let scripted = self
            .scripted_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        if let Some(error) = scripted {
            return Err(error);
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.record(key.clone()) {
            return Err(ProvisionError::already_exists(&key));
        }
        Ok(())
    }
}
