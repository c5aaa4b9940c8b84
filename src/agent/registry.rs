//! RunRegistry - live runs keyed by id, each holding its cancellation token
//!
//! The orchestration boundary owns one registry. A run acquires a slot for
//! its lifetime and releases it on drop, so a caller holding only the run id
//! can cancel from another task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Registry of active runs
#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<String, CancellationToken>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run and hand back a guard scoped to its lifetime
    ///
    /// The slot is released when the guard drops, whether the run finished,
    /// errored, or was cancelled.
    pub fn acquire(self: &Arc<Self>, run_id: &str) -> RunGuard {
        debug!(%run_id, "RunRegistry::acquire: called");
        let token = CancellationToken::new();
        self.runs.lock().unwrap().insert(run_id.to_string(), token.clone());
        RunGuard {
            registry: Arc::clone(self),
            run_id: run_id.to_string(),
            token,
        }
    }

    /// Cancel a run by id; false when no such run is active
    pub fn cancel(&self, run_id: &str) -> bool {
        debug!(%run_id, "RunRegistry::cancel: called");
        match self.runs.lock().unwrap().get(run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, run_id: &str) -> bool {
        self.runs.lock().unwrap().contains_key(run_id)
    }

    pub fn active_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }
}

/// Scoped registration of one run
///
/// Carries the run's cancellation token; dropping the guard removes the
/// run from the registry.
#[derive(Debug)]
pub struct RunGuard {
    registry: Arc<RunRegistry>,
    run_id: String,
    token: CancellationToken,
}

impl RunGuard {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        debug!(run_id = %self.run_id, "RunGuard::drop: releasing run");
        self.registry.runs.lock().unwrap().remove(&self.run_id);
    }
}
