//! Agent orchestration - the step loop, its observers, and the run registry
//!
//! One engine drives every scope: the root agent and each delegated
//! sub-agent run the same loop over different dispatchers. Runs register
//! with a [`RunRegistry`] so callers can cancel by id.

mod engine;
pub mod observer;
mod registry;

pub use engine::{AgentEngine, RunOutcome};
pub use observer::{AgentObserver, NullObserver, ProgressEntry, ProgressKind};
pub use registry::{RunGuard, RunRegistry};
