//! Permission arbitration between the requesting process and a decision authority.
//!
//! Resolves request artifacts from remembered decisions where possible and
//! routes the rest to the registered prompt.

mod engine;
mod inflight;
mod memory;
mod types;

pub use engine::{ArbitrationEngine, EngineConfig};
pub use inflight::{Claim, InFlightSet};
pub use memory::DecisionMemory;
pub use types::{
    Decision, DecisionObserver, Outcome, PermissionError, Resolution, ResolutionSource,
};
