//! Permission engine types.

use permbroker_core::{Inputs, Verdict};
use tokio::task::JoinHandle;

/// A resolved permission decision, broadcast to the registered observer.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub tool_name: String,
    pub inputs: Inputs,
    pub verdict: Verdict,
}

impl Decision {
    pub const fn new(tool_name: String, inputs: Inputs, verdict: Verdict) -> Self {
        Self {
            tool_name,
            inputs,
            verdict,
        }
    }

    /// Whether the tool was allowed to run.
    pub const fn is_allowed(&self) -> bool {
        self.verdict.is_allow()
    }
}

/// Receives every decision the engine reaches, including memory hits.
///
/// Errors and panics raised by an observer are logged and never reach the
/// requester.
pub trait DecisionObserver: Send + Sync {
    fn on_decision(&self, decision: &Decision) -> anyhow::Result<()>;
}

impl<F> DecisionObserver for F
where
    F: Fn(&Decision) -> anyhow::Result<()> + Send + Sync,
{
    fn on_decision(&self, decision: &Decision) -> anyhow::Result<()> {
        self(decision)
    }
}

/// Where a verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    /// Tool-level "always allow" memory.
    ToolMemory,
    /// Exact tool + inputs memory.
    ScopedMemory,
    /// Registered prompt (asynchronous or fallback).
    Authority,
}

/// Final result of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub request_id: String,
    pub verdict: Verdict,
    pub source: ResolutionSource,
}

/// What a single dispatch of a request artifact did.
#[derive(Debug)]
pub enum Outcome {
    /// The artifact is already being processed elsewhere.
    Skipped,
    /// Resolved before `dispatch` returned.
    Resolved(Resolution),
    /// Handed to the asynchronous prompt; the handle completes once the
    /// response artifact has been written.
    Deferred(JoinHandle<Resolution>),
    /// The artifact could not be processed; no response was written.
    Failed(PermissionError),
}

/// Per-request failures.
#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    #[error("Malformed request artifact {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Failed to read request artifact {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
