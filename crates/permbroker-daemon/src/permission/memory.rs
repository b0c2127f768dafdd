//! Remembered permission decisions.
//!
//! Two independent caches live for the whole process and are never evicted:
//! a tool-level map (`tool -> always allow`) and a scoped map keyed by tool
//! name plus the structural fingerprint of the inputs. Scoped keys are
//! order-sensitive: the same inputs written with keys in a different order do
//! not match.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use permbroker_core::protocol::inputs_fingerprint;
use permbroker_core::{Inputs, Verdict};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ScopeKey {
    tool_name: String,
    fingerprint: String,
}

impl ScopeKey {
    fn new(tool_name: &str, inputs: &Inputs) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            fingerprint: inputs_fingerprint(inputs),
        }
    }
}

/// Shared decision memory. Clones share the same caches.
#[derive(Debug, Clone, Default)]
pub struct DecisionMemory {
    tool_level: Arc<RwLock<HashMap<String, bool>>>,
    scoped: Arc<RwLock<HashMap<ScopeKey, Verdict>>>,
}

impl DecisionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tool-level memory for `tool_name`, if any.
    pub async fn lookup_tool_level(&self, tool_name: &str) -> Option<bool> {
        self.tool_level.read().await.get(tool_name).copied()
    }

    /// Verdict remembered for exactly this tool and inputs.
    pub async fn lookup_scoped(&self, tool_name: &str, inputs: &Inputs) -> Option<Verdict> {
        let key = ScopeKey::new(tool_name, inputs);
        self.scoped.read().await.get(&key).copied()
    }

    pub async fn remember_tool_level(&self, tool_name: &str, allow: bool) {
        self.tool_level
            .write()
            .await
            .insert(tool_name.to_string(), allow);
        debug!(tool_name, allow, "Remembered tool-level decision");
    }

    pub async fn remember_scoped(&self, tool_name: &str, inputs: &Inputs, verdict: Verdict) {
        let key = ScopeKey::new(tool_name, inputs);
        self.scoped.write().await.insert(key, verdict);
        debug!(tool_name, %verdict, "Remembered scoped decision");
    }

    pub async fn tool_level_len(&self) -> usize {
        self.tool_level.read().await.len()
    }

    pub async fn scoped_len(&self) -> usize {
        self.scoped.read().await.len()
    }
}
