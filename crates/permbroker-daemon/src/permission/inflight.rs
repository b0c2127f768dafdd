//! Set of request artifacts currently being processed.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

/// Artifact names claimed by an in-progress resolution.
///
/// Shared between the scan loop and asynchronous completions; a name stays
/// claimed until its [`Claim`] is dropped.
#[derive(Debug, Clone, Default)]
pub struct InFlightSet {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id`. Returns `None` when someone else already holds it.
    pub fn try_claim(&self, id: &str) -> Option<Claim> {
        if !self.lock().insert(id.to_string()) {
            return None;
        }
        trace!(id, "Claimed request artifact");
        Some(Claim {
            id: id.to_string(),
            ids: Arc::clone(&self.ids),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive hold on one artifact name; released on drop.
#[derive(Debug)]
pub struct Claim {
    id: String,
    ids: Arc<Mutex<HashSet<String>>>,
}

impl Claim {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Release explicitly. Equivalent to dropping the claim.
    pub fn release(self) {}
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
        trace!(id = %self.id, "Released request artifact");
    }
}
