//! Decision arbitration engine.
//!
//! Resolves each request artifact in order: tool-level memory, scoped
//! memory, then the decision authority. Only an authority verdict of
//! `AllowAlways` writes memory, and it writes the tool-level cache.
//!
//! Artifact lifecycle per path:
//! - memory hit and fallback prompt: the response is written, then the
//!   request artifact is removed, before `dispatch` returns;
//! - asynchronous prompt: the request artifact is removed immediately and
//!   the response is written when the prompt answers. The in-flight claim is
//!   held until then.

use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use permbroker_core::{Config, PermissionRequest, Verdict};

use crate::gateway::{AsyncPrompt, AuthorityGateway, SummaryLimits, SyncPrompt};
use crate::store::{self, ResponseWriter};

use super::inflight::{Claim, InFlightSet};
use super::memory::DecisionMemory;
use super::types::{
    Decision, DecisionObserver, Outcome, PermissionError, Resolution, ResolutionSource,
};

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Grace period between claiming an artifact and reading it, for
    /// requesters that create the file before filling it.
    pub settle_delay: Duration,
    /// Hard bound on the fallback prompt.
    pub prompt_timeout: Duration,
    pub summary_limits: SummaryLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            settle_delay: config.settle_delay(),
            prompt_timeout: config.prompt_timeout(),
            summary_limits: SummaryLimits::from(&config.prompt),
        }
    }
}

/// Arbitration engine. Clones share memory, observer and in-flight state.
#[derive(Clone)]
pub struct ArbitrationEngine {
    memory: DecisionMemory,
    gateway: Arc<AuthorityGateway>,
    writer: ResponseWriter,
    in_flight: InFlightSet,
    observer: Arc<RwLock<Option<Arc<dyn DecisionObserver>>>>,
    settle_delay: Duration,
}

impl ArbitrationEngine {
    /// Create an engine writing responses into `writer`'s directory and
    /// falling back to `fallback` when no asynchronous prompt is registered.
    pub fn new(writer: ResponseWriter, fallback: Arc<dyn SyncPrompt>, config: EngineConfig) -> Self {
        Self {
            memory: DecisionMemory::new(),
            gateway: Arc::new(AuthorityGateway::new(
                fallback,
                config.prompt_timeout,
                config.summary_limits,
            )),
            writer,
            in_flight: InFlightSet::new(),
            observer: Arc::new(RwLock::new(None)),
            settle_delay: config.settle_delay,
        }
    }

    pub const fn memory(&self) -> &DecisionMemory {
        &self.memory
    }

    pub const fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    pub async fn register_async_prompt(&self, provider: Arc<dyn AsyncPrompt>) {
        self.gateway.register_async_prompt(provider).await;
    }

    pub async fn unregister_async_prompt(&self) {
        self.gateway.unregister_async_prompt().await;
    }

    /// Replace the decision observer.
    pub async fn set_observer(&self, observer: Arc<dyn DecisionObserver>) {
        *self.observer.write().await = Some(observer);
    }

    pub async fn clear_observer(&self) {
        *self.observer.write().await = None;
    }

    /// Process one request artifact.
    pub async fn dispatch(&self, path: &Path) -> Outcome {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!(path = %path.display(), "Ignoring request artifact with non UTF-8 name");
            return Outcome::Skipped;
        };

        let Some(claim) = self.in_flight.try_claim(name) else {
            debug!(artifact = name, "Request already in progress, skipping");
            return Outcome::Skipped;
        };

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let request = match store::read_request(path).await {
            Ok(request) => request,
            Err(e @ PermissionError::Malformed { .. }) => {
                warn!(error = %e, "Discarding malformed request artifact");
                store::remove_request(path).await;
                return Outcome::Failed(e);
            }
            Err(e) => {
                warn!(error = %e, "Could not read request artifact");
                return Outcome::Failed(e);
            }
        };

        info!(
            request_id = %request.request_id,
            tool_name = %request.tool_name,
            "Permission request received"
        );

        self.resolve(path, request, claim).await
    }

    async fn resolve(&self, path: &Path, request: PermissionRequest, claim: Claim) -> Outcome {
        // 1. Tool-level memory
        if let Some(allow) = self.memory.lookup_tool_level(&request.tool_name).await {
            let verdict = if allow { Verdict::AllowAlways } else { Verdict::Deny };
            debug!(
                request_id = %request.request_id,
                tool_name = %request.tool_name,
                %verdict,
                "Tool-level memory hit"
            );
            let outcome = self
                .finish(path, request, verdict, ResolutionSource::ToolMemory)
                .await;
            drop(claim);
            return outcome;
        }

        // 2. Scoped memory
        if let Some(verdict) = self
            .memory
            .lookup_scoped(&request.tool_name, &request.inputs)
            .await
        {
            debug!(
                request_id = %request.request_id,
                tool_name = %request.tool_name,
                %verdict,
                "Scoped memory hit"
            );
            let outcome = self
                .finish(path, request, verdict, ResolutionSource::ScopedMemory)
                .await;
            drop(claim);
            return outcome;
        }

        // 3. Decision authority
        let authority = self.gateway.select().await;
        if authority.is_detached() {
            // Nothing else stops the next scan from picking the artifact up
            // again while the prompt is open.
            store::remove_request(path).await;

            let pending = authority.resolve(&request.tool_name, &request.inputs);
            let engine = self.clone();
            let handle = tokio::spawn(async move {
                let verdict = pending.await;
                engine.memorize(&request, verdict).await;
                let resolution = engine
                    .respond(request, verdict, ResolutionSource::Authority)
                    .await;
                drop(claim);
                resolution
            });
            return Outcome::Deferred(handle);
        }

        let verdict = authority
            .resolve(&request.tool_name, &request.inputs)
            .await;
        self.memorize(&request, verdict).await;
        let outcome = self
            .finish(path, request, verdict, ResolutionSource::Authority)
            .await;
        drop(claim);
        outcome
    }

    async fn memorize(&self, request: &PermissionRequest, verdict: Verdict) {
        if verdict == Verdict::AllowAlways {
            self.memory
                .remember_tool_level(&request.tool_name, true)
                .await;
            info!(tool_name = %request.tool_name, "Tool will be allowed without asking");
        }
    }

    /// Respond, then remove the request artifact.
    async fn finish(
        &self,
        path: &Path,
        request: PermissionRequest,
        verdict: Verdict,
        source: ResolutionSource,
    ) -> Outcome {
        let request_id = request.request_id.clone();
        self.writer.write(&request_id, verdict.is_allow()).await;
        store::remove_request(path).await;
        self.notify(Decision::new(request.tool_name, request.inputs, verdict))
            .await;
        info!(request_id = %request_id, %verdict, ?source, "Permission request resolved");
        Outcome::Resolved(Resolution {
            request_id,
            verdict,
            source,
        })
    }

    /// Respond for a request whose artifact is already gone.
    async fn respond(
        &self,
        request: PermissionRequest,
        verdict: Verdict,
        source: ResolutionSource,
    ) -> Resolution {
        let request_id = request.request_id.clone();
        self.writer.write(&request_id, verdict.is_allow()).await;
        self.notify(Decision::new(request.tool_name, request.inputs, verdict))
            .await;
        info!(request_id = %request_id, %verdict, ?source, "Permission request resolved");
        Resolution {
            request_id,
            verdict,
            source,
        }
    }

    async fn notify(&self, decision: Decision) {
        let observer = self.observer.read().await.clone();
        let Some(observer) = observer else {
            return;
        };

        match std::panic::catch_unwind(AssertUnwindSafe(|| observer.on_decision(&decision))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(tool_name = %decision.tool_name, error = %e, "Decision observer failed");
            }
            Err(_) => {
                error!(tool_name = %decision.tool_name, "Decision observer panicked");
            }
        }
    }
}
