//! Decision authority gateway.
//!
//! A verdict for a request that memory cannot answer comes from exactly one
//! of two prompt strategies:
//! - an asynchronous provider registered at runtime (preferred), whose future
//!   is awaited off the scan loop, or
//! - the blocking fallback prompt, run on the blocking pool under a hard
//!   timeout.
//!
//! Both are normalised to a [`Verdict`]: unknown codes, provider errors,
//! panics and timeouts all become [`Verdict::Deny`].

mod dialog;
mod summary;
mod terminal;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use permbroker_core::{Inputs, Verdict};

pub use dialog::DialogPrompt;
pub use summary::{PromptSummary, SummaryLimits};
pub use terminal::{StaticPrompt, TerminalPrompt};

/// Future of a raw verdict code from an asynchronous provider.
pub type PromptFuture = Pin<Box<dyn Future<Output = anyhow::Result<i64>> + Send + 'static>>;

/// Future of a normalised verdict.
pub type VerdictFuture = Pin<Box<dyn Future<Output = Verdict> + Send + 'static>>;

/// Asynchronous decision surface (e.g. an in-app dialog).
pub trait AsyncPrompt: Send + Sync {
    /// Ask for a decision. The returned future yields a [`Verdict`] code.
    fn request(&self, tool_name: &str, inputs: &Inputs) -> PromptFuture;
}

impl<F> AsyncPrompt for F
where
    F: Fn(&str, &Inputs) -> PromptFuture + Send + Sync,
{
    fn request(&self, tool_name: &str, inputs: &Inputs) -> PromptFuture {
        self(tool_name, inputs)
    }
}

/// Blocking fallback prompt. Called on the blocking thread pool.
pub trait SyncPrompt: Send + Sync {
    /// Ask for a decision and return a [`Verdict`] code.
    fn ask(&self, summary: &PromptSummary) -> anyhow::Result<i64>;
}

/// The strategy chosen for one request.
#[derive(Clone)]
pub enum Authority {
    External(Arc<dyn AsyncPrompt>),
    Fallback {
        prompt: Arc<dyn SyncPrompt>,
        timeout: Duration,
        limits: SummaryLimits,
    },
}

impl std::fmt::Debug for Authority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::External(_) => f.write_str("Authority::External"),
            Self::Fallback { timeout, .. } => f
                .debug_struct("Authority::Fallback")
                .field("timeout", timeout)
                .finish_non_exhaustive(),
        }
    }
}

impl Authority {
    /// Whether the verdict arrives independently of the scan loop.
    pub const fn is_detached(&self) -> bool {
        matches!(self, Self::External(_))
    }

    /// Start resolving a verdict.
    ///
    /// For the external provider the prompt is issued immediately; the
    /// returned future only waits for its answer.
    pub fn resolve(&self, tool_name: &str, inputs: &Inputs) -> VerdictFuture {
        match self {
            Self::External(provider) => {
                let pending = provider.request(tool_name, inputs);
                let tool_name = tool_name.to_string();
                Box::pin(async move {
                    match tokio::spawn(pending).await {
                        Ok(Ok(code)) => Verdict::from_code(code),
                        Ok(Err(e)) => {
                            warn!(tool_name = %tool_name, error = %e, "Prompt provider failed, denying");
                            Verdict::Deny
                        }
                        Err(e) => {
                            warn!(tool_name = %tool_name, error = %e, "Prompt provider aborted, denying");
                            Verdict::Deny
                        }
                    }
                })
            }
            Self::Fallback {
                prompt,
                timeout,
                limits,
            } => {
                let summary = PromptSummary::build(tool_name, inputs, limits);
                let prompt = Arc::clone(prompt);
                let timeout = *timeout;
                Box::pin(async move {
                    let tool_name = summary.tool_name.clone();
                    let task = tokio::task::spawn_blocking(move || prompt.ask(&summary));
                    match tokio::time::timeout(timeout, task).await {
                        Ok(Ok(Ok(code))) => Verdict::from_code(code),
                        Ok(Ok(Err(e))) => {
                            warn!(tool_name = %tool_name, error = %e, "Fallback prompt failed, denying");
                            Verdict::Deny
                        }
                        Ok(Err(e)) => {
                            warn!(tool_name = %tool_name, error = %e, "Fallback prompt panicked, denying");
                            Verdict::Deny
                        }
                        Err(_) => {
                            warn!(
                                tool_name = %tool_name,
                                ?timeout,
                                "Fallback prompt timed out, denying"
                            );
                            Verdict::Deny
                        }
                    }
                })
            }
        }
    }
}

/// Chooses between the registered asynchronous provider and the fallback.
pub struct AuthorityGateway {
    external: RwLock<Option<Arc<dyn AsyncPrompt>>>,
    fallback: Arc<dyn SyncPrompt>,
    prompt_timeout: Duration,
    limits: SummaryLimits,
}

impl AuthorityGateway {
    pub fn new(
        fallback: Arc<dyn SyncPrompt>,
        prompt_timeout: Duration,
        limits: SummaryLimits,
    ) -> Self {
        Self {
            external: RwLock::new(None),
            fallback,
            prompt_timeout,
            limits,
        }
    }

    /// Route future requests to `provider` instead of the fallback.
    pub async fn register_async_prompt(&self, provider: Arc<dyn AsyncPrompt>) {
        *self.external.write().await = Some(provider);
        info!("Asynchronous prompt provider registered");
    }

    /// Return to the fallback prompt.
    pub async fn unregister_async_prompt(&self) {
        if self.external.write().await.take().is_some() {
            info!("Asynchronous prompt provider unregistered");
        }
    }

    pub async fn has_async_prompt(&self) -> bool {
        self.external.read().await.is_some()
    }

    /// Snapshot the strategy for one request.
    pub async fn select(&self) -> Authority {
        let authority = self.external.read().await.clone().map_or_else(
            || Authority::Fallback {
                prompt: Arc::clone(&self.fallback),
                timeout: self.prompt_timeout,
                limits: self.limits,
            },
            Authority::External,
        );
        debug!(?authority, "Selected decision authority");
        authority
    }
}
