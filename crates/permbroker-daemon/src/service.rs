//! Permission service lifecycle.
//!
//! Owns the engine and the scan loop. Built once at startup and shared by
//! reference; there is no global instance.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use permbroker_core::Config;

use crate::gateway::{AsyncPrompt, SyncPrompt};
use crate::permission::{ArbitrationEngine, DecisionMemory, DecisionObserver, EngineConfig};
use crate::store::ResponseWriter;
use crate::watcher::RequestWatcher;

struct Running {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Watches the shared directory and answers permission requests.
pub struct PermissionService {
    dir: PathBuf,
    poll_interval: Duration,
    shutdown_timeout: Duration,
    engine: ArbitrationEngine,
    running: Mutex<Option<Running>>,
}

impl PermissionService {
    /// Create a stopped service. `fallback` answers requests while no
    /// asynchronous prompt is registered.
    pub fn new(config: &Config, fallback: Arc<dyn SyncPrompt>) -> Self {
        let dir = config.permission_dir();
        let engine = ArbitrationEngine::new(
            ResponseWriter::new(dir.clone()),
            fallback,
            EngineConfig::from(config),
        );
        Self {
            dir,
            poll_interval: config.poll_interval(),
            shutdown_timeout: config.shutdown_timeout(),
            engine,
            running: Mutex::new(None),
        }
    }

    pub fn permission_dir(&self) -> &Path {
        &self.dir
    }

    pub const fn engine(&self) -> &ArbitrationEngine {
        &self.engine
    }

    pub const fn memory(&self) -> &DecisionMemory {
        self.engine.memory()
    }

    /// Start polling. Returns `false` if already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return false;
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            // The scan loop retries on every tick.
            warn!(dir = %self.dir.display(), error = %e, "Could not create permission directory");
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let watcher = RequestWatcher::new(self.dir.clone(), self.engine.clone(), self.poll_interval);
        let handle = watcher.spawn(shutdown_rx);
        *running = Some(Running {
            shutdown_tx,
            handle,
        });
        drop(running);

        info!(dir = %self.dir.display(), "Permission service started");
        true
    }

    /// Stop polling and wait (bounded) for the scan loop to exit.
    ///
    /// Asynchronous prompts still open keep running and write their
    /// responses when answered.
    pub async fn stop(&self) {
        let Some(Running {
            shutdown_tx,
            handle,
        }) = self.running.lock().await.take()
        else {
            return;
        };

        let _ = shutdown_tx.send(true);
        match tokio::time::timeout(self.shutdown_timeout, handle).await {
            Ok(Ok(())) => info!("Permission service stopped"),
            Ok(Err(e)) => warn!(error = %e, "Scan loop ended abnormally"),
            Err(_) => warn!(
                timeout = ?self.shutdown_timeout,
                "Scan loop did not stop in time, detaching"
            ),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn set_observer(&self, observer: Arc<dyn DecisionObserver>) {
        self.engine.set_observer(observer).await;
    }

    pub async fn clear_observer(&self) {
        self.engine.clear_observer().await;
    }

    pub async fn register_async_prompt(&self, provider: Arc<dyn AsyncPrompt>) {
        self.engine.register_async_prompt(provider).await;
    }

    pub async fn unregister_async_prompt(&self) {
        self.engine.unregister_async_prompt().await;
    }
}
