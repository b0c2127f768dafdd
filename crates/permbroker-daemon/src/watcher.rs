//! Request store watcher.
//!
//! Polls the shared directory instead of relying on filesystem
//! notifications, which are unreliable on some temp filesystems.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use permbroker_core::protocol::is_request_file_name;

use crate::permission::{ArbitrationEngine, Outcome};

/// Shortest scan period; a zero period cannot drive a tokio interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Scans the shared directory and hands each request artifact to the engine.
#[derive(Clone)]
pub struct RequestWatcher {
    dir: PathBuf,
    engine: ArbitrationEngine,
    interval: Duration,
}

impl RequestWatcher {
    pub fn new(dir: PathBuf, engine: ArbitrationEngine, interval: Duration) -> Self {
        if interval < MIN_POLL_INTERVAL {
            warn!(interval = ?interval, minimum = ?MIN_POLL_INTERVAL, "Poll interval too short, clamping");
        }
        Self {
            dir,
            engine,
            interval: interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// One pass over the directory. Requests are dispatched serially, in
    /// file name order; the directory is created if missing.
    pub async fn scan_once(&self) -> std::io::Result<Vec<Outcome>> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(name) = name.to_str() {
                if is_request_file_name(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();

        let mut outcomes = Vec::with_capacity(names.len());
        for name in names {
            debug!(artifact = %name, "Found request artifact");
            outcomes.push(self.engine.dispatch(&self.dir.join(&name)).await);
        }
        Ok(outcomes)
    }

    /// Run the scan loop until `shutdown` flips to `true`.
    ///
    /// Shutdown is observed between scans; a scan in progress (including a
    /// fallback prompt) finishes first.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(dir = %self.dir.display(), interval = ?self.interval, "Started polling");
            let mut timer = tokio::time::interval(self.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    _ = timer.tick() => {
                        if let Err(e) = self.scan_once().await {
                            warn!(dir = %self.dir.display(), error = %e, "Scan failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            info!(dir = %self.dir.display(), "Stopped polling");
        })
    }
}
