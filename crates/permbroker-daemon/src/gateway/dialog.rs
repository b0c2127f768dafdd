//! Asynchronous dialog provider.
//!
//! Requests are queued to a single worker that shows one dialog at a time;
//! each caller gets its answer back on a oneshot channel. The scan loop
//! never waits on the dialog.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use permbroker_core::Inputs;

use super::{AsyncPrompt, PromptFuture, PromptSummary, SummaryLimits, SyncPrompt};

/// Queue depth before new requests wait for a slot.
const DIALOG_QUEUE_CAPACITY: usize = 64;

struct DialogJob {
    summary: PromptSummary,
    reply: oneshot::Sender<anyhow::Result<i64>>,
}

/// Asynchronous prompt backed by a dialog worker task.
#[derive(Clone)]
pub struct DialogPrompt {
    jobs: mpsc::Sender<DialogJob>,
    limits: SummaryLimits,
}

impl DialogPrompt {
    /// Spawn the dialog worker. `chooser` renders each dialog; it runs on
    /// the blocking pool.
    ///
    /// The worker exits once every `DialogPrompt` clone has been dropped.
    pub fn spawn(chooser: Arc<dyn SyncPrompt>, limits: SummaryLimits) -> (Self, JoinHandle<()>) {
        let (jobs, mut rx) = mpsc::channel::<DialogJob>(DIALOG_QUEUE_CAPACITY);

        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if job.reply.is_closed() {
                    debug!(tool_name = %job.summary.tool_name, "Dialog abandoned before display");
                    continue;
                }
                let chooser = Arc::clone(&chooser);
                let summary = job.summary;
                let answer = match tokio::task::spawn_blocking(move || chooser.ask(&summary)).await {
                    Ok(answer) => answer,
                    Err(e) => Err(anyhow::anyhow!("dialog panicked: {e}")),
                };
                if job.reply.send(answer).is_err() {
                    warn!("Dialog answered after its request was dropped");
                }
            }
            info!("Dialog worker stopped");
        });

        (Self { jobs, limits }, worker)
    }
}

impl AsyncPrompt for DialogPrompt {
    fn request(&self, tool_name: &str, inputs: &Inputs) -> PromptFuture {
        let summary = PromptSummary::build(tool_name, inputs, &self.limits);
        let jobs = self.jobs.clone();
        Box::pin(async move {
            let (reply, answer) = oneshot::channel();
            jobs.send(DialogJob { summary, reply })
                .await
                .map_err(|_| anyhow::anyhow!("dialog worker is not running"))?;
            answer
                .await
                .map_err(|_| anyhow::anyhow!("dialog worker dropped the request"))?
        })
    }
}
