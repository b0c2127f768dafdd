//! `permbroker` Daemon
//!
//! Answers permission requests that an automation agent drops into the
//! shared permission directory.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::info;

use permbroker_core::Verdict;
use permbroker_core::config::load_config;
use permbroker_daemon::PermissionService;
use permbroker_daemon::gateway::{
    DialogPrompt, StaticPrompt, SummaryLimits, SyncPrompt, TerminalPrompt,
};
use permbroker_daemon::permission::Decision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PromptMode {
    /// Queue requests to a dialog offering Allow / Always allow / Deny.
    Dialog,
    /// Blocking Allow / Deny prompt on the terminal.
    Terminal,
    /// Deny everything without asking.
    Deny,
    /// Allow everything without asking.
    Allow,
}

#[derive(Parser, Debug)]
#[command(name = "permbroker-daemon")]
#[command(version, about = "permbroker daemon - tool permission arbitration")]
struct Args {
    /// Settings file (JSON). Overrides the global settings file.
    #[arg(long, env = "PERMBROKER_CONFIG")]
    config: Option<PathBuf>,

    /// Shared permission directory
    #[arg(long)]
    dir: Option<PathBuf>,

    /// How undecided requests are answered.
    #[arg(long, value_enum, default_value_t = PromptMode::Dialog, env = "PERMBROKER_PROMPT")]
    prompt: PromptMode,

    /// Seconds before an unanswered terminal prompt denies.
    #[arg(long)]
    prompt_timeout: Option<u64>,

    /// Log level filter for the daemon (e.g. "info", "debug", "warn").
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "PERMBROKER_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(dir) = args.dir {
        config.broker.permission_dir = Some(dir);
    }
    if let Some(secs) = args.prompt_timeout {
        config.prompt.timeout_secs = secs;
    }
    if let Some(level) = args.log_level {
        config.broker.log_level = level;
    }

    let log_filter = format!(
        "permbroker_daemon={level},permbroker_core={level}",
        level = config.broker.log_level
    );
    permbroker_core::tracing_init::init_tracing(&log_filter, args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        dir = %config.permission_dir().display(),
        prompt = ?args.prompt,
        "Starting permbroker-daemon"
    );

    let fallback: Arc<dyn SyncPrompt> = match args.prompt {
        PromptMode::Dialog | PromptMode::Terminal => Arc::new(TerminalPrompt::binary()),
        PromptMode::Deny => Arc::new(StaticPrompt::new(Verdict::Deny)),
        PromptMode::Allow => Arc::new(StaticPrompt::new(Verdict::Allow)),
    };
    let service = PermissionService::new(&config, fallback);

    let dialog_worker = if args.prompt == PromptMode::Dialog {
        let (dialog, worker) = DialogPrompt::spawn(
            Arc::new(TerminalPrompt::with_always()),
            SummaryLimits::from(&config.prompt),
        );
        service.register_async_prompt(Arc::new(dialog)).await;
        Some(worker)
    } else {
        None
    };

    let log_decision = |decision: &Decision| -> anyhow::Result<()> {
        info!(
            tool_name = %decision.tool_name,
            verdict = %decision.verdict,
            allowed = decision.is_allowed(),
            "Permission decision"
        );
        Ok(())
    };
    service.set_observer(Arc::new(log_decision)).await;

    service.start().await;

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    service.stop().await;
    service.unregister_async_prompt().await;
    if let Some(worker) = dialog_worker {
        worker.abort();
    }

    info!("Daemon stopped");
    Ok(())
}
