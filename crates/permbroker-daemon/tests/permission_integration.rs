#![allow(clippy::unwrap_used, clippy::panic)] // Integration tests use unwrap for brevity

//! Integration tests for the permission broker.
//!
//! Tests the full flow: request artifact → memory / prompt → response
//! artifact → observer.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use permbroker_core::{Config, Inputs, PermissionReply, Verdict};
use permbroker_daemon::PermissionService;
use permbroker_daemon::gateway::{PromptFuture, PromptSummary, SummaryLimits, SyncPrompt};
use permbroker_daemon::permission::{
    ArbitrationEngine, Decision, DecisionObserver, EngineConfig, Outcome, ResolutionSource,
};
use permbroker_daemon::store::ResponseWriter;
use permbroker_daemon::watcher::RequestWatcher;

/// Fallback prompt that records how often it was asked.
struct ScriptedPrompt {
    code: i64,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedPrompt {
    fn answering(code: i64) -> Arc<Self> {
        Arc::new(Self {
            code,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    fn stalling(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            code: Verdict::Allow.code(),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SyncPrompt for ScriptedPrompt {
    fn ask(&self, _summary: &PromptSummary) -> anyhow::Result<i64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(self.code)
    }
}

#[derive(Default)]
struct Recorder {
    decisions: Mutex<Vec<Decision>>,
}

impl Recorder {
    fn decisions(&self) -> Vec<Decision> {
        self.decisions.lock().unwrap().clone()
    }
}

impl DecisionObserver for Recorder {
    fn on_decision(&self, decision: &Decision) -> anyhow::Result<()> {
        self.decisions.lock().unwrap().push(decision.clone());
        Ok(())
    }
}

fn engine(dir: &Path, fallback: Arc<dyn SyncPrompt>, settle: Duration, timeout: Duration) -> ArbitrationEngine {
    ArbitrationEngine::new(
        ResponseWriter::new(dir.to_path_buf()),
        fallback,
        EngineConfig {
            settle_delay: settle,
            prompt_timeout: timeout,
            summary_limits: SummaryLimits::default(),
        },
    )
}

fn write_request(dir: &Path, request_id: &str, tool_name: &str, inputs: &str) -> PathBuf {
    let path = dir.join(format!("request-{request_id}.json"));
    std::fs::write(
        &path,
        format!(r#"{{"requestId":"{request_id}","toolName":"{tool_name}","inputs":{inputs}}}"#),
    )
    .unwrap();
    path
}

fn response(dir: &Path, request_id: &str) -> Option<PermissionReply> {
    let body = std::fs::read_to_string(dir.join(format!("response-{request_id}.json"))).ok()?;
    Some(serde_json::from_str(&body).unwrap())
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn end_to_end_fallback_allow() {
    let root = TempDir::new().unwrap();
    let dir = root.path().join("claude-permission");

    let mut config = Config::default();
    config.broker.permission_dir = Some(dir.clone());
    config.broker.poll_interval_ms = 20;

    let prompt = ScriptedPrompt::answering(Verdict::Allow.code());
    let service = PermissionService::new(&config, prompt.clone());
    let recorder = Arc::new(Recorder::default());
    service.set_observer(recorder.clone()).await;
    assert!(service.start().await);

    let request = write_request(&dir, "r1", "Bash", r#"{"command":"ls"}"#);
    wait_for(|| recorder.decisions().len() == 1).await;

    assert_eq!(response(&dir, "r1"), Some(PermissionReply { allow: true }));
    assert!(!request.exists());

    let decisions = recorder.decisions();
    let expected: Inputs = serde_json::from_str(r#"{"command":"ls"}"#).unwrap();
    assert_eq!(
        decisions[0],
        Decision::new("Bash".to_string(), expected, Verdict::Allow)
    );
    assert_eq!(prompt.calls(), 1);

    service.stop().await;
    assert!(!service.is_running().await);
}

#[tokio::test]
async fn tool_memory_precedence() {
    let dir = TempDir::new().unwrap();
    let prompt = ScriptedPrompt::answering(Verdict::Deny.code());
    let engine = engine(dir.path(), prompt.clone(), Duration::ZERO, Duration::from_secs(5));
    engine.memory().remember_tool_level("Write", true).await;

    for (id, inputs) in [
        ("w1", r#"{"file_path":"/a","content":"x"}"#),
        ("w2", r#"{"content":"x","file_path":"/a"}"#),
        ("w3", r#"{"file_path":"/etc/shadow"}"#),
    ] {
        let path = write_request(dir.path(), id, "Write", inputs);
        let Outcome::Resolved(resolution) = engine.dispatch(&path).await else {
            panic!("expected memory resolution");
        };
        assert_eq!(resolution.verdict, Verdict::AllowAlways);
        assert_eq!(resolution.source, ResolutionSource::ToolMemory);
        assert_eq!(response(dir.path(), id), Some(PermissionReply { allow: true }));
    }
    assert_eq!(prompt.calls(), 0);
}

#[tokio::test]
async fn allow_always_never_writes_scoped_memory() {
    let dir = TempDir::new().unwrap();
    let prompt = ScriptedPrompt::answering(Verdict::AllowAlways.code());
    let engine = engine(dir.path(), prompt.clone(), Duration::ZERO, Duration::from_secs(5));

    let first = write_request(dir.path(), "b1", "Bash", r#"{"command":"ls"}"#);
    engine.dispatch(&first).await;
    let repeat = write_request(dir.path(), "b2", "Bash", r#"{"command":"ls"}"#);
    let Outcome::Resolved(resolution) = engine.dispatch(&repeat).await else {
        panic!("expected resolution");
    };

    assert_eq!(resolution.source, ResolutionSource::ToolMemory);
    assert_eq!(engine.memory().scoped_len().await, 0);
    assert_eq!(engine.memory().lookup_tool_level("Bash").await, Some(true));
    assert_eq!(prompt.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_scans_resolve_once() {
    let dir = TempDir::new().unwrap();
    let prompt = ScriptedPrompt::answering(Verdict::Allow.code());
    let engine = engine(
        dir.path(),
        prompt.clone(),
        Duration::from_millis(50),
        Duration::from_secs(5),
    );
    let recorder = Arc::new(Recorder::default());
    engine.set_observer(recorder.clone()).await;
    let request = write_request(dir.path(), "dup", "Bash", r#"{"command":"make"}"#);

    let watcher = RequestWatcher::new(dir.path().to_path_buf(), engine, Duration::from_secs(1));
    let scans: Vec<_> = (0..8)
        .map(|_| {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.scan_once().await.unwrap() })
        })
        .collect();

    let mut resolved = 0;
    for scan in scans {
        for outcome in scan.await.unwrap() {
            if matches!(outcome, Outcome::Resolved(_)) {
                resolved += 1;
            }
        }
    }

    assert_eq!(resolved, 1);
    assert_eq!(prompt.calls(), 1);
    assert_eq!(recorder.decisions().len(), 1);
    assert!(!request.exists());
    assert_eq!(response(dir.path(), "dup"), Some(PermissionReply { allow: true }));
}

#[tokio::test]
async fn ambiguous_code_denies() {
    let dir = TempDir::new().unwrap();
    let engine = engine(
        dir.path(),
        ScriptedPrompt::answering(0),
        Duration::ZERO,
        Duration::from_secs(5),
    );
    let recorder = Arc::new(Recorder::default());
    engine.set_observer(recorder.clone()).await;

    let path = write_request(dir.path(), "q", "Bash", r#"{"command":"ls"}"#);
    engine.dispatch(&path).await;

    assert_eq!(response(dir.path(), "q"), Some(PermissionReply { allow: false }));
    assert_eq!(recorder.decisions()[0].verdict, Verdict::Deny);
}

#[tokio::test]
async fn fallback_timeout_denies() {
    let dir = TempDir::new().unwrap();
    let prompt = ScriptedPrompt::stalling(Duration::from_millis(500));
    let engine = engine(
        dir.path(),
        prompt.clone(),
        Duration::ZERO,
        Duration::from_millis(50),
    );

    let path = write_request(dir.path(), "slow", "Bash", r#"{"command":"sleep 100"}"#);
    let Outcome::Resolved(resolution) = engine.dispatch(&path).await else {
        panic!("expected resolution");
    };

    assert_eq!(resolution.verdict, Verdict::Deny);
    assert_eq!(response(dir.path(), "slow"), Some(PermissionReply { allow: false }));
    assert!(!path.exists());
}

#[tokio::test]
async fn late_filled_request_resolves_after_settle_delay() {
    let dir = TempDir::new().unwrap();
    let prompt = ScriptedPrompt::answering(Verdict::Allow.code());
    let engine = engine(
        dir.path(),
        prompt.clone(),
        Duration::from_millis(300),
        Duration::from_secs(5),
    );

    // The requester creates the file first and fills it afterwards.
    let path = dir.path().join("request-late.json");
    std::fs::write(&path, "").unwrap();
    let dispatch = {
        let engine = engine.clone();
        let path = path.clone();
        tokio::spawn(async move { engine.dispatch(&path).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    write_request(dir.path(), "late", "Bash", r#"{"command":"ls"}"#);

    let Outcome::Resolved(resolution) = dispatch.await.unwrap() else {
        panic!("expected resolution");
    };
    assert_eq!(resolution.request_id, "late");
    assert_eq!(resolution.verdict, Verdict::Allow);
    assert_eq!(response(dir.path(), "late"), Some(PermissionReply { allow: true }));
    assert!(!path.exists());
    assert_eq!(prompt.calls(), 1);
}

#[tokio::test]
async fn async_failure_still_responds() {
    let dir = TempDir::new().unwrap();
    let prompt = ScriptedPrompt::answering(Verdict::Allow.code());
    let engine = engine(dir.path(), prompt.clone(), Duration::ZERO, Duration::from_secs(5));
    let recorder = Arc::new(Recorder::default());
    engine.set_observer(recorder.clone()).await;

    let (fail_tx, fail_rx) = tokio::sync::oneshot::channel::<()>();
    let fail_rx = Arc::new(Mutex::new(Some(fail_rx)));
    let provider = move |_: &str, _: &Inputs| -> PromptFuture {
        let rx = fail_rx.lock().unwrap().take();
        Box::pin(async move {
            if let Some(rx) = rx {
                let _ = rx.await;
            }
            Err::<i64, _>(anyhow::anyhow!("dialog crashed"))
        })
    };
    engine.register_async_prompt(Arc::new(provider)).await;

    let path = write_request(dir.path(), "a1", "Write", r#"{"file_path":"/tmp/out"}"#);
    let Outcome::Deferred(pending) = engine.dispatch(&path).await else {
        panic!("expected deferred resolution");
    };

    // Removed before the provider has answered.
    assert!(!path.exists());
    assert_eq!(response(dir.path(), "a1"), None);

    fail_tx.send(()).unwrap();
    let resolution = pending.await.unwrap();

    assert_eq!(resolution.verdict, Verdict::Deny);
    assert_eq!(response(dir.path(), "a1"), Some(PermissionReply { allow: false }));
    assert_eq!(recorder.decisions()[0].verdict, Verdict::Deny);
    assert_eq!(prompt.calls(), 0);
}

#[tokio::test]
async fn async_prompt_does_not_block_scanning() {
    let dir = TempDir::new().unwrap();
    let engine = engine(
        dir.path(),
        ScriptedPrompt::answering(Verdict::Deny.code()),
        Duration::ZERO,
        Duration::from_secs(5),
    );
    let (answer_tx, answer_rx) = tokio::sync::watch::channel(0_i64);
    let provider = move |_: &str, _: &Inputs| -> PromptFuture {
        let mut rx = answer_rx.clone();
        Box::pin(async move {
            rx.wait_for(|code| *code != 0).await?;
            Ok::<_, anyhow::Error>(*rx.borrow())
        })
    };
    engine.register_async_prompt(Arc::new(provider)).await;

    write_request(dir.path(), "p1", "Edit", r#"{"file_path":"/a"}"#);
    write_request(dir.path(), "p2", "Edit", r#"{"file_path":"/b"}"#);
    let watcher = RequestWatcher::new(dir.path().to_path_buf(), engine.clone(), Duration::from_secs(1));

    let outcomes = watcher.scan_once().await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(watcher.scan_once().await.unwrap().is_empty());
    assert_eq!(engine.in_flight().len(), 2);

    answer_tx.send(Verdict::Allow.code()).unwrap();
    for outcome in outcomes {
        let Outcome::Deferred(pending) = outcome else {
            panic!("expected deferred resolution");
        };
        assert_eq!(pending.await.unwrap().verdict, Verdict::Allow);
    }
    assert_eq!(response(dir.path(), "p1"), Some(PermissionReply { allow: true }));
    assert_eq!(response(dir.path(), "p2"), Some(PermissionReply { allow: true }));
    assert!(engine.in_flight().is_empty());
}

#[tokio::test]
async fn unregistering_async_prompt_restores_fallback() {
    let dir = TempDir::new().unwrap();
    let prompt = ScriptedPrompt::answering(Verdict::Allow.code());
    let engine = engine(dir.path(), prompt.clone(), Duration::ZERO, Duration::from_secs(5));
    let provider = |_: &str, _: &Inputs| -> PromptFuture {
        Box::pin(async { Ok::<_, anyhow::Error>(Verdict::Deny.code()) })
    };
    engine.register_async_prompt(Arc::new(provider)).await;
    engine.unregister_async_prompt().await;

    let path = write_request(dir.path(), "f1", "Bash", r#"{"command":"ls"}"#);
    assert!(matches!(engine.dispatch(&path).await, Outcome::Resolved(_)));
    assert_eq!(prompt.calls(), 1);
}
