//! Engine lifecycle integration tests.
//!
//! Timing tests run on a paused tokio clock so poll-interval bounds are
//! exact.

use std::collections::HashSet;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use session_engine::{
    ClientMessage, Conversation, Engine, EngineConfig, EngineError, Message, MessageId,
    MessageSource, Session, SessionConfig, SessionId, ShutdownOutcome, ShutdownState,
};

const POLL: Duration = Duration::from_millis(100);

fn engine() -> Arc<Engine> {
    Arc::new(Engine::new(EngineConfig {
        poll_interval: POLL,
        heartbeat_interval: Duration::from_secs(3),
        message_buffer: 64,
    }))
}

fn start(engine: &Arc<Engine>) -> JoinHandle<session_engine::Result<ShutdownOutcome>> {
    let engine = Arc::clone(engine);
    tokio::spawn(async move { engine.run_async(false).await })
}

/// A task that stops as soon as it is asked to, recording that it did.
fn cooperative(engine: &Engine, name: &str) -> Arc<AtomicBool> {
    let stopped = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stopped);
    engine
        .spawn(name, move |token| async move {
            token.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();
    stopped
}

/// Route a message the way a client holding a string id would.
async fn send_by_str(
    engine: &Engine,
    id: &str,
    content: &str,
) -> session_engine::Result<MessageId> {
    let id: SessionId = id.parse()?;
    engine.send_message(&id, ClientMessage::new(content)).await
}

/// A session whose conversation refuses every message.
struct ReadOnlySession {
    tx: broadcast::Sender<Message>,
}

impl ReadOnlySession {
    fn new() -> Self {
        Self {
            tx: broadcast::channel(4).0,
        }
    }
}

#[async_trait]
impl Conversation for ReadOnlySession {
    async fn send_message(
        &self,
        _source: MessageSource,
        _data: session_engine::session::MessageData,
        channel: &str,
    ) -> session_engine::Result<Message> {
        Err(EngineError::Conversation(format!(
            "channel '{}' is read-only",
            channel
        )))
    }

    fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.tx.subscribe()
    }
}

impl Session for ReadOnlySession {
    fn conversation(&self) -> &dyn Conversation {
        self
    }

    fn code_context_paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

// ============================================================================
// Routing Tests
// ============================================================================

#[tokio::test]
async fn test_two_sessions_are_independent() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
    fs::write(dir.path().join("b.rs"), "fn b() {}").unwrap();

    let engine = engine();
    let a = engine
        .create_session(SessionConfig::default().path(dir.path().join("a.rs")))
        .unwrap();
    let b = engine
        .create_session(SessionConfig::default().path(dir.path().join("b.rs")))
        .unwrap();

    let mut a_rx = engine.session_listen(&a).unwrap();
    let mut b_rx = engine.session_listen(&b).unwrap();

    engine
        .send_message(&a, ClientMessage::new("hello a"))
        .await
        .unwrap();

    assert_eq!(
        engine.get_session_code_context(&b).unwrap(),
        vec![dir.path().join("b.rs")]
    );
    assert_eq!(a_rx.recv().await.unwrap().content(), Some(&json!("hello a")));
    assert!(b_rx.try_recv().is_err());

    let missing = send_by_str(&engine, "nonexistent", "hi").await;
    assert!(matches!(missing, Err(EngineError::SessionNotFound(_))));
}

#[tokio::test]
async fn test_unknown_session_leaves_registry_unchanged() {
    let engine = engine();
    let known = engine.create_session(SessionConfig::default()).unwrap();
    let before = engine.session_ids().unwrap();

    let unknown = SessionId::new();
    let sent = engine
        .send_message(&unknown, ClientMessage::new("hi"))
        .await;
    let context = engine.get_session_code_context(&unknown);
    let listen = engine.session_listen(&unknown);

    assert!(matches!(sent, Err(EngineError::SessionNotFound(_))));
    assert!(matches!(context, Err(EngineError::SessionNotFound(_))));
    assert!(matches!(listen, Err(EngineError::SessionNotFound(_))));
    assert!(!engine.session_exists(&unknown).unwrap());
    assert_eq!(engine.session_ids().unwrap(), before);
    assert_eq!(before, vec![known]);
}

#[tokio::test]
async fn test_message_ids_pairwise_distinct() {
    let engine = engine();
    let id = engine.create_session(SessionConfig::default()).unwrap();

    let mut ids = HashSet::new();
    for i in 0..200 {
        let message_id = engine
            .send_message(&id, ClientMessage::new(i).channel("bulk"))
            .await
            .unwrap();
        assert!(ids.insert(message_id));
    }
    assert_eq!(ids.len(), 200);
}

#[tokio::test]
async fn test_listener_sees_client_messages_in_order() {
    let engine = engine();
    let id = engine.create_session(SessionConfig::default()).unwrap();
    let mut rx = engine.session_listen(&id).unwrap();

    let first = engine
        .send_message(&id, ClientMessage::new("one"))
        .await
        .unwrap();
    let second = engine
        .send_message(&id, ClientMessage::new("two").field("cursor", 3))
        .await
        .unwrap();

    let m1 = rx.recv().await.unwrap();
    let m2 = rx.recv().await.unwrap();
    assert_eq!((m1.id, m1.seq), (first, 1));
    assert_eq!((m2.id, m2.seq), (second, 2));
    assert_eq!(m2.source, MessageSource::Client);
    assert_eq!(m2.data.get("cursor"), Some(&json!(3)));
}

#[tokio::test]
async fn test_conversation_rejection_reaches_caller() {
    let engine = engine();
    let id = engine
        .register_session(Arc::new(ReadOnlySession::new()))
        .unwrap();
    let mut rx = engine.session_listen(&id).unwrap();

    let err = engine
        .send_message(&id, ClientMessage::new("hi").channel("log"))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Conversation(ref reason) if reason.contains("log")));
    assert!(!err.is_fatal());
    assert!(rx.try_recv().is_err());
    assert!(engine.session_exists(&id).unwrap());
    assert_eq!(engine.state(), ShutdownState::Running);
}

#[tokio::test]
async fn test_send_to_removed_session_fails() {
    let engine = engine();
    let id = engine.create_session(SessionConfig::default()).unwrap();
    engine.remove_session(&id).unwrap();

    let result = engine.send_message(&id, ClientMessage::new("late")).await;
    assert!(matches!(result, Err(EngineError::SessionNotFound(_))));
}

// ============================================================================
// Shutdown Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_single_interrupt_drains_gracefully() {
    let engine = engine();
    let first = cooperative(&engine, "worker-1");
    let second = cooperative(&engine, "worker-2");
    let session = engine.create_session(SessionConfig::default()).unwrap();

    let run = start(&engine);
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(engine.state(), ShutdownState::Running);

    engine.shutdown_handle().interrupt();
    let outcome = run.await.unwrap().unwrap();

    assert_eq!(outcome, ShutdownOutcome::Graceful);
    assert_eq!(engine.state(), ShutdownState::Stopped);
    assert!(first.load(Ordering::SeqCst));
    assert!(second.load(Ordering::SeqCst));
    assert!(engine.tasks().is_empty());
    assert!(!engine.session_exists(&session).unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_drain_waits_until_tasks_confirm() {
    let engine = engine();
    let stopped = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stopped);
    engine
        .spawn("slow-to-stop", move |token| async move {
            token.cancelled().await;
            // Keeps running for five poll intervals after the request
            tokio::time::sleep(Duration::from_millis(500)).await;
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

    let started = Instant::now();
    let run = start(&engine);

    tokio::time::sleep(Duration::from_millis(250)).await;
    engine.shutdown_handle().interrupt();

    // Picked up at 300ms; the task finishes at 800ms
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(engine.state(), ShutdownState::Draining);
    assert!(!stopped.load(Ordering::SeqCst));
    assert!(!run.is_finished());

    let outcome = run.await.unwrap().unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome, ShutdownOutcome::Graceful);
    assert!(stopped.load(Ordering::SeqCst));
    assert!(elapsed >= Duration::from_millis(800), "stopped early: {:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(900), "stopped late: {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_second_interrupt_forces_exit_while_draining() {
    let engine = engine();
    engine
        .spawn("stuck", |_token| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
        .unwrap();

    let run = start(&engine);
    let shutdown = engine.shutdown_handle();

    tokio::time::sleep(Duration::from_millis(150)).await;
    shutdown.interrupt();

    // Well into the drain, still waiting on the stuck task
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(engine.state(), ShutdownState::Draining);

    let forced_at = Instant::now();
    shutdown.interrupt();
    let outcome = run.await.unwrap().unwrap();

    assert_eq!(outcome, ShutdownOutcome::Forced);
    assert_eq!(engine.state(), ShutdownState::Stopped);
    assert!(forced_at.elapsed() <= POLL, "took {:?}", forced_at.elapsed());
}

#[tokio::test(start_paused = true)]
async fn test_two_quick_interrupts_skip_the_wait() {
    let engine = engine();
    engine
        .spawn("stuck", |_token| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
        .unwrap();

    let run = start(&engine);
    let shutdown = engine.shutdown_handle();

    tokio::time::sleep(Duration::from_millis(250)).await;
    shutdown.interrupt();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let forced_at = Instant::now();
    shutdown.interrupt();

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, ShutdownOutcome::Forced);
    assert!(forced_at.elapsed() <= POLL, "took {:?}", forced_at.elapsed());
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_silent_after_shutdown() {
    let engine = engine();
    let run = start(&engine);

    // Beats at 0s, 3s, 6s
    tokio::time::sleep(Duration::from_millis(7_000)).await;
    assert_eq!(engine.heartbeat().beats(), 3);

    engine.shutdown_handle().interrupt();
    run.await.unwrap().unwrap();

    let after_stop = engine.heartbeat().beats();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(engine.heartbeat().beats(), after_stop);
}

#[tokio::test(start_paused = true)]
async fn test_run_with_signal_handlers_installed() {
    let engine = Arc::new(Engine::default());
    let run = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run_async(true).await })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    engine.shutdown_handle().interrupt();

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, ShutdownOutcome::Graceful);
}

#[tokio::test(start_paused = true)]
async fn test_second_run_is_fatal() {
    let engine = engine();
    let run = start(&engine);
    engine.shutdown_handle().interrupt();
    run.await.unwrap().unwrap();

    let err = engine.run_async(false).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, EngineError::Startup(_)));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_spawn_does_not_break_shutdown() {
    let engine = engine();
    let spawned = catch_unwind(AssertUnwindSafe(|| {
        engine.spawn("broken", |_token| -> std::future::Ready<()> {
            panic!("factory failed")
        })
    }));
    assert!(spawned.is_err());
    assert!(engine.tasks().is_empty());

    let worker = cooperative(&engine, "worker");
    let run = start(&engine);
    tokio::time::sleep(Duration::from_millis(150)).await;
    engine.shutdown_handle().interrupt();

    assert_eq!(run.await.unwrap().unwrap(), ShutdownOutcome::Graceful);
    assert!(worker.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_task_spawns_child_task() {
    let engine = engine();
    let child_stopped = Arc::new(AtomicBool::new(false));

    let inner = Arc::clone(&engine);
    let flag = Arc::clone(&child_stopped);
    engine
        .spawn("parent", move |token| {
            inner
                .spawn("child", move |child_token| async move {
                    child_token.cancelled().await;
                    flag.store(true, Ordering::SeqCst);
                })
                .unwrap();
            async move { token.cancelled().await }
        })
        .unwrap();
    assert_eq!(engine.tasks().len(), 2);

    let run = start(&engine);
    tokio::time::sleep(Duration::from_millis(150)).await;
    engine.shutdown_handle().interrupt();

    assert_eq!(run.await.unwrap().unwrap(), ShutdownOutcome::Graceful);
    assert!(child_stopped.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_task_spawned_while_draining_is_cancelled() {
    let engine = engine();
    engine
        .spawn("stuck", |_token| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
        .unwrap();

    let run = start(&engine);
    engine.shutdown_handle().interrupt();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(engine.state(), ShutdownState::Draining);

    let late = engine
        .spawn("late", |token| async move { token.cancelled().await })
        .unwrap();
    assert!(late.is_cancel_requested());

    engine.shutdown_handle().interrupt();
    assert_eq!(run.await.unwrap().unwrap(), ShutdownOutcome::Forced);
}
