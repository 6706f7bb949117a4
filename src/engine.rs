//! The engine: session routing, task supervision, and lifecycle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::session::{
    ClientMessage, LocalSession, Message, MessageId, MessageSource, Session, SessionConfig,
    SessionId, SessionRegistry, DEFAULT_MESSAGE_BUFFER,
};
use crate::shutdown::{signals, ShutdownController, ShutdownOutcome, ShutdownState};
use crate::task::{Heartbeat, TaskHandle, TaskRegistry, DEFAULT_HEARTBEAT_INTERVAL};
use crate::Result;

/// Default interval between main-loop and drain-loop polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runtime settings of an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often the main loop and the drain loop check shutdown state.
    pub poll_interval: Duration,
    /// Period of the built-in heartbeat task.
    pub heartbeat_interval: Duration,
    /// Broadcast capacity of sessions created by the engine.
    pub message_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            message_buffer: DEFAULT_MESSAGE_BUFFER,
        }
    }
}

/// Process-wide session host and task supervisor.
///
/// A client (terminal UI, editor plugin, test harness) drives all work
/// through one `Engine`: it creates sessions, routes messages to them, and
/// runs the lifecycle loop that ends with a graceful-then-forced shutdown.
///
/// # Example
///
/// ```no_run
/// use session_engine::{ClientMessage, Engine, EngineConfig, SessionConfig};
///
/// # async fn demo() -> session_engine::Result<()> {
/// let engine = Engine::new(EngineConfig::default());
/// let id = engine.create_session(SessionConfig::default().path("src"))?;
/// let message_id = engine
///     .send_message(&id, ClientMessage::new("explain main.rs"))
///     .await?;
/// println!("sent {}", message_id);
///
/// let outcome = engine.run_async(true).await?;
/// println!("stopped: {:?}", outcome);
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    config: EngineConfig,
    sessions: SessionRegistry,
    tasks: TaskRegistry,
    shutdown: ShutdownController,
    heartbeat: Heartbeat,
}

impl Engine {
    /// Create an engine with empty registries, in the `Running` state.
    pub fn new(config: EngineConfig) -> Self {
        let heartbeat = Heartbeat::new(config.heartbeat_interval);
        Self {
            config,
            sessions: SessionRegistry::new(),
            tasks: TaskRegistry::new(),
            shutdown: ShutdownController::new(),
            heartbeat,
        }
    }

    /// Engine settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // Sessions

    /// Build a [`LocalSession`] from `config` and register it.
    pub fn create_session(&self, mut config: SessionConfig) -> Result<SessionId> {
        config
            .message_buffer
            .get_or_insert(self.config.message_buffer);
        let session = LocalSession::new(config)?;
        let id = self.sessions.register(Arc::new(session))?;
        info!(session = %id, "session created");
        Ok(id)
    }

    /// Register an externally built session under a fresh ID.
    pub fn register_session(&self, session: Arc<dyn Session>) -> Result<SessionId> {
        let id = self.sessions.register(session)?;
        info!(session = %id, "session registered");
        Ok(id)
    }

    /// Whether `id` names a registered session.
    pub fn session_exists(&self, id: &SessionId) -> Result<bool> {
        self.sessions.contains(id)
    }

    /// Remove and close a session.
    pub fn remove_session(&self, id: &SessionId) -> Result<()> {
        self.sessions.remove(id)?;
        info!(session = %id, "session removed");
        Ok(())
    }

    /// IDs of every registered session.
    pub fn session_ids(&self) -> Result<Vec<SessionId>> {
        self.sessions.list_ids()
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.count()
    }

    /// Send a client message to a session.
    ///
    /// The message is tagged with [`MessageSource::Client`]. Returns the ID
    /// the session's conversation assigned. Nothing is sent if the session
    /// does not exist.
    pub async fn send_message(&self, id: &SessionId, message: ClientMessage) -> Result<MessageId> {
        let session = self.sessions.resolve(id)?;
        let (channel, data) = message.into_parts();

        let sent = session
            .conversation()
            .send_message(MessageSource::Client, data, &channel)
            .await?;

        debug!(session = %id, message = %sent.id, channel = %channel, "client message sent");
        Ok(sent.id)
    }

    /// Subscribe to messages appended to a session's conversation from now
    /// on.
    pub fn session_listen(&self, id: &SessionId) -> Result<broadcast::Receiver<Message>> {
        Ok(self.sessions.resolve(id)?.conversation().subscribe())
    }

    /// File paths in a session's code context.
    pub fn get_session_code_context(&self, id: &SessionId) -> Result<Vec<PathBuf>> {
        self.sessions.list_contexts(id)
    }

    // Tasks

    /// Spawn a supervised background task.
    ///
    /// `work` receives the task's cancellation token and should return soon
    /// after it fires.
    pub fn spawn<F, Fut>(&self, name: impl Into<String>, work: F) -> Result<TaskHandle>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(name, work)
    }

    /// The task registry.
    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    /// The built-in heartbeat (shares its beat counter with the running
    /// task).
    pub fn heartbeat(&self) -> &Heartbeat {
        &self.heartbeat
    }

    // Lifecycle

    /// A handle to the shutdown state, for delivering interrupts or
    /// observing the lifecycle from outside the run loop.
    pub fn shutdown_handle(&self) -> ShutdownController {
        self.shutdown.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ShutdownState {
        self.shutdown.state()
    }

    /// Run the engine on a fresh single-threaded runtime, blocking until
    /// shutdown completes.
    pub fn run(&self, install_signal_handlers: bool) -> Result<ShutdownOutcome> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| EngineError::Startup(format!("failed to build runtime: {}", e)))?;

        runtime.block_on(self.run_async(install_signal_handlers))
    }

    /// Run startup, the main loop, and shutdown on the current runtime.
    ///
    /// Any error returned here is fatal; it is logged before being returned.
    ///
    /// With `install_signal_handlers`, SIGINT and SIGTERM stay routed
    /// through tokio for the rest of the process: the listener stops when
    /// this returns, but the OS-level handlers are never uninstalled, so a
    /// later Ctrl+C is swallowed instead of terminating the process. An
    /// embedding client that keeps running afterwards must listen for
    /// signals itself, or pass `false` and call
    /// [`ShutdownController::interrupt`] from its own handler.
    pub async fn run_async(&self, install_signal_handlers: bool) -> Result<ShutdownOutcome> {
        let listener = if install_signal_handlers {
            match signals::install(self.shutdown.clone()) {
                Ok(handle) => Some(handle),
                Err(e) => return Err(fatal(e)),
            }
        } else {
            None
        };

        let result = self.lifecycle().await;

        if let Some(listener) = listener {
            listener.abort();
        }
        result.map_err(fatal)
    }

    async fn lifecycle(&self) -> Result<ShutdownOutcome> {
        self.startup()?;
        self.main_loop().await;
        self.drain().await
    }

    fn startup(&self) -> Result<()> {
        debug!("starting engine");
        if self.shutdown.state().is_terminal() {
            return Err(EngineError::Startup("engine has already stopped".into()));
        }
        let heartbeat = self.heartbeat.clone();
        self.tasks
            .spawn("heartbeat", |token| heartbeat.run(token))
            .map_err(|e| EngineError::Startup(e.to_string()))?;
        info!(
            poll_ms = self.config.poll_interval.as_millis() as u64,
            "engine running"
        );
        Ok(())
    }

    async fn main_loop(&self) {
        debug!("running engine");
        while !self.shutdown.should_exit() {
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn drain(&self) -> Result<ShutdownOutcome> {
        debug!("shutting engine down");

        let cancelled = self.tasks.cancel_all().map_err(runtime_failure)?;
        debug!(
            cancelled,
            "waiting for tasks to finish (interrupt again to force quit)"
        );

        let outcome = loop {
            if self.shutdown.force_exit() {
                break ShutdownOutcome::Forced;
            }
            if self.tasks.all_cancelled().map_err(runtime_failure)? {
                break ShutdownOutcome::Graceful;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        };

        if outcome == ShutdownOutcome::Forced {
            let pending = self.tasks.pending().map_err(runtime_failure)?;
            warn!(pending = ?pending, "force exiting");
        }

        self.teardown()?;
        self.shutdown.mark_stopped().map_err(runtime_failure)?;
        info!(?outcome, "engine has stopped");
        Ok(outcome)
    }

    fn teardown(&self) -> Result<()> {
        let abandoned = self.tasks.teardown().map_err(runtime_failure)?;
        let closed = self.sessions.clear().map_err(runtime_failure)?;
        debug!(abandoned, closed, "registries torn down");
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn runtime_failure(e: EngineError) -> EngineError {
    EngineError::Runtime(e.to_string())
}

/// Log a lifecycle error with its full source chain.
fn fatal(e: EngineError) -> EngineError {
    let mut chain = Vec::new();
    let mut source = std::error::Error::source(&e);
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    error!(error = %e, caused_by = ?chain, "fatal engine error");
    e
}
