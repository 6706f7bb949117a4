//! Two-stage shutdown controller.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::ShutdownState;
use crate::Result;

/// What an interrupt did to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// First interrupt: `Running -> Draining`.
    Drain,
    /// Second interrupt while draining: force exit raised.
    ForceExit,
    /// Nothing left to escalate.
    Ignored,
}

struct Inner {
    state: AtomicU8,
    force_exit: AtomicBool,
    interrupts: AtomicU32,
    notify: Notify,
}

/// Shared handle to the engine's shutdown state.
///
/// Clones refer to the same state. Transitions are monotonic:
/// `Running -> Draining -> Stopped`, with a force-exit flag that can only be
/// raised while draining.
#[derive(Clone)]
pub struct ShutdownController {
    inner: Arc<Inner>,
}

impl ShutdownController {
    /// Create a controller in the `Running` state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(ShutdownState::Running.as_u8()),
                force_exit: AtomicBool::new(false),
                interrupts: AtomicU32::new(0),
                notify: Notify::new(),
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// Whether the main loop should stop.
    pub fn should_exit(&self) -> bool {
        self.state() != ShutdownState::Running
    }

    /// Whether the drain wait should be abandoned.
    pub fn force_exit(&self) -> bool {
        self.inner.force_exit.load(Ordering::SeqCst)
    }

    /// Number of interrupts delivered so far.
    pub fn interrupts(&self) -> u32 {
        self.inner.interrupts.load(Ordering::SeqCst)
    }

    /// Deliver one interrupt.
    ///
    /// The first moves `Running` to `Draining`. A second one while draining
    /// raises the force-exit flag. Anything after that is ignored.
    pub fn interrupt(&self) -> InterruptAction {
        let count = self.inner.interrupts.fetch_add(1, Ordering::SeqCst) + 1;

        let action = match self.transition(ShutdownState::Draining) {
            Ok(()) => {
                info!("shutdown requested, draining tasks (interrupt again to force exit)");
                InterruptAction::Drain
            }
            Err(_) if self.state() == ShutdownState::Draining => {
                if self.inner.force_exit.swap(true, Ordering::SeqCst) {
                    InterruptAction::Ignored
                } else {
                    warn!("second interrupt, forcing exit");
                    InterruptAction::ForceExit
                }
            }
            Err(_) => InterruptAction::Ignored,
        };

        debug!(count, ?action, "interrupt handled");
        self.inner.notify.notify_waiters();
        action
    }

    /// Move `Draining -> Stopped` once shutdown has finished.
    pub fn mark_stopped(&self) -> Result<()> {
        self.transition(ShutdownState::Stopped)?;
        self.inner.notify.notify_waiters();
        Ok(())
    }

    /// Wait until shutdown has been requested.
    pub async fn wait_for_exit(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.should_exit() {
                return;
            }
            notified.await;
        }
    }

    fn transition(&self, target: ShutdownState) -> Result<()> {
        let mut current = self.inner.state.load(Ordering::SeqCst);
        loop {
            let mut next = ShutdownState::from_u8(current);
            next.transition_to(target)?;

            match self.inner.state.compare_exchange(
                current,
                next.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownController")
            .field("state", &self.state())
            .field("force_exit", &self.force_exit())
            .field("interrupts", &self.interrupts())
            .finish()
    }
}
