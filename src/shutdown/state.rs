//! Shutdown state machine.

/// Process-wide lifecycle phase of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum ShutdownState {
    /// Normal operation.
    #[default]
    Running = 0,
    /// Tasks have been asked to cancel; waiting for them to stop.
    Draining = 1,
    /// Shutdown finished. Terminal.
    Stopped = 2,
}

impl ShutdownState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Running -> Draining
    /// - Draining -> Stopped
    pub fn can_transition_to(&self, target: ShutdownState) -> bool {
        use ShutdownState::*;
        matches!((*self, target), (Running, Draining) | (Draining, Stopped))
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: ShutdownState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::EngineError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ShutdownState::Stopped)
    }

    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ShutdownState::Running,
            1 => ShutdownState::Draining,
            _ => ShutdownState::Stopped,
        }
    }
}

/// How a completed shutdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every task confirmed cancellation.
    Graceful,
    /// A second interrupt abandoned the wait.
    Forced,
}

impl ShutdownOutcome {
    /// Conventional process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownOutcome::Graceful => 0,
            ShutdownOutcome::Forced => 130,
        }
    }
}
