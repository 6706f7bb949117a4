//! OS signal listener feeding the shutdown controller.

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{InterruptAction, ShutdownController};
#[cfg(unix)]
use crate::error::EngineError;
use crate::Result;

/// Listen for SIGINT and SIGTERM, delivering each to `controller` as an
/// interrupt.
///
/// The listener is a plain tokio task, not a registered engine task, so it
/// keeps running while tasks drain and can deliver the escalating second
/// signal. It exits once there is nothing left to escalate.
///
/// tokio keeps its process-wide handlers registered after the listener
/// stops; the default terminate-on-SIGINT disposition is not restored.
#[cfg(unix)]
pub fn install(controller: ShutdownController) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| EngineError::Startup(format!("failed to install SIGINT handler: {}", e)))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| EngineError::Startup(format!("failed to install SIGTERM handler: {}", e)))?;

    debug!("signal handlers installed");

    Ok(tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                received = sigint.recv() => match received {
                    Some(()) => "SIGINT",
                    None => break,
                },
                received = sigterm.recv() => match received {
                    Some(()) => "SIGTERM",
                    None => break,
                },
            };

            info!(signal = name, "signal received");
            if deliver(&controller) {
                break;
            }
        }
        debug!("signal listener exiting");
    }))
}

/// Listen for Ctrl+C, delivering each to `controller` as an interrupt.
#[cfg(not(unix))]
pub fn install(controller: ShutdownController) -> Result<JoinHandle<()>> {
    debug!("signal handlers installed");

    Ok(tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for Ctrl+C: {}", e);
                break;
            }

            info!(signal = "ctrl-c", "signal received");
            if deliver(&controller) {
                break;
            }
        }
        debug!("signal listener exiting");
    }))
}

/// Returns true once further signals can no longer change anything.
fn deliver(controller: &ShutdownController) -> bool {
    match controller.interrupt() {
        InterruptAction::Drain => false,
        InterruptAction::ForceExit | InterruptAction::Ignored => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownState;

    #[test]
    fn test_deliver_escalates_then_stops() {
        let controller = ShutdownController::new();
        assert!(!deliver(&controller));
        assert_eq!(controller.state(), ShutdownState::Draining);

        assert!(deliver(&controller));
        assert!(controller.force_exit());
    }

    #[tokio::test]
    async fn test_install_and_abort() {
        let controller = ShutdownController::new();
        let listener = install(controller.clone()).unwrap();
        assert!(!listener.is_finished());

        listener.abort();
        assert!(listener.await.unwrap_err().is_cancelled());
        assert_eq!(controller.state(), ShutdownState::Running);
    }
}
