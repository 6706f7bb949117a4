//! Periodic liveness heartbeat.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default period between heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);

/// A background unit of work that only logs, once per period, until
/// cancelled.
///
/// Clones share the beat counter, so the engine can keep one copy for
/// inspection while another runs as a task.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    period: Duration,
    beats: Arc<AtomicU64>,
}

impl Heartbeat {
    /// Create a heartbeat with the given period.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            beats: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Period between beats.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Number of beats emitted so far.
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::SeqCst)
    }

    /// Beat immediately, then once per period, until `token` fires.
    pub async fn run(self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(beats = self.beats(), "heartbeat stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let beat = self.beats.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!(beat, "heartbeat");
                }
            }
        }
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_INTERVAL)
    }
}
