use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ConnectionState, SmartHub};

/// Exponential reconnect delay, doubling from `min` up to `max`
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        let min = min.min(max);
        Self {
            min,
            max,
            current: min,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

/// Keep a hub connected and its shade positions fresh until `cancel` fires.
///
/// The first iteration connects right away. Afterwards a connected hub is
/// polled every `poll_interval`; a failed poll marks the hub unavailable
/// and the loop falls back to reconnecting with backoff.
pub async fn run(hub: Arc<SmartHub>, cancel: CancellationToken) {
    let settings = hub.settings().clone();
    let mut backoff = ReconnectBackoff::new(settings.reconnect_min(), settings.reconnect_max());
    let mut wait = Duration::ZERO;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = sleep(wait) => {}
        }

        match hub.state().await {
            ConnectionState::Connected => {
                if let Err(e) = hub.refresh_covers().await {
                    warn!(
                        hub = %hub.identifier(),
                        error = %e,
                        "hub poll failed, marking unavailable"
                    );
                    hub.mark_unavailable().await;
                    wait = backoff.next_delay();
                } else {
                    wait = settings.poll_interval();
                }
            }
            ConnectionState::Connecting => {
                wait = settings.reconnect_min();
            }
            ConnectionState::Disconnected | ConnectionState::Error => match hub.connect().await {
                Ok(()) => {
                    info!(hub = %hub.identifier(), "hub connection established");
                    backoff.reset();
                    wait = settings.poll_interval();
                }
                Err(e) => {
                    wait = backoff.next_delay();
                    debug!(
                        hub = %hub.identifier(),
                        error = %e,
                        retry_in = ?wait,
                        "reconnect failed"
                    );
                }
            },
        }
    }

    debug!(hub = %hub.identifier(), "watchdog stopped");
}

pub fn spawn(hub: Arc<SmartHub>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(run(hub, cancel))
}
