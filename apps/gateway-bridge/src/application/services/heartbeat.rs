//! Heartbeat Monitor
//!
//! Periodic supervision of the gateway session. Every interval:
//!
//! - venue closed or bridge disconnected: drop the session token (daily
//!   expiry), nothing else;
//! - venue open: count one more silent interval and, past the threshold or
//!   when no session is held, ask for a subscriber teardown and relogon.
//!
//! Any heartbeat or valid data frame resets the silence count. The monitor
//! only decides; the client performs the reconnect when it receives
//! [`HeartbeatEvent::Reconnect`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::session::SessionController;

/// Configuration for heartbeat supervision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between checks.
    pub interval: Duration,
    /// Silent intervals tolerated before reconnecting.
    pub max_missed: u32,
    /// Pause between subscriber teardown and recreation.
    pub settle_delay: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_missed: 5,
            settle_delay: Duration::from_millis(100),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(interval: Duration, max_missed: u32, settle_delay: Duration) -> Self {
        Self {
            interval,
            max_missed,
            settle_delay,
        }
    }
}

/// Decisions emitted by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Tear down the subscriber, relogon with a fresh session, reset.
    Reconnect {
        /// Consecutive silent intervals observed.
        silent_ticks: u32,
        /// Whether a session token was held at the time.
        session_open: bool,
    },
    /// The venue closed and the session token was dropped.
    SessionExpired,
}

/// Silence counter shared between the monitor and the reconciler.
#[derive(Debug)]
pub struct HeartbeatState {
    silent_ticks: AtomicU32,
    last_activity: RwLock<Instant>,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create new heartbeat state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            silent_ticks: AtomicU32::new(0),
            last_activity: RwLock::new(Instant::now()),
        }
    }

    /// Record gateway traffic (heartbeat or valid frame).
    pub fn record_activity(&self) {
        self.silent_ticks.store(0, Ordering::SeqCst);
        *self.last_activity.write() = Instant::now();
    }

    /// Count one silent interval; returns the new count.
    pub fn tick(&self) -> u32 {
        self.silent_ticks
            .fetch_add(1, Ordering::SeqCst)
            .saturating_add(1)
    }

    /// Consecutive silent intervals.
    #[must_use]
    pub fn silent_ticks(&self) -> u32 {
        self.silent_ticks.load(Ordering::SeqCst)
    }

    /// Time since the last recorded traffic.
    #[must_use]
    pub fn since_last_activity(&self) -> Duration {
        self.last_activity.read().elapsed()
    }

    /// Reset after a successful reconnect.
    pub fn reset(&self) {
        self.record_activity();
    }
}

/// Heartbeat monitor that supervises the gateway session.
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    session: Arc<SessionController>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatMonitor {
    /// Create a new heartbeat monitor.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        session: Arc<SessionController>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            session,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled or the event receiver goes away.
    ///
    /// The first check happens one full interval after start.
    pub async fn run(self) {
        let start = tokio::time::Instant::now() + self.config.interval;
        let mut interval = tokio::time::interval_at(start, self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat monitor cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if let Some(event) = self.check()
                        && self.event_tx.send(event).await.is_err()
                    {
                        tracing::debug!("Event channel closed, stopping heartbeat monitor");
                        break;
                    }
                }
            }
        }
    }

    /// One supervision step.
    #[must_use]
    pub fn check(&self) -> Option<HeartbeatEvent> {
        if !self.session.is_connected() || !self.session.is_venue_open() {
            if self.session.expire_session() {
                tracing::info!("Venue closed, gateway session expired");
                return Some(HeartbeatEvent::SessionExpired);
            }
            return None;
        }

        let silent_ticks = self.state.tick();
        let session_open = self.session.is_session_open();
        if silent_ticks > self.config.max_missed || !session_open {
            tracing::warn!(
                silent_ticks,
                max_missed = self.config.max_missed,
                session_open,
                idle_secs = self.state.since_last_activity().as_secs(),
                "Gateway heartbeat stale, requesting reconnect"
            );
            return Some(HeartbeatEvent::Reconnect {
                silent_ticks,
                session_open,
            });
        }

        None
    }
}
