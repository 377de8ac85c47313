//! Bridge lifecycle events published to the host.

use tokio::sync::mpsc;

use crate::domain::report::SeqNum;

/// Something the host may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// A logon produced a session token.
    SessionOpened {
        /// Replay start requested, for gap recoveries.
        replay_from: Option<SeqNum>,
    },
    /// The venue closed and the session token was dropped.
    SessionExpired,
    /// A gap was detected and a replay relogon succeeded.
    ResyncStarted {
        /// Last contiguous number, replay starts after it.
        from: SeqNum,
        /// Number that revealed the gap.
        observed: SeqNum,
    },
    /// Continuity was restored after a replay.
    ResyncCompleted {
        /// First number accepted after the gap.
        seq: SeqNum,
    },
    /// The subscriber was torn down and recreated after heartbeat silence.
    SubscriberRestarted {
        /// Silent intervals that triggered it.
        silent_ticks: u32,
    },
    /// The bridge hit an unrecoverable error and is stopping.
    Fatal(String),
}

/// Best-effort publisher; a slow or absent host never blocks the bridge.
#[derive(Debug, Clone, Default)]
pub struct EventPublisher {
    tx: Option<mpsc::Sender<BridgeEvent>>,
}

impl EventPublisher {
    /// Publisher that forwards to `tx`.
    #[must_use]
    pub const fn new(tx: mpsc::Sender<BridgeEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Publisher that drops everything.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { tx: None }
    }

    /// Publish without waiting.
    pub fn publish(&self, event: BridgeEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(event) {
            tracing::debug!(error = %e, "Bridge event not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publishes_until_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let publisher = EventPublisher::new(tx);
        publisher.publish(BridgeEvent::SessionExpired);
        publisher.publish(BridgeEvent::ResyncCompleted { seq: 4 });

        assert_eq!(rx.recv().await, Some(BridgeEvent::SessionExpired));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn disabled_publisher_is_silent() {
        EventPublisher::disabled().publish(BridgeEvent::Fatal("x".to_string()));
    }
}
