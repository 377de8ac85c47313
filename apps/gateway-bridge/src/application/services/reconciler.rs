//! Sequence Reconciler
//!
//! Single consumer of the subscribe channel. Every frame is decoded, checked
//! against the [`SequenceTracker`], and either forwarded to the dispatch
//! gate, dropped as a stale duplicate, or turned into a replay relogon when
//! it reveals a gap.
//!
//! Frames already queued when a gap is noticed are thrown away before the
//! replay relogon is sent: the gateway resends the authoritative stream from
//! the last contiguous number, and that replay may start arriving before
//! the relogon reply does.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::dispatch::{DispatchGate, Submission};
use super::heartbeat::HeartbeatState;
use super::session::SessionController;
use crate::application::events::{BridgeEvent, EventPublisher};
use crate::application::ports::RawFrame;
use crate::domain::report::{InboundMessage, SeqNum};
use crate::domain::sequence::{SequenceSnapshot, SequenceTracker, SequenceVerdict};
use crate::error::BridgeError;
use crate::infrastructure::gateway::JsonCodec;
use crate::infrastructure::metrics::{self, DropReason, Outcome};

/// What the reconciler did with one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Report accepted and delivered to the host.
    Dispatched {
        /// Accepted number.
        seq: SeqNum,
    },
    /// Report accepted and held behind an in-flight call.
    Buffered {
        /// Accepted number.
        seq: SeqNum,
    },
    /// Accepted, but not an execution report.
    Ignored {
        /// Accepted number.
        seq: SeqNum,
    },
    /// Heartbeat; only resets the silence counter.
    Heartbeat,
    /// Duplicate or stale replay, dropped.
    Stale {
        /// Dropped number.
        seq: SeqNum,
    },
    /// Undecodable frame or report body, dropped.
    Malformed,
    /// Received before the last baseline reset, dropped.
    Superseded,
    /// Gap detected and a replay relogon succeeded.
    ResyncRequested {
        /// Replay starts after this number.
        from: SeqNum,
        /// Number that revealed the gap.
        observed: SeqNum,
    },
}

struct Tracked {
    sequence: SequenceTracker,
    baseline_from: Option<Instant>,
}

enum Step {
    Done(FrameOutcome),
    Gap {
        last_contiguous: SeqNum,
        observed: SeqNum,
    },
}

/// Enforces gap-free, duplicate-free ordering of subscribe frames.
pub struct SequenceReconciler {
    tracker: Mutex<Tracked>,
    session: Arc<SessionController>,
    gate: Arc<DispatchGate>,
    heartbeat: Arc<HeartbeatState>,
    events: EventPublisher,
    codec: JsonCodec,
}

impl SequenceReconciler {
    /// Create a reconciler with no baseline.
    #[must_use]
    pub fn new(
        session: Arc<SessionController>,
        gate: Arc<DispatchGate>,
        heartbeat: Arc<HeartbeatState>,
        events: EventPublisher,
    ) -> Self {
        Self {
            tracker: Mutex::new(Tracked {
                sequence: SequenceTracker::new(),
                baseline_from: None,
            }),
            session,
            gate,
            heartbeat,
            events,
            codec: JsonCodec::new(),
        }
    }

    /// Reconcile one frame, issuing the replay relogon itself on a gap.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ResyncFailed`] when a gap was detected and the
    /// replay relogon failed. Malformed frames are dropped, not returned.
    pub async fn process(&self, frame: &RawFrame) -> Result<FrameOutcome, BridgeError> {
        match self.reconcile(frame) {
            Step::Done(outcome) => Ok(outcome),
            Step::Gap {
                last_contiguous,
                observed,
            } => {
                self.request_replay(last_contiguous, observed).await?;
                Ok(FrameOutcome::ResyncRequested {
                    from: last_contiguous,
                    observed,
                })
            }
        }
    }

    fn reconcile(&self, frame: &RawFrame) -> Step {
        metrics::record_frame_received();

        let message = match self.codec.decode_frame(&frame.payload) {
            Ok(message) => message,
            Err(e) => {
                let err = BridgeError::from(e);
                tracing::warn!(arrival = frame.arrival, error = %err, "Dropping malformed frame");
                metrics::record_frame_dropped(DropReason::Malformed);
                metrics::record_error(err.kind());
                return Step::Done(FrameOutcome::Malformed);
            }
        };

        self.heartbeat.record_activity();

        let Some(seq) = message.seq else {
            tracing::trace!(msg_type = %message.msg_type, "Heartbeat");
            return Step::Done(FrameOutcome::Heartbeat);
        };

        let verdict = {
            let mut tracked = self.tracker.lock();
            if tracked
                .baseline_from
                .is_some_and(|from| frame.received_at < from)
            {
                None
            } else {
                Some(tracked.sequence.observe(seq))
            }
        };
        let Some(verdict) = verdict else {
            tracing::debug!(seq, arrival = frame.arrival, "Dropping frame from previous subscriber");
            metrics::record_frame_dropped(DropReason::Discarded);
            return Step::Done(FrameOutcome::Superseded);
        };
        match verdict {
            SequenceVerdict::Accept {
                seq,
                skipped,
                resynced,
            } => {
                if skipped > 0 {
                    tracing::warn!(
                        seq,
                        skipped,
                        msg_type = %message.msg_type,
                        "Accepted at reset watermark, numbers skipped"
                    );
                }
                if resynced {
                    tracing::info!(seq, "Sequence continuity restored");
                    self.events.publish(BridgeEvent::ResyncCompleted { seq });
                }
                Step::Done(self.forward(seq, &message.msg_type, message.body))
            }
            SequenceVerdict::Stale { seq, expected } => {
                tracing::debug!(
                    seq,
                    expected,
                    msg_type = %message.msg_type,
                    "Dropping stale frame"
                );
                metrics::record_frame_dropped(DropReason::Stale);
                Step::Done(FrameOutcome::Stale { seq })
            }
            SequenceVerdict::Gap {
                last_contiguous,
                observed,
            } => {
                let gap = BridgeError::SequenceGap {
                    expected: last_contiguous.saturating_add(1),
                    observed,
                };
                tracing::warn!(
                    last_contiguous,
                    observed,
                    msg_type = %message.msg_type,
                    error = %gap,
                    "Sequence gap, requesting replay"
                );
                metrics::record_sequence_gap();
                metrics::record_frame_dropped(DropReason::Gap);
                Step::Gap {
                    last_contiguous,
                    observed,
                }
            }
        }
    }

    fn forward(&self, seq: SeqNum, msg_type: &str, body: InboundMessage) -> FrameOutcome {
        match body {
            InboundMessage::Report(report) => {
                tracing::debug!(
                    seq,
                    msg_type,
                    client_order_id = %report.client_order_id,
                    kind = report.kind_label(),
                    "Forwarding execution report"
                );
                match self.gate.submit(*report) {
                    Submission::Dispatched => FrameOutcome::Dispatched { seq },
                    Submission::Buffered => FrameOutcome::Buffered { seq },
                }
            }
            InboundMessage::Heartbeat => FrameOutcome::Heartbeat,
            InboundMessage::Other => {
                tracing::debug!(seq, msg_type, "Tracked non-report frame");
                FrameOutcome::Ignored { seq }
            }
            InboundMessage::Undecodable { reason } => {
                tracing::warn!(seq, msg_type, reason, "Dropping undecodable report body");
                metrics::record_frame_dropped(DropReason::Malformed);
                FrameOutcome::Malformed
            }
        }
    }

    async fn request_replay(
        &self,
        last_contiguous: SeqNum,
        observed: SeqNum,
    ) -> Result<(), BridgeError> {
        let failure = match self.session.logon(Some(last_contiguous)).await {
            Ok(info) if info.authenticated => {
                self.tracker.lock().sequence.begin_resync(observed);
                metrics::record_resync(Outcome::Success);
                return Ok(());
            }
            Ok(info) => info
                .text
                .unwrap_or_else(|| "gateway did not open a session".to_string()),
            Err(e) => e.to_string(),
        };

        metrics::record_resync(Outcome::Failure);
        Err(BridgeError::ResyncFailed {
            last_contiguous,
            observed,
            reason: failure,
        })
    }

    /// Consume frames until cancelled, the channel closes, or a fatal error.
    ///
    /// On a gap, frames already queued are discarded before the replay
    /// relogon goes out; anything arriving during the relogon is kept.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that stopped the loop.
    pub async fn run(
        &self,
        mut frames: mpsc::Receiver<RawFrame>,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        tracing::debug!("Reconciler started");
        loop {
            let frame = tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("Reconciler cancelled");
                    return Ok(());
                }
                frame = frames.recv() => match frame {
                    Some(frame) => frame,
                    None => {
                        tracing::debug!("Frame channel closed, reconciler stopping");
                        return Ok(());
                    }
                },
            };

            let Step::Gap {
                last_contiguous,
                observed,
            } = self.reconcile(&frame)
            else {
                continue;
            };

            let discarded = discard_queued(&mut frames);
            if discarded > 0 {
                tracing::info!(discarded, last_contiguous, "Discarded frames queued behind gap");
            }

            if let Err(e) = self.request_replay(last_contiguous, observed).await {
                metrics::record_error(e.kind());
                tracing::error!(error = %e, "Reconciliation failed, stopping");
                return Err(e);
            }
            self.events.publish(BridgeEvent::ResyncStarted {
                from: last_contiguous,
                observed,
            });
        }
    }

    /// Forget the baseline; the next frame received from now on starts a new
    /// sequence. Frames received earlier and still queued are dropped.
    pub fn reset_sequence(&self) {
        let mut tracked = self.tracker.lock();
        tracked.sequence.reset();
        tracked.baseline_from = Some(Instant::now());
        tracing::debug!("Sequence baseline reset");
    }

    /// Read-only view of the tracker.
    #[must_use]
    pub fn snapshot(&self) -> SequenceSnapshot {
        self.tracker.lock().sequence.snapshot()
    }
}

impl std::fmt::Debug for SequenceReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceReconciler")
            .field("tracker", &self.snapshot())
            .finish_non_exhaustive()
    }
}

fn discard_queued(frames: &mut mpsc::Receiver<RawFrame>) -> usize {
    let mut discarded = 0;
    while frames.try_recv().is_ok() {
        metrics::record_frame_dropped(DropReason::Discarded);
        discarded += 1;
    }
    discarded
}
