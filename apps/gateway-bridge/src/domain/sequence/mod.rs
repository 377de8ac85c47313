//! Sequence Tracking
//!
//! Pure state machine behind the reconciler. It decides, for every sequenced
//! frame, whether to accept it, treat it as a gap, or drop it as a stale
//! duplicate. It never performs I/O; the caller acts on the verdict.
//!
//! # States
//!
//! ```text
//!            gap (seq > expected)
//!   Synced ─────────────────────────► AwaitingResync
//!     ▲                                     │
//!     └──── accept (seq == expected or ─────┘
//!                 seq >= watermark)
//! ```
//!
//! The expected next number is always derived as `last_contiguous + 1`, so
//! the two can never disagree.

use serde::Serialize;

use crate::domain::report::SeqNum;

/// Continuity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// In order; gaps trigger a resync.
    #[default]
    Synced,
    /// A replay was requested; waiting for the gateway to fill the hole.
    AwaitingResync,
}

impl SyncState {
    /// Label for logs and health output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::AwaitingResync => "awaiting_resync",
        }
    }
}

/// What to do with a sequenced frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceVerdict {
    /// Forward the frame. `skipped` counts numbers jumped over via the
    /// reset watermark (normally zero).
    Accept {
        /// The accepted sequence number.
        seq: SeqNum,
        /// Numbers between the previous baseline and `seq` never seen.
        skipped: u64,
        /// Whether this acceptance ended a resync.
        resynced: bool,
    },
    /// A hole was detected; request replay from `last_contiguous`.
    Gap {
        /// Last number forwarded in order.
        last_contiguous: SeqNum,
        /// The number that revealed the hole.
        observed: SeqNum,
    },
    /// Duplicate or stale replay; drop silently.
    Stale {
        /// The dropped number.
        seq: SeqNum,
        /// What the tracker was waiting for.
        expected: SeqNum,
    },
}

/// Read-only view of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SequenceSnapshot {
    /// Current state.
    pub state: SyncState,
    /// Last number forwarded in order.
    pub last_contiguous: Option<SeqNum>,
    /// Next number expected.
    pub expected_next: Option<SeqNum>,
    /// Reset high-watermark, set while a resync is outstanding.
    pub reset_watermark: Option<SeqNum>,
    /// Frames accepted since start.
    pub accepted: u64,
    /// Frames dropped as stale since start.
    pub dropped: u64,
    /// Gaps detected since start.
    pub gaps: u64,
}

/// Monotonic sequence tracker for one gateway session.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    state: SyncState,
    last_contiguous: Option<SeqNum>,
    reset_watermark: Option<SeqNum>,
    accepted: u64,
    dropped: u64,
    gaps: u64,
}

impl SequenceTracker {
    /// Create a tracker with no baseline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a sequence number and update the baseline on acceptance.
    ///
    /// A gap does not change state by itself: the caller must request the
    /// replay and then call [`begin_resync`](Self::begin_resync). If the
    /// replay request fails the tracker is left untouched.
    pub fn observe(&mut self, seq: SeqNum) -> SequenceVerdict {
        let Some(last) = self.last_contiguous else {
            return self.accept(seq, 0);
        };
        let expected = last.saturating_add(1);

        if seq == expected {
            return self.accept(seq, 0);
        }

        if let Some(watermark) = self.reset_watermark
            && seq >= watermark
        {
            return self.accept(seq, seq.saturating_sub(expected));
        }

        if self.state == SyncState::Synced && seq > expected {
            self.gaps += 1;
            return SequenceVerdict::Gap {
                last_contiguous: last,
                observed: seq,
            };
        }

        self.dropped += 1;
        SequenceVerdict::Stale { seq, expected }
    }

    /// Record that a replay from the current baseline was requested because
    /// `observed` arrived early.
    pub const fn begin_resync(&mut self, observed: SeqNum) {
        self.reset_watermark = Some(observed);
        self.state = SyncState::AwaitingResync;
    }

    /// Forget everything; the next frame becomes the new baseline.
    pub const fn reset(&mut self) {
        self.state = SyncState::Synced;
        self.last_contiguous = None;
        self.reset_watermark = None;
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SyncState {
        self.state
    }

    /// Last number forwarded in order.
    #[must_use]
    pub const fn last_contiguous(&self) -> Option<SeqNum> {
        self.last_contiguous
    }

    /// Next number expected, if a baseline exists.
    #[must_use]
    pub fn expected_next(&self) -> Option<SeqNum> {
        self.last_contiguous.map(|last| last.saturating_add(1))
    }

    /// Reset high-watermark.
    #[must_use]
    pub const fn reset_watermark(&self) -> Option<SeqNum> {
        self.reset_watermark
    }

    /// Snapshot for health reporting.
    #[must_use]
    pub fn snapshot(&self) -> SequenceSnapshot {
        SequenceSnapshot {
            state: self.state,
            last_contiguous: self.last_contiguous,
            expected_next: self.expected_next(),
            reset_watermark: self.reset_watermark,
            accepted: self.accepted,
            dropped: self.dropped,
            gaps: self.gaps,
        }
    }

    fn accept(&mut self, seq: SeqNum, skipped: u64) -> SequenceVerdict {
        let resynced = self.state == SyncState::AwaitingResync;
        self.last_contiguous = Some(seq);
        self.reset_watermark = None;
        self.state = SyncState::Synced;
        self.accepted += 1;
        SequenceVerdict::Accept {
            seq,
            skipped,
            resynced,
        }
    }
}
