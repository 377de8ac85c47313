//! Dispatch Gate
//!
//! Holds back execution reports while a synchronous order call is in flight
//! so the host never sees a fill before the submit reply that created the
//! order. States: Open (reports go straight to the handler) and Locked
//! (reports queue in the replay buffer).
//!
//! "Buffer if locked, else dispatch" and "buffer empty, so unlock" are
//! decided under the same mutex, so a live report can never overtake a
//! buffered one. The handler is always called with that mutex released:
//! release pops one report at a time and keeps the gate locked until the
//! buffer is empty. Release is tied to a drop guard and therefore happens
//! whether the call returns, fails, panics, or is abandoned by its caller.
//!
//! With a non-zero grace period the gate stays locked for that long after
//! the call returns, which gives the reports triggered by the call time to
//! arrive behind the reply. The pending release owns the call permit; the
//! timer task and [`DispatchGate::release_now`] race to take it, and only
//! the winner drains and lets the next call in.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

use crate::application::ports::ExecutionReportHandler;
use crate::domain::report::ExecutionReport;
use crate::infrastructure::metrics::{self, DispatchPath};

/// What happened to a submitted report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Delivered to the handler.
    Dispatched,
    /// Queued until the in-flight call releases the gate.
    Buffered,
}

/// Read-only view of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateSnapshot {
    /// A call holds the gate.
    pub locked: bool,
    /// Reports waiting in the replay buffer.
    pub buffered: usize,
    /// Reports delivered straight through.
    pub dispatched_live: u64,
    /// Reports delivered from the replay buffer.
    pub dispatched_replayed: u64,
    /// A grace-period release is scheduled.
    pub release_pending: bool,
}

#[derive(Debug, Default)]
struct GateState {
    locked: bool,
    buffer: VecDeque<ExecutionReport>,
}

/// Serializes synchronous calls against report delivery.
pub struct DispatchGate {
    state: Mutex<GateState>,
    call_permit: Arc<tokio::sync::Mutex<()>>,
    handler: Arc<dyn ExecutionReportHandler>,
    grace: Duration,
    pending_release: Mutex<Option<PendingRelease>>,
    dispatched_live: AtomicU64,
    dispatched_replayed: AtomicU64,
}

impl DispatchGate {
    /// Gate that releases as soon as each call completes.
    #[must_use]
    pub fn new(handler: Arc<dyn ExecutionReportHandler>) -> Self {
        Self::with_grace(handler, Duration::ZERO)
    }

    /// Gate that stays locked for `grace` after each call completes.
    #[must_use]
    pub fn with_grace(handler: Arc<dyn ExecutionReportHandler>, grace: Duration) -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            call_permit: Arc::new(tokio::sync::Mutex::new(())),
            handler,
            grace,
            pending_release: Mutex::new(None),
            dispatched_live: AtomicU64::new(0),
            dispatched_replayed: AtomicU64::new(0),
        }
    }

    /// Deliver a report now, or buffer it while a call holds the gate.
    pub fn submit(&self, report: ExecutionReport) -> Submission {
        {
            let mut state = self.state.lock();
            if state.locked {
                tracing::debug!(
                    client_order_id = %report.client_order_id,
                    kind = report.kind_label(),
                    buffered = state.buffer.len() + 1,
                    "Call in flight, buffering report"
                );
                state.buffer.push_back(report);
                metrics::set_replay_buffer_depth(state.buffer.len());
                return Submission::Buffered;
            }
        }
        self.deliver(report, DispatchPath::Live);
        Submission::Dispatched
    }

    /// Run `body` while holding the gate.
    ///
    /// Calls are serialized: a second caller waits until the first call's
    /// release (including any grace period) has completed.
    pub async fn with_exclusive_call<F, Fut, T>(self: &Arc<Self>, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let permit = Arc::clone(&self.call_permit).lock_owned().await;
        self.state.lock().locked = true;

        let guard = CallGuard {
            gate: Arc::clone(self),
            permit: Some(permit),
        };
        let output = body().await;
        drop(guard);
        output
    }

    /// Fire a scheduled grace-period release immediately.
    pub fn release_now(&self) {
        let pending = self.pending_release.lock().take();
        if let Some(pending) = pending {
            pending.timer.cancel();
            self.release();
            drop(pending.permit);
        }
    }

    /// Whether a call currently holds the gate.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    /// Read-only view for health reporting.
    #[must_use]
    pub fn snapshot(&self) -> GateSnapshot {
        let state = self.state.lock();
        GateSnapshot {
            locked: state.locked,
            buffered: state.buffer.len(),
            dispatched_live: self.dispatched_live.load(Ordering::Relaxed),
            dispatched_replayed: self.dispatched_replayed.load(Ordering::Relaxed),
            release_pending: self.pending_release.lock().is_some(),
        }
    }

    fn schedule_release(self: &Arc<Self>, permit: OwnedMutexGuard<()>) {
        if self.grace.is_zero() {
            self.release();
            drop(permit);
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.release();
            drop(permit);
            return;
        };

        let timer = CancellationToken::new();
        *self.pending_release.lock() = Some(PendingRelease {
            timer: timer.clone(),
            permit,
        });
        let gate = Arc::clone(self);
        let grace = self.grace;
        runtime.spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(grace) => {}
                () = timer.cancelled() => {}
            }
            let pending = gate.pending_release.lock().take();
            if let Some(pending) = pending {
                gate.release();
                drop(pending.permit);
            }
        });
    }

    fn release(&self) {
        let mut replayed = 0_usize;
        loop {
            let next = {
                let mut state = self.state.lock();
                let next = state.buffer.pop_front();
                if next.is_none() {
                    state.locked = false;
                }
                metrics::set_replay_buffer_depth(state.buffer.len());
                next
            };
            let Some(report) = next else { break };
            self.deliver(report, DispatchPath::Replayed);
            replayed += 1;
        }
        if replayed > 0 {
            tracing::debug!(replayed, "Gate released, replay buffer drained");
        }
    }

    fn deliver(&self, report: ExecutionReport, path: DispatchPath) {
        let counter = match path {
            DispatchPath::Live => &self.dispatched_live,
            DispatchPath::Replayed => &self.dispatched_replayed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::record_report_dispatched(report.kind_label(), path);
        self.handler.on_report(report);
    }
}

impl std::fmt::Debug for DispatchGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchGate")
            .field("grace", &self.grace)
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

struct PendingRelease {
    timer: CancellationToken,
    permit: OwnedMutexGuard<()>,
}

struct CallGuard {
    gate: Arc<DispatchGate>,
    permit: Option<OwnedMutexGuard<()>>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.gate.schedule_release(permit);
        }
    }
}
