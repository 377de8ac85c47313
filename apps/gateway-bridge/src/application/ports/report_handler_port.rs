//! Execution Report Handler Port (Driver Port)
//!
//! The host's callback. Invoked once per reconciled report, in order, from
//! the reconciler task or the task releasing the dispatch gate. The gate's
//! mutex is not held during the call, so implementations may read bridge
//! state, but they should return promptly.

use parking_lot::Mutex;

use crate::domain::report::ExecutionReport;

/// Receives reconciled execution reports.
#[cfg_attr(test, mockall::automock)]
pub trait ExecutionReportHandler: Send + Sync {
    /// Handle one report.
    fn on_report(&self, report: ExecutionReport);
}

/// Handler that keeps every report it receives, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingReportHandler {
    reports: Mutex<Vec<ExecutionReport>>,
}

impl RecordingReportHandler {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports received so far, in delivery order.
    #[must_use]
    pub fn reports(&self) -> Vec<ExecutionReport> {
        self.reports.lock().clone()
    }

    /// Client order ids received so far, in delivery order.
    #[must_use]
    pub fn client_order_ids(&self) -> Vec<String> {
        self.reports
            .lock()
            .iter()
            .map(|r| r.client_order_id.clone())
            .collect()
    }

    /// Number of reports received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    /// Whether nothing has been received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl ExecutionReportHandler for RecordingReportHandler {
    fn on_report(&self, report: ExecutionReport) {
        self.reports.lock().push(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::ReportKind;

    fn report(id: &str) -> ExecutionReport {
        ExecutionReport {
            client_order_id: id.to_string(),
            orig_client_order_id: None,
            order_status: None,
            exec_type: Some("NEW".to_string()),
            text: None,
            transact_time: None,
            kind: ReportKind::Acknowledgement,
        }
    }

    #[test]
    fn recorder_keeps_delivery_order() {
        let recorder = RecordingReportHandler::new();
        assert!(recorder.is_empty());

        recorder.on_report(report("a"));
        recorder.on_report(report("b"));

        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.client_order_ids(), vec!["a", "b"]);
    }
}
