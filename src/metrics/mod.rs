//! Counters for the instrumentation layer, snapshotted through the logger.

use serde_json::json;
use std::time::Duration;

use crate::logging::{LogEvent, LogFields, LogLevel};

/// Saturating counter bag shared by the pipeline and the overlay.
#[derive(Debug, Default, Clone)]
pub struct DevMetrics {
    requests_forwarded: u64,
    responses_forwarded: u64,
    responses_skipped: u64,
    exceptions: u64,
    dialogs_shown: u64,
    reloads: u64,
    init_errors: u64,
}

impl DevMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request_forwarded(&mut self) {
        self.requests_forwarded = self.requests_forwarded.saturating_add(1);
    }

    pub fn record_response_forwarded(&mut self) {
        self.responses_forwarded = self.responses_forwarded.saturating_add(1);
    }

    /// Response arrived without a correlation id and was not forwarded.
    pub fn record_response_skipped(&mut self) {
        self.responses_skipped = self.responses_skipped.saturating_add(1);
    }

    pub fn record_exception(&mut self) {
        self.exceptions = self.exceptions.saturating_add(1);
    }

    pub fn record_dialog_shown(&mut self) {
        self.dialogs_shown = self.dialogs_shown.saturating_add(1);
    }

    pub fn record_reload(&mut self) {
        self.reloads = self.reloads.saturating_add(1);
    }

    pub fn record_init_error(&mut self) {
        self.init_errors = self.init_errors.saturating_add(1);
    }

    pub fn snapshot(&self, uptime: Duration) -> MetricSnapshot {
        MetricSnapshot {
            uptime_ms: uptime.as_millis() as u64,
            requests_forwarded: self.requests_forwarded,
            responses_forwarded: self.responses_forwarded,
            responses_skipped: self.responses_skipped,
            exceptions: self.exceptions,
            dialogs_shown: self.dialogs_shown,
            reloads: self.reloads,
            init_errors: self.init_errors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSnapshot {
    pub uptime_ms: u64,
    pub requests_forwarded: u64,
    pub responses_forwarded: u64,
    pub responses_skipped: u64,
    pub exceptions: u64,
    pub dialogs_shown: u64,
    pub reloads: u64,
    pub init_errors: u64,
}

impl MetricSnapshot {
    pub fn to_log_event(&self, target: &str) -> LogEvent {
        let mut fields = LogFields::new();
        fields.insert("uptime_ms".into(), json!(self.uptime_ms));
        fields.insert("requests_forwarded".into(), json!(self.requests_forwarded));
        fields.insert(
            "responses_forwarded".into(),
            json!(self.responses_forwarded),
        );
        fields.insert("responses_skipped".into(), json!(self.responses_skipped));
        fields.insert("exceptions".into(), json!(self.exceptions));
        fields.insert("dialogs_shown".into(), json!(self.dialogs_shown));
        fields.insert("reloads".into(), json!(self.reloads));
        fields.insert("init_errors".into(), json!(self.init_errors));
        LogEvent::with_fields(LogLevel::Info, target, "metrics_snapshot", fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let mut metrics = DevMetrics::new();
        metrics.record_request_forwarded();
        metrics.record_request_forwarded();
        metrics.record_response_forwarded();
        metrics.record_response_skipped();
        metrics.record_reload();

        let snap = metrics.snapshot(Duration::from_millis(1500));
        assert_eq!(snap.uptime_ms, 1500);
        assert_eq!(snap.requests_forwarded, 2);
        assert_eq!(snap.responses_forwarded, 1);
        assert_eq!(snap.responses_skipped, 1);
        assert_eq!(snap.reloads, 1);
        assert_eq!(snap.exceptions, 0);
    }

    #[test]
    fn snapshot_becomes_log_event() {
        let mut metrics = DevMetrics::new();
        metrics.record_init_error();
        let event = metrics
            .snapshot(Duration::from_secs(2))
            .to_log_event("devsupport::overlay.metrics");
        assert_eq!(event.target, "devsupport::overlay.metrics");
        assert_eq!(event.message, "metrics_snapshot");
        assert_eq!(event.fields["init_errors"], json!(1));
    }
}
