use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::metrics::DevMetrics;
use crate::pipeline::{Continuation, FetchProcessor, RequestOrigin, ResourceRequest};

/// Identifies one runtime instance towards the debugging backend.
pub type SessionId = u64;

/// Point-in-time copy of an outgoing request handed to the [`DebugBridge`].
/// The bridge never borrows the live record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSnapshot {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body_len: usize,
}

impl From<&ResourceRequest> for RequestSnapshot {
    fn from(request: &ResourceRequest) -> Self {
        Self {
            url: request.url.clone(),
            headers: request.headers.clone(),
            body_len: request.body.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseSnapshot {
    pub url: String,
    pub outcome: String,
    pub body_len: usize,
    pub error_message: Option<String>,
}

impl From<&ResourceRequest> for ResponseSnapshot {
    fn from(request: &ResourceRequest) -> Self {
        Self {
            url: request.url.clone(),
            outcome: request.outcome.as_str().to_string(),
            body_len: request.body.len(),
            error_message: request.error_message.clone(),
        }
    }
}

/// External sink that records forwarded network events for inspection.
/// Both calls are fire-and-forget; failures stay invisible to the caller.
pub trait DebugBridge: Send + Sync {
    fn notify_request(&self, session: SessionId, correlation: &str, snapshot: &RequestSnapshot);
    fn notify_response(&self, session: SessionId, correlation: &str, snapshot: &ResponseSnapshot);
}

/// Chain stage that reports every runtime-originated fetch to the
/// [`DebugBridge`]. Native-originated traffic passes through untouched; the
/// native layer already instruments itself.
pub struct DevtoolsProcessor {
    session: SessionId,
    bridge: Arc<dyn DebugBridge>,
    metrics: Option<Arc<Mutex<DevMetrics>>>,
}

impl DevtoolsProcessor {
    pub fn new(session: SessionId, bridge: Arc<dyn DebugBridge>) -> Self {
        Self {
            session,
            bridge,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Mutex<DevMetrics>>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn on_network_request(&self, request: &mut ResourceRequest) {
        if request.origin == RequestOrigin::Native {
            return;
        }
        if request.correlation_id().is_none() {
            request.set_correlation_id(wall_clock_id());
        }
        let correlation = request
            .correlation_id()
            .map(str::to_string)
            .unwrap_or_default();
        self.bridge
            .notify_request(self.session, &correlation, &RequestSnapshot::from(&*request));
        self.record(|m| m.record_request_forwarded());
    }

    fn on_network_response(&self, request: &ResourceRequest) {
        if request.origin == RequestOrigin::Native {
            return;
        }
        // A response whose request was never tagged (chain reordering) is
        // skipped rather than forwarded with an empty id.
        let Some(correlation) = request.correlation_id() else {
            self.record(|m| m.record_response_skipped());
            return;
        };
        self.bridge
            .notify_response(self.session, correlation, &ResponseSnapshot::from(request));
        self.record(|m| m.record_response_forwarded());
    }

    fn record(&self, update: impl FnOnce(&mut DevMetrics)) {
        if let Some(metrics) = self.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                update(&mut guard);
            }
        }
    }
}

fn wall_clock_id() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
        .to_string()
}

impl FetchProcessor for DevtoolsProcessor {
    fn name(&self) -> &str {
        "devtools_processor"
    }

    fn handle_request_sync(&mut self, request: &mut ResourceRequest) -> bool {
        self.on_network_request(request);
        false
    }

    fn handle_request_async(&mut self, request: &mut ResourceRequest, next: Continuation) {
        self.on_network_request(request);
        next.proceed();
    }

    fn handle_response_sync(&mut self, request: &mut ResourceRequest) -> bool {
        self.on_network_response(request);
        false
    }

    fn handle_response_async(&mut self, request: &mut ResourceRequest, next: Continuation) {
        self.on_network_response(request);
        next.proceed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{FetchOutcome, ProcessorChain};
    use std::sync::mpsc;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingBridge {
        requests: Mutex<Vec<(SessionId, String, RequestSnapshot)>>,
        responses: Mutex<Vec<(SessionId, String, ResponseSnapshot)>>,
    }

    impl RecordingBridge {
        fn requests(&self) -> Vec<(SessionId, String, RequestSnapshot)> {
            self.requests.lock().unwrap().clone()
        }

        fn responses(&self) -> Vec<(SessionId, String, ResponseSnapshot)> {
            self.responses.lock().unwrap().clone()
        }
    }

    impl DebugBridge for RecordingBridge {
        fn notify_request(
            &self,
            session: SessionId,
            correlation: &str,
            snapshot: &RequestSnapshot,
        ) {
            self.requests
                .lock()
                .unwrap()
                .push((session, correlation.to_string(), snapshot.clone()));
        }

        fn notify_response(
            &self,
            session: SessionId,
            correlation: &str,
            snapshot: &ResponseSnapshot,
        ) {
            self.responses
                .lock()
                .unwrap()
                .push((session, correlation.to_string(), snapshot.clone()));
        }
    }

    #[test]
    fn runtime_fetch_forwards_request_and_response_with_same_id() {
        let bridge = Arc::new(RecordingBridge::default());
        let chain = ProcessorChain::new();
        chain.register_processor(DevtoolsProcessor::new(7, bridge.clone()));

        let mut request = ResourceRequest::runtime("https://x/y");
        chain.fetch_sync(&mut request, &mut |req: &mut ResourceRequest| {
            req.succeed(b"bytes".to_vec());
        });

        let requests = bridge.requests();
        let responses = bridge.responses();
        assert_eq!(requests.len(), 1);
        assert_eq!(responses.len(), 1);
        assert_eq!(requests[0].0, 7);
        assert_eq!(requests[0].1, responses[0].1);
        assert!(!requests[0].1.is_empty());
        assert_eq!(responses[0].2.outcome, "succeeded");
        assert_eq!(responses[0].2.body_len, 5);
    }

    #[test]
    fn native_fetch_is_never_forwarded() {
        let bridge = Arc::new(RecordingBridge::default());
        let chain = ProcessorChain::new();
        chain.register_processor(DevtoolsProcessor::new(1, bridge.clone()));

        let mut request = ResourceRequest::native("https://x/y");
        chain.fetch_sync(&mut request, &mut |req: &mut ResourceRequest| {
            req.succeed(Vec::new());
        });

        assert!(bridge.requests().is_empty());
        assert!(bridge.responses().is_empty());
        assert!(request.correlation_id().is_none());
    }

    #[test]
    fn response_without_correlation_id_is_skipped() {
        let bridge = Arc::new(RecordingBridge::default());
        let metrics = Arc::new(Mutex::new(DevMetrics::new()));
        let mut processor =
            DevtoolsProcessor::new(1, bridge.clone()).with_metrics(metrics.clone());

        let mut request = ResourceRequest::runtime("https://x/y");
        request.succeed(Vec::new());
        // Response hook runs without the request hook ever assigning an id.
        processor.handle_response_sync(&mut request);

        assert!(bridge.responses().is_empty());
        let snap = metrics.lock().unwrap().snapshot(Duration::ZERO);
        assert_eq!(snap.responses_skipped, 1);
        assert_eq!(snap.responses_forwarded, 0);
    }

    #[test]
    fn existing_correlation_id_is_preserved() {
        let bridge = Arc::new(RecordingBridge::default());
        let mut processor = DevtoolsProcessor::new(1, bridge.clone());

        let mut request = ResourceRequest::runtime("https://x/y");
        request.set_correlation_id("12345");
        processor.handle_request_sync(&mut request);

        assert_eq!(request.correlation_id(), Some("12345"));
        assert_eq!(bridge.requests()[0].1, "12345");
    }

    #[test]
    fn async_fetch_forwards_exactly_once_per_direction() {
        let bridge = Arc::new(RecordingBridge::default());
        let chain = ProcessorChain::new();
        chain.register_processor(DevtoolsProcessor::new(3, bridge.clone()));

        let (tx, rx) = mpsc::channel();
        chain.fetch_async(
            ResourceRequest::runtime("https://x/y"),
            |req: &mut ResourceRequest| req.succeed(Vec::new()),
            move |req| tx.send(req).unwrap(),
        );
        let request = rx.recv_timeout(Duration::from_secs(1)).unwrap();

        assert_eq!(request.outcome, FetchOutcome::Succeeded);
        assert_eq!(bridge.requests().len(), 1);
        assert_eq!(bridge.responses().len(), 1);
        assert_eq!(bridge.requests()[0].1, bridge.responses()[0].1);
    }

    #[test]
    fn failed_fetch_forwards_failure_snapshot() {
        let bridge = Arc::new(RecordingBridge::default());
        let chain = ProcessorChain::new();
        chain.register_processor(DevtoolsProcessor::new(3, bridge.clone()));

        let mut request = ResourceRequest::runtime("https://x/y");
        chain.fetch_sync(&mut request, &mut |req: &mut ResourceRequest| {
            req.fail("connection refused");
        });

        let responses = bridge.responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].2.outcome, "failed");
        assert_eq!(
            responses[0].2.error_message.as_deref(),
            Some("connection refused")
        );
    }
}
