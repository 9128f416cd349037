use std::sync::{Arc, Mutex};

use crate::logging::Logger;
use crate::metrics::DevMetrics;

/// Configuration knobs for one overlay session.
#[derive(Clone, Default)]
pub struct DevServerConfig {
    /// Development server host, e.g. `localhost:38989`.
    pub server_host: String,
    /// Name of the bundle this session debugs.
    pub bundle_name: String,
    /// Whether live-reload wiring should be active.
    pub live_debug: bool,
    /// Whether the remote-debug transport is in use.
    pub remote_debug: bool,
    /// Optional structured logger used by the session.
    pub logger: Option<Logger>,
    /// Metrics accumulator shared with the instrumentation stage.
    pub metrics: Option<Arc<Mutex<DevMetrics>>>,
}

impl DevServerConfig {
    pub fn new(server_host: impl Into<String>, bundle_name: impl Into<String>) -> Self {
        Self {
            server_host: server_host.into(),
            bundle_name: bundle_name.into(),
            ..Self::default()
        }
    }

    /// Enable metrics collection if it has not already been configured.
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(Mutex::new(DevMetrics::new())));
        }
    }

    /// Access the shared metrics handle if metrics are enabled.
    pub fn metrics_handle(&self) -> Option<Arc<Mutex<DevMetrics>>> {
        self.metrics.as_ref().map(Arc::clone)
    }
}
