//! Dev-support instrumentation layer for an embedded rendering runtime.
//!
//! Two halves share this crate. The resource pipeline intercepts every fetch
//! through an ordered processor chain and reports request/response pairs to
//! an external debugging backend, correlated by id. The overlay session
//! tracks every host surface the debug affordance is attached to and drives
//! the progress/exception dialogs and the reload fan-in for all of them.
//!
//! The modules follow the RSB `MODULE_SPEC` pattern: each area exposes an
//! orchestrator `mod.rs` while the implementation lives in a private
//! submodule.

pub mod devtools;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod overlay;
pub mod pipeline;
pub mod registry;

pub use devtools::{DebugBridge, DevtoolsProcessor, RequestSnapshot, ResponseSnapshot, SessionId};
pub use error::{DevError, Result};
pub use logging::{
    FileSink, LogEvent, LogFields, LogLevel, LogSink, Logger, LoggingError, LoggingResult,
    MemorySink, event_with_fields, json_kv,
};
pub use metrics::{DevMetrics, MetricSnapshot};
pub use overlay::{
    DevOverlay, DevServerConfig, DialogPresenter, DialogState, InlineDispatcher, LiveReload,
    LiveReloadCallback, MenuSelection, ReloadAction, ReloadCallback, UiDispatcher, UiTask,
};
pub use pipeline::{
    Continuation, FetchOutcome, FetchProcessor, ProcessorChain, RequestOrigin, ResourceLoader,
    ResourceRequest,
};
pub use registry::{AffordanceHandle, HostHandle, HostId, HostRegistry, HostSurface};
