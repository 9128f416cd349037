//! Devtools instrumentation orchestrator following the RSB module
//! specification.

mod core;

pub use core::{
    DebugBridge, DevtoolsProcessor, RequestSnapshot, ResponseSnapshot, SessionId,
};
