//! Resource pipeline orchestrator following the RSB module specification.
//!
//! The processor chain and its request/response types live in the private
//! `core` module; downstream code imports everything from here.

mod core;

pub use core::{
    Continuation, FetchOutcome, FetchProcessor, ProcessorChain, RequestOrigin, ResourceLoader,
    ResourceRequest,
};
