//! Host attachment registry orchestrator following the RSB module
//! specification.

mod core;

pub use core::{AffordanceHandle, HostHandle, HostId, HostRegistry, HostSurface};
