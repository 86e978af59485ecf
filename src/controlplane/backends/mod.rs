//! Control Plane Backends
//!
//! Implementations of the control plane ports:
//! - LINSTOR: REST client for a live controller
//! - Memory: deterministic in-memory control plane

pub mod linstor;
pub mod memory;

pub use linstor::*;
pub use memory::*;
