//! Control Plane Module
//!
//! Request scoping, the control plane clients, and the orchestrator that
//! drives them.

pub mod backends;
pub mod context;
pub mod orchestrator;

pub use backends::*;
pub use context::*;
pub use orchestrator::*;
