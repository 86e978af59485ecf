//! Domain layer - Control plane model and port definitions
//!
//! This module defines the LINSTOR resource model and the traits (ports)
//! that control plane clients implement.

pub mod ports;
pub mod resources;

pub use ports::*;
pub use resources::*;
