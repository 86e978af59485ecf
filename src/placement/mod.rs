//! Placement Module
//!
//! Inspection of where a volume's replicas live and the attachment engine
//! built on top of it.

pub mod attach;
pub mod inspector;

pub use attach::*;
pub use inspector::*;
