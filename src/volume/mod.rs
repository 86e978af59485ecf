//! Volume Module
//!
//! Volume-level inputs: naming rules and storage class parameters.

pub mod naming;
pub mod parameters;

pub use naming::*;
pub use parameters::*;
