//! Capacity Module
//!
//! Free capacity accounting over the cluster's storage pool report, and the
//! byte to allocation unit conversion used when sizing volumes.

pub mod aggregator;
pub mod allocation;

pub use aggregator::*;
pub use allocation::*;
