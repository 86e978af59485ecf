//! Topology Module
//!
//! Locality keys understood by the controller, the remote access policy
//! that expands them, and resolution of locality constraints to node names.

pub mod policy;
pub mod resolver;

pub use policy::*;
pub use resolver::*;

/// Segment key naming a single node
pub const NODE_KEY: &str = "linbit.com/hostname";

/// Prefix of segment keys naming a storage pool, followed by the pool name
pub const STORAGE_POOL_KEY_PREFIX: &str = "linbit.com/sp-";

/// Value of storage pool segments
pub const STORAGE_POOL_VALUE: &str = "true";
