//! Domain Ports - Core trait definitions for the attachment controller
//!
//! These traits define the boundary between the placement logic and the
//! LINSTOR control plane. One implementation exists per transport; tests use
//! the in-memory one.

use super::resources::{Node, NodeFilter, Resource, ResourceCreate, ResourceWithVolumes, StoragePool};
use crate::error::ControlPlaneResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Locality segments: key/value facts a node must match
pub type Segments = BTreeMap<String, String>;

// =============================================================================
// Resource Port
// =============================================================================

/// Port for resource queries and mutations
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// All resources of a volume, with layer and connection state
    async fn resource_view(&self, volume: &str) -> ControlPlaneResult<Vec<ResourceWithVolumes>>;

    /// Create a resource on a node
    async fn create(&self, create: ResourceCreate) -> ControlPlaneResult<()>;

    /// Get the resource of a volume on a node
    async fn get(&self, volume: &str, node: &str) -> ControlPlaneResult<Resource>;

    /// Activate an inactive resource on a shared pool
    async fn activate(&self, volume: &str, node: &str) -> ControlPlaneResult<()>;

    /// Deactivate a resource on a shared pool
    async fn deactivate(&self, volume: &str, node: &str) -> ControlPlaneResult<()>;
}

// =============================================================================
// Node Port
// =============================================================================

/// Port for node list queries
#[async_trait]
pub trait NodeProvider: Send + Sync {
    /// All nodes matching the filter
    async fn nodes(&self, filter: &NodeFilter) -> ControlPlaneResult<Vec<Node>>;
}

// =============================================================================
// Storage Pool Port
// =============================================================================

/// Port for the cluster-wide storage pool capacity report
#[async_trait]
pub trait StoragePoolProvider: Send + Sync {
    /// Every storage pool on every node
    async fn storage_pool_view(&self) -> ControlPlaneResult<Vec<StoragePool>>;
}

/// A full control plane client
pub trait ControlPlane: ResourceProvider + NodeProvider + StoragePoolProvider {}

impl<T> ControlPlane for T where T: ResourceProvider + NodeProvider + StoragePoolProvider {}

// =============================================================================
// Locality Policy Port
// =============================================================================

/// Expansion of locality requirements into concrete segment maps
///
/// Decides from where a volume located at some segments may be accessed.
pub trait LocalityPolicy: Send + Sync {
    /// All segment maps compatible with `segments`
    fn accessible_segments(&self, segments: &Segments) -> Vec<Segments>;

    /// Remove redundant segment maps
    fn prune(&self, segments: Vec<Segments>) -> Vec<Segments> {
        let mut unique: Vec<Segments> = Vec::with_capacity(segments.len());
        for segment in segments {
            if !unique.contains(&segment) {
                unique.push(segment);
            }
        }
        unique
    }
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ResourceProviderRef = Arc<dyn ResourceProvider>;
pub type NodeProviderRef = Arc<dyn NodeProvider>;
pub type StoragePoolProviderRef = Arc<dyn StoragePoolProvider>;
