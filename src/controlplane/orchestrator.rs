//! Orchestrator
//!
//! Wires placement inspection, attachment, capacity accounting and topology
//! resolution over a single control plane client.

use crate::capacity::{allocation_size_kib, CapacityAggregator};
use crate::controlplane::context::RequestContext;
use crate::domain::ports::{ControlPlane, LocalityPolicy, Segments};
use crate::error::Result;
use crate::placement::{AttachConfig, AttachmentAction, AttachmentEngine};
use crate::topology::TopologyResolver;
use crate::volume::VolumeParameters;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

// =============================================================================
// Orchestrator Configuration
// =============================================================================

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Attachment settings
    pub attach: AttachConfig,
    /// Deadline applied to every operation whose context has none shorter
    pub operation_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            attach: AttachConfig::default(),
            operation_timeout: Some(Duration::from_secs(120)),
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Entry point for every volume placement operation
pub struct Orchestrator {
    config: OrchestratorConfig,
    attachments: AttachmentEngine,
    capacity: CapacityAggregator,
    topology: TopologyResolver,
}

impl Orchestrator {
    /// Create an orchestrator over `control_plane`
    pub fn new<C>(config: OrchestratorConfig, control_plane: Arc<C>) -> Arc<Self>
    where
        C: ControlPlane + 'static,
    {
        info!(
            diskless_pool = %config.attach.diskless_storage_pool,
            timeout = ?config.operation_timeout,
            "orchestrator initialized"
        );

        Arc::new(Self {
            attachments: AttachmentEngine::new(control_plane.clone(), config.attach.clone()),
            capacity: CapacityAggregator::new(control_plane.clone()),
            topology: TopologyResolver::new(control_plane.clone(), control_plane),
            config,
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn scoped(&self, ctx: &RequestContext) -> RequestContext {
        match self.config.operation_timeout {
            Some(timeout) => ctx.clone().with_timeout(timeout),
            None => ctx.clone(),
        }
    }

    /// Make `volume` usable on `node`
    pub async fn attach(
        &self,
        ctx: &RequestContext,
        volume: &str,
        params: &VolumeParameters,
        node: &str,
    ) -> Result<AttachmentAction> {
        self.attachments
            .attach(&self.scoped(ctx), volume, params, node)
            .await
    }

    /// Free capacity in bytes reachable under `params` and `locality`
    pub async fn capacity_bytes(
        &self,
        ctx: &RequestContext,
        params: &VolumeParameters,
        locality: &Segments,
    ) -> Result<u64> {
        self.capacity
            .capacity_bytes(&self.scoped(ctx), params, locality)
            .await
    }

    /// Allocation size in KiB for a requested byte size
    pub fn allocation_size_kib(&self, requested_bytes: u64, limit_bytes: u64) -> Result<u64> {
        allocation_size_kib(requested_bytes, limit_bytes)
    }

    pub async fn nodes_for_locality(
        &self,
        ctx: &RequestContext,
        segments: &Segments,
    ) -> Result<Vec<String>> {
        self.topology
            .nodes_for_locality(&self.scoped(ctx), segments)
            .await
    }

    pub async fn all_nodes_for_locality_requisites(
        &self,
        ctx: &RequestContext,
        policy: &dyn LocalityPolicy,
        requisites: &[Segments],
    ) -> Result<Vec<String>> {
        self.topology
            .all_nodes_for_locality_requisites(&self.scoped(ctx), policy, requisites)
            .await
    }

    pub async fn accessible_topologies(
        &self,
        ctx: &RequestContext,
        volume: &str,
        policy: &dyn LocalityPolicy,
    ) -> Result<Option<Vec<Segments>>> {
        self.topology
            .accessible_topologies(&self.scoped(ctx), volume, policy)
            .await
    }
}
