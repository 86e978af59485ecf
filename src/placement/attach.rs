//! Attachment Engine
//!
//! Makes a volume usable on a node: decides from the current placement
//! whether a replica must be created or a shared replica switched over, then
//! carries the decision out step by step.

use super::inspector::{PlacementInspector, PlacementView};
use crate::controlplane::context::RequestContext;
use crate::domain::ports::ResourceProviderRef;
use crate::domain::resources::{
    Resource, ResourceCreate, FLAG_DRBD_DISKLESS, KEY_STOR_POOL_NAME,
};
use crate::error::{AttachStep, ControlPlaneError, Error, Result};
use crate::volume::{validate_node_name, validate_resource_name, VolumeParameters};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// Property marking replicas created on behalf of an attachment
pub const PROPERTY_CREATED_FOR: &str = "Aux/csi-created-for";

/// Value of [`PROPERTY_CREATED_FOR`] for diskless attach replicas
pub const CREATED_FOR_TEMPORARY_DISKLESS_ATTACH: &str = "temporary-diskless-attach";

/// Diskless pool used when neither the volume nor the config names one
pub const DEFAULT_DISKLESS_STORAGE_POOL: &str = "DfltDisklessStorPool";

// =============================================================================
// Decision
// =============================================================================

/// What an attachment has to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AttachmentAction {
    /// The node already hosts a usable replica
    NoOp,
    /// Add a diskless replica; quorum is intact and stays so
    CreateQuorumPreservingDisklessReplica,
    /// Add a replica the control plane may place freely, to help regain quorum
    CreateQuorumRestoringReplica,
    /// Switch the active replica of a shared group over to the target
    ReactivateSharedReplica {
        deactivate: Vec<String>,
        activate: String,
    },
}

impl fmt::Display for AttachmentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentAction::NoOp => write!(f, "no-op"),
            AttachmentAction::CreateQuorumPreservingDisklessReplica => {
                write!(f, "create diskless replica")
            }
            AttachmentAction::CreateQuorumRestoringReplica => {
                write!(f, "create quorum restoring replica")
            }
            AttachmentAction::ReactivateSharedReplica {
                deactivate,
                activate,
            } => write!(
                f,
                "reactivate shared replica on {} (deactivating {:?})",
                activate, deactivate
            ),
        }
    }
}

/// Decide the attachment of `target` from an inspected placement
///
/// A shared group ends up with the target as its only active member, also
/// when the target is already active next to others.
pub fn decide(view: &PlacementView, target: &str) -> AttachmentAction {
    if let Some(replica) = view.replica(target) {
        if let Some(group) = replica.shared_group() {
            let deactivate: Vec<String> = view
                .shared_group(group)
                .map(|g| {
                    g.active
                        .iter()
                        .filter(|n| n.as_str() != target)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            if !replica.is_active() || !deactivate.is_empty() {
                return AttachmentAction::ReactivateSharedReplica {
                    deactivate,
                    activate: target.to_string(),
                };
            }
        }
        return AttachmentAction::NoOp;
    }

    if view.has_quorum() {
        AttachmentAction::CreateQuorumPreservingDisklessReplica
    } else {
        AttachmentAction::CreateQuorumRestoringReplica
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Attachment configuration
#[derive(Debug, Clone)]
pub struct AttachConfig {
    /// Diskless pool for volumes that do not name one
    pub diskless_storage_pool: String,
    /// Property set on every replica created by an attachment
    pub marker_key: String,
    pub marker_value: String,
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self {
            diskless_storage_pool: DEFAULT_DISKLESS_STORAGE_POOL.to_string(),
            marker_key: PROPERTY_CREATED_FOR.to_string(),
            marker_value: CREATED_FOR_TEMPORARY_DISKLESS_ATTACH.to_string(),
        }
    }
}

/// Executes attachments against the control plane
pub struct AttachmentEngine {
    resources: ResourceProviderRef,
    inspector: PlacementInspector,
    config: AttachConfig,
}

impl AttachmentEngine {
    pub fn new(resources: ResourceProviderRef, config: AttachConfig) -> Self {
        Self {
            inspector: PlacementInspector::new(resources.clone()),
            resources,
            config,
        }
    }

    /// Make `volume` usable on `node`
    ///
    /// Names are validated before any remote call. The placement is read
    /// once; a concurrent change between inspection and mutation surfaces as
    /// an error of the failing step and is left for the caller to retry.
    #[instrument(skip(self, ctx, params), fields(placement_count = ?params.placement_count))]
    pub async fn attach(
        &self,
        ctx: &RequestContext,
        volume: &str,
        params: &VolumeParameters,
        node: &str,
    ) -> Result<AttachmentAction> {
        validate_resource_name(volume)?;
        validate_node_name(node)?;

        let view = self.inspector.inspect(ctx, volume).await.map_err(|e| match e {
            Error::ResourceQuery { source, .. } => {
                Error::attach(AttachStep::Inspection, volume, node, source)
            }
            other => other,
        })?;

        let action = decide(&view, node);
        debug!(%action, quorum = view.has_quorum(), "attachment decided");

        match &action {
            AttachmentAction::NoOp => {
                debug!("replica already present");
                return Ok(action);
            }
            AttachmentAction::ReactivateSharedReplica {
                deactivate,
                activate,
            } => {
                for other in deactivate {
                    info!(node = %other, "deactivating shared replica");
                    ctx.run(self.resources.deactivate(volume, other))
                        .await
                        .map_err(|e| Error::attach(AttachStep::Deactivation, volume, node, e))?;
                }
                ctx.run(self.resources.activate(volume, activate))
                    .await
                    .map_err(|e| Error::attach(AttachStep::Activation, volume, node, e))?;
                info!("shared replica activated");
                return Ok(action);
            }
            AttachmentAction::CreateQuorumPreservingDisklessReplica => {}
            AttachmentAction::CreateQuorumRestoringReplica => {
                warn!(
                    volume,
                    node, "volume has no quorum, letting the control plane place the new replica"
                );
            }
        }

        let create = self.replica_create(&action, volume, params, node);
        match ctx.run(self.resources.create(create)).await {
            Ok(()) => info!(%action, "replica created"),
            Err(ControlPlaneError::AlreadyExists(existing)) => {
                debug!(existing = %existing, "replica appeared concurrently")
            }
            Err(e) => return Err(Error::attach(AttachStep::Creation, volume, node, e)),
        }

        ctx.run(self.resources.get(volume, node))
            .await
            .map_err(|e| Error::attach(AttachStep::Verification, volume, node, e))?;

        Ok(action)
    }

    fn replica_create(
        &self,
        action: &AttachmentAction,
        volume: &str,
        params: &VolumeParameters,
        node: &str,
    ) -> ResourceCreate {
        let mut props = BTreeMap::new();
        props.insert(
            self.config.marker_key.clone(),
            self.config.marker_value.clone(),
        );

        let mut flags = Vec::new();
        if matches!(action, AttachmentAction::CreateQuorumPreservingDisklessReplica) {
            let pool = params
                .diskless_storage_pool
                .clone()
                .unwrap_or_else(|| self.config.diskless_storage_pool.clone());
            props.insert(KEY_STOR_POOL_NAME.to_string(), pool);
            flags.push(FLAG_DRBD_DISKLESS.to_string());
        }

        ResourceCreate {
            resource: Resource {
                name: volume.to_string(),
                node_name: node.to_string(),
                props,
                flags,
            },
            layer_list: params.layer_list.clone(),
        }
    }
}
