//! Placement Inspector
//!
//! Normalizes a volume's resource view into a strongly typed placement view:
//! which nodes hold replicas, what backs them, and whether the replica set
//! currently has quorum.

use crate::controlplane::context::RequestContext;
use crate::domain::ports::ResourceProviderRef;
use crate::domain::resources::{
    ResourceWithVolumes, FLAG_DISKLESS, FLAG_DRBD_DISKLESS, FLAG_INACTIVE, KEY_STOR_POOL_NAME,
    PROVIDER_DISKLESS,
};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

// =============================================================================
// Replica Snapshot
// =============================================================================

/// What backs a replica
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backing {
    /// No local storage, I/O goes over the network
    Diskless,
    /// Local storage on this node only
    Local,
    /// Storage shared with other nodes of `group`; at most one may be active
    Shared { group: String, active: bool },
}

/// Connection state towards one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConnection {
    pub connected: bool,
    pub reason: String,
}

/// One replica of a volume at inspection time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSnapshot {
    pub node: String,
    pub pool: String,
    pub backing: Backing,
    /// Peer connections keyed by peer node name
    pub peers: BTreeMap<String, PeerConnection>,
    pub promotion_score: i64,
    pub may_promote: bool,
}

impl ReplicaSnapshot {
    /// Normalize one entry of the resource view
    pub fn from_resource(resource: &ResourceWithVolumes) -> Self {
        let diskless = resource.has_flag(FLAG_DISKLESS)
            || resource.has_flag(FLAG_DRBD_DISKLESS)
            || resource
                .volumes
                .iter()
                .any(|v| v.provider_kind == PROVIDER_DISKLESS);

        let backing = match &resource.shared_name {
            _ if diskless => Backing::Diskless,
            Some(group) if !group.is_empty() => Backing::Shared {
                group: group.clone(),
                active: !resource.has_flag(FLAG_INACTIVE),
            },
            _ => Backing::Local,
        };

        let pool = resource
            .props
            .get(KEY_STOR_POOL_NAME)
            .cloned()
            .or_else(|| {
                resource
                    .volumes
                    .iter()
                    .map(|v| v.storage_pool_name.clone())
                    .find(|p| !p.is_empty())
            })
            .unwrap_or_default();

        let drbd = resource.drbd();
        let peers = drbd
            .map(|d| {
                d.connections
                    .iter()
                    .map(|(peer, conn)| {
                        (
                            peer.clone(),
                            PeerConnection {
                                connected: conn.connected,
                                reason: conn.message.clone(),
                            },
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            node: resource.node_name.clone(),
            pool,
            backing,
            peers,
            promotion_score: drbd.and_then(|d| d.promotion_score).unwrap_or(0),
            may_promote: drbd.and_then(|d| d.may_promote).unwrap_or(false),
        }
    }

    pub fn is_diskful(&self) -> bool {
        !matches!(self.backing, Backing::Diskless)
    }

    /// Inactive replicas on shared storage take no part in replication
    pub fn is_active(&self) -> bool {
        !matches!(self.backing, Backing::Shared { active: false, .. })
    }

    pub fn shared_group(&self) -> Option<&str> {
        match &self.backing {
            Backing::Shared { group, .. } => Some(group),
            _ => None,
        }
    }

    /// Eligible to become primary right now
    ///
    /// DRBD clears `may_promote` on every node while the volume is primary
    /// somewhere, so this is not a quorum signal.
    pub fn can_promote(&self) -> bool {
        self.may_promote && self.promotion_score > 0
    }

    /// Holds up-to-date data DRBD would promote from
    pub fn has_promotion_score(&self) -> bool {
        self.promotion_score > 0
    }

    pub fn is_connected_to(&self, peer: &str) -> bool {
        self.peers.get(peer).map(|c| c.connected).unwrap_or(false)
    }
}

// =============================================================================
// Quorum
// =============================================================================

/// Whether some replica with a positive promotion score reaches a majority
/// of the diskful replicas
///
/// Only active replicas count. A replica reaches itself (if diskful) and the
/// diskful peers it reports as connected. A partition where no such replica
/// sees more than half of the diskful set has no quorum.
pub fn has_quorum(replicas: &[ReplicaSnapshot]) -> bool {
    let diskful: BTreeSet<&str> = replicas
        .iter()
        .filter(|r| r.is_active() && r.is_diskful())
        .map(|r| r.node.as_str())
        .collect();

    if diskful.is_empty() {
        return false;
    }

    replicas
        .iter()
        .filter(|r| r.is_active() && r.has_promotion_score())
        .any(|r| {
            let own = usize::from(r.is_diskful());
            let peers = diskful
                .iter()
                .filter(|peer| **peer != r.node && r.is_connected_to(peer))
                .count();
            (own + peers) * 2 > diskful.len()
        })
}

// =============================================================================
// Placement View
// =============================================================================

/// Replicas of one shared-backing-device group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedGroup {
    pub name: String,
    pub members: Vec<String>,
    /// Nodes whose replica is currently active; more than one is an anomaly
    pub active: Vec<String>,
}

/// Normalized placement of a volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementView {
    pub volume: String,
    pub replicas: Vec<ReplicaSnapshot>,
    pub quorum: bool,
    pub shared_groups: BTreeMap<String, SharedGroup>,
}

impl PlacementView {
    /// Build the view; a node listed twice is rejected
    pub fn from_replicas(volume: &str, replicas: Vec<ReplicaSnapshot>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for replica in &replicas {
            if !seen.insert(replica.node.as_str()) {
                return Err(Error::InconsistentSnapshot {
                    volume: volume.to_string(),
                    reason: format!("node {} listed more than once", replica.node),
                });
            }
        }

        let mut shared_groups: BTreeMap<String, SharedGroup> = BTreeMap::new();
        for replica in &replicas {
            if let Backing::Shared { group, active } = &replica.backing {
                let entry = shared_groups
                    .entry(group.clone())
                    .or_insert_with(|| SharedGroup {
                        name: group.clone(),
                        ..Default::default()
                    });
                entry.members.push(replica.node.clone());
                if *active {
                    entry.active.push(replica.node.clone());
                }
            }
        }

        let quorum = has_quorum(&replicas);

        Ok(Self {
            volume: volume.to_string(),
            replicas,
            quorum,
            shared_groups,
        })
    }

    /// Nodes already hosting a replica of any kind
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.replicas.iter().map(|r| r.node.as_str())
    }

    pub fn replica(&self, node: &str) -> Option<&ReplicaSnapshot> {
        self.replicas.iter().find(|r| r.node == node)
    }

    pub fn has_quorum(&self) -> bool {
        self.quorum
    }

    pub fn is_shared(&self) -> bool {
        !self.shared_groups.is_empty()
    }

    pub fn shared_group(&self, name: &str) -> Option<&SharedGroup> {
        self.shared_groups.get(name)
    }
}

// =============================================================================
// Placement Inspector
// =============================================================================

/// Reads and normalizes the placement of a volume
pub struct PlacementInspector {
    resources: ResourceProviderRef,
}

impl PlacementInspector {
    pub fn new(resources: ResourceProviderRef) -> Self {
        Self { resources }
    }

    /// One resource view read, never cached
    pub async fn inspect(&self, ctx: &RequestContext, volume: &str) -> Result<PlacementView> {
        let resources = ctx
            .run(self.resources.resource_view(volume))
            .await
            .map_err(|source| Error::ResourceQuery {
                volume: volume.to_string(),
                source,
            })?;

        let replicas = resources
            .iter()
            .map(ReplicaSnapshot::from_resource)
            .collect();
        let view = PlacementView::from_replicas(volume, replicas)?;

        debug!(
            volume,
            nodes = ?view.nodes().collect::<Vec<_>>(),
            quorum = view.quorum,
            shared = view.is_shared(),
            "inspected placement"
        );

        Ok(view)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    pub const ALL_ONLINE: &str = include_str!("fixtures/all_online.json");
    pub const ONE_OFFLINE_QUORUM: &str = include_str!("fixtures/one_offline_quorum.json");
    pub const ONE_OFFLINE_NO_QUORUM: &str = include_str!("fixtures/one_offline_no_quorum.json");
    pub const FORCE_DISCONNECT_NO_QUORUM: &str =
        include_str!("fixtures/force_disconnect_no_quorum.json");
    pub const SHARED_STORAGE_POOL: &str = include_str!("fixtures/shared_storage_pool.json");
    pub const IN_USE_ALL_CONNECTED: &str = include_str!("fixtures/in_use_all_connected.json");
    pub const SHARED_TWO_ACTIVE: &str = include_str!("fixtures/shared_two_active.json");
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::controlplane::backends::{MemoryControlPlane, Operation};
    use crate::error::ControlPlaneError;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn view(json: &str) -> PlacementView {
        let resources: Vec<ResourceWithVolumes> = serde_json::from_str(json).unwrap();
        let replicas = resources.iter().map(ReplicaSnapshot::from_resource).collect();
        PlacementView::from_replicas("rsc1", replicas).unwrap()
    }

    #[test]
    fn test_quorum_from_fixtures() {
        assert!(view(ALL_ONLINE).has_quorum());
        assert!(view(ONE_OFFLINE_QUORUM).has_quorum());
        assert!(!view(ONE_OFFLINE_NO_QUORUM).has_quorum());
        assert!(!view(FORCE_DISCONNECT_NO_QUORUM).has_quorum());
        assert!(view(SHARED_STORAGE_POOL).has_quorum());
    }

    #[test]
    fn test_in_use_volume_keeps_quorum() {
        let v = view(IN_USE_ALL_CONNECTED);
        assert!(v.replicas.iter().all(|r| !r.can_promote()));
        assert!(v.has_quorum());
    }

    #[test]
    fn test_normalization() {
        let v = view(ONE_OFFLINE_NO_QUORUM);
        assert_eq!(v.nodes().collect::<Vec<_>>(), vec!["node-0", "node-1", "node-2"]);

        let offline = v.replica("node-0").unwrap();
        assert_eq!(offline.backing, Backing::Local);
        assert_eq!(offline.pool, "thinpool");
        assert!(offline.peers.is_empty());
        assert!(!offline.can_promote());

        let diskless = v.replica("node-2").unwrap();
        assert_eq!(diskless.backing, Backing::Diskless);
        assert!(!diskless.is_diskful());
        assert_eq!(diskless.peers["node-0"].reason, "Connecting");
        assert!(diskless.is_connected_to("node-1"));
        assert!(!v.is_shared());
    }

    #[test]
    fn test_shared_group() {
        let v = view(SHARED_STORAGE_POOL);
        assert!(v.is_shared());

        let group = v.shared_group("shared").unwrap();
        assert_eq!(group.members, vec!["node-0", "node-1", "node-2"]);
        assert_eq!(group.active, vec!["node-0"]);
        assert_eq!(v.replica("node-1").unwrap().shared_group(), Some("shared"));
        assert!(!v.replica("node-1").unwrap().is_active());
    }

    #[test]
    fn test_isolated_islands_have_no_quorum() {
        let island = |node: &str, peers: &[&str]| ReplicaSnapshot {
            node: node.into(),
            pool: "thinpool".into(),
            backing: Backing::Local,
            peers: peers
                .iter()
                .map(|p| {
                    (
                        p.to_string(),
                        PeerConnection {
                            connected: false,
                            reason: "StandAlone".into(),
                        },
                    )
                })
                .collect(),
            promotion_score: 10100,
            may_promote: true,
        };

        let replicas = vec![island("a", &["b"]), island("b", &["a"])];
        assert!(!has_quorum(&replicas));

        // A single healthy diskful replica is its own majority
        assert!(has_quorum(&replicas[..1]));
        assert!(!has_quorum(&[]));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let resources: Vec<ResourceWithVolumes> = serde_json::from_str(ALL_ONLINE).unwrap();
        let mut replicas: Vec<ReplicaSnapshot> =
            resources.iter().map(ReplicaSnapshot::from_resource).collect();
        replicas.push(replicas[0].clone());

        assert_matches!(
            PlacementView::from_replicas("rsc1", replicas),
            Err(Error::InconsistentSnapshot { .. })
        );
    }

    #[tokio::test]
    async fn test_inspect_reads_once() {
        let cp = Arc::new(MemoryControlPlane::new());
        cp.set_resources_json("rsc1", ONE_OFFLINE_QUORUM).unwrap();
        let inspector = PlacementInspector::new(cp.clone());

        let v = inspector.inspect(&RequestContext::new(), "rsc1").await.unwrap();
        assert!(v.has_quorum());
        assert_eq!(cp.calls_of(Operation::ResourceView).len(), 1);
        assert!(cp.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_inspect_failure() {
        let cp = Arc::new(MemoryControlPlane::new());
        cp.fail_with(Operation::ResourceView, || ControlPlaneError::Cancelled);
        let inspector = PlacementInspector::new(cp);

        let result = inspector.inspect(&RequestContext::new(), "rsc1").await;
        assert_matches!(
            result,
            Err(Error::ResourceQuery {
                source: ControlPlaneError::Cancelled,
                ..
            })
        );
    }
}
