//! Topology Node Resolver
//!
//! Turns locality constraints into concrete node names.

use super::NODE_KEY;
use crate::controlplane::context::RequestContext;
use crate::domain::ports::{LocalityPolicy, NodeProviderRef, ResourceProviderRef, Segments};
use crate::domain::resources::NodeFilter;
use crate::error::{Error, Result};
use crate::placement::ReplicaSnapshot;
use futures::future::try_join_all;
use indexmap::IndexSet;
use tracing::{debug, instrument};

fn describe(segments: &Segments) -> String {
    format!("{:?}", segments)
}

/// Resolves locality constraints against the cluster's nodes
pub struct TopologyResolver {
    nodes: NodeProviderRef,
    resources: ResourceProviderRef,
}

impl TopologyResolver {
    pub fn new(nodes: NodeProviderRef, resources: ResourceProviderRef) -> Self {
        Self { nodes, resources }
    }

    /// All nodes matching `segments`
    ///
    /// A segment naming the node directly is answered without a remote call.
    /// Otherwise every pair becomes an auxiliary property filter and the
    /// nodes matching all of them are returned.
    pub async fn nodes_for_locality(
        &self,
        ctx: &RequestContext,
        segments: &Segments,
    ) -> Result<Vec<String>> {
        if let Some(node) = segments.get(NODE_KEY) {
            return Ok(vec![node.clone()]);
        }

        let filter = NodeFilter::aux(segments);
        let nodes = ctx
            .run(self.nodes.nodes(&filter))
            .await
            .map_err(|source| Error::NodeQuery {
                segments: describe(segments),
                source,
            })?;

        debug!(segments = ?segments, matched = nodes.len(), "resolved segments via node query");

        Ok(nodes.into_iter().map(|n| n.name).collect())
    }

    /// Union of the nodes of every requisite, in first-seen order
    ///
    /// Each requisite is expanded through `policy`, the expansions pruned,
    /// and each remaining segment map resolved. No requisites (or an empty
    /// expansion) means no constraint: every node.
    #[instrument(skip(self, ctx, policy))]
    pub async fn all_nodes_for_locality_requisites(
        &self,
        ctx: &RequestContext,
        policy: &dyn LocalityPolicy,
        requisites: &[Segments],
    ) -> Result<Vec<String>> {
        let expanded: Vec<Segments> = requisites
            .iter()
            .flat_map(|r| policy.accessible_segments(r))
            .collect();

        let mut segments = policy.prune(expanded);
        if segments.is_empty() {
            segments.push(Segments::new());
        }

        let resolved = try_join_all(segments.iter().map(|s| self.nodes_for_locality(ctx, s))).await?;

        let all: IndexSet<String> = resolved.into_iter().flatten().collect();
        Ok(all.into_iter().collect())
    }

    /// Segments from which a volume can be accessed, given where its data is
    ///
    /// `None` means accessible from everywhere.
    #[instrument(skip(self, ctx, policy))]
    pub async fn accessible_topologies(
        &self,
        ctx: &RequestContext,
        volume: &str,
        policy: &dyn LocalityPolicy,
    ) -> Result<Option<Vec<Segments>>> {
        let resources = ctx
            .run(self.resources.resource_view(volume))
            .await
            .map_err(|source| Error::ResourceQuery {
                volume: volume.to_string(),
                source,
            })?;

        let diskful: Vec<String> = resources
            .iter()
            .map(ReplicaSnapshot::from_resource)
            .filter(ReplicaSnapshot::is_diskful)
            .map(|r| r.node)
            .collect();

        if diskful.is_empty() {
            return Ok(Some(Vec::new()));
        }

        let filter = NodeFilter::names(diskful);
        let nodes = ctx
            .run(self.nodes.nodes(&filter))
            .await
            .map_err(|source| Error::NodeQuery {
                segments: format!("nodes={:?}", filter.nodes),
                source,
            })?;

        let mut topologies = Vec::new();
        for node in &nodes {
            let mut segments = node.aux_props();
            segments
                .entry(NODE_KEY.to_string())
                .or_insert_with(|| node.name.clone());

            for accessible in policy.accessible_segments(&segments) {
                if accessible.is_empty() {
                    return Ok(None);
                }
                topologies.push(accessible);
            }
        }

        Ok(Some(topologies))
    }
}
