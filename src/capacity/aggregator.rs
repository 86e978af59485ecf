//! Capacity Aggregator
//!
//! Sums free storage pool capacity reachable under node and pool constraints.

use crate::controlplane::context::RequestContext;
use crate::domain::ports::{Segments, StoragePoolProviderRef};
use crate::domain::resources::StoragePool;
use crate::error::{Error, Result};
use crate::topology::{NODE_KEY, STORAGE_POOL_KEY_PREFIX};
use crate::volume::VolumeParameters;
use std::collections::BTreeSet;
use tracing::{debug, instrument};

/// Bytes per unit of reported capacity (KiB)
const CAPACITY_UNIT_BYTES: u64 = 1024;

// =============================================================================
// Capacity Filter
// =============================================================================

/// Which capacity report entries count towards the sum
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapacityFilter {
    /// Only entries on this node
    pub node: Option<String>,
    /// Only entries of these pools (empty: any pool)
    pub pools: BTreeSet<String>,
}

impl CapacityFilter {
    /// Build the filter; pool constraints from the locality take precedence
    /// over the storage pool parameter
    pub fn new(params: &VolumeParameters, locality: &Segments) -> Self {
        let node = locality.get(NODE_KEY).cloned();

        let mut pools: BTreeSet<String> = locality
            .keys()
            .filter_map(|k| k.strip_prefix(STORAGE_POOL_KEY_PREFIX))
            .filter(|pool| !pool.is_empty())
            .map(str::to_string)
            .collect();

        if pools.is_empty() {
            if let Some(pool) = &params.storage_pool {
                pools.insert(pool.clone());
            }
        }

        Self { node, pools }
    }

    pub fn matches(&self, pool: &StoragePool) -> bool {
        if let Some(node) = &self.node {
            if &pool.node_name != node {
                return false;
            }
        }
        self.pools.is_empty() || self.pools.contains(&pool.storage_pool_name)
    }
}

/// Free bytes of all entries passing `filter`
///
/// Entries are per node and pool; the same pool on several nodes counts once
/// per node. Missing or negative capacity counts as zero.
pub fn sum_free_bytes(pools: &[StoragePool], filter: &CapacityFilter) -> u64 {
    pools
        .iter()
        .filter(|p| filter.matches(p))
        .map(|p| {
            let kib = p.free_capacity.unwrap_or(0).max(0) as u64;
            kib.saturating_mul(CAPACITY_UNIT_BYTES)
        })
        .fold(0u64, u64::saturating_add)
}

// =============================================================================
// Capacity Aggregator
// =============================================================================

/// Answers how much free space is reachable under given constraints
pub struct CapacityAggregator {
    pools: StoragePoolProviderRef,
}

impl CapacityAggregator {
    pub fn new(pools: StoragePoolProviderRef) -> Self {
        Self { pools }
    }

    /// Free capacity in bytes; reads the capacity report on every call
    #[instrument(skip(self, ctx, params), fields(pool = ?params.storage_pool))]
    pub async fn capacity_bytes(
        &self,
        ctx: &RequestContext,
        params: &VolumeParameters,
        locality: &Segments,
    ) -> Result<u64> {
        let report = ctx
            .run(self.pools.storage_pool_view())
            .await
            .map_err(Error::CapacityQuery)?;

        let filter = CapacityFilter::new(params, locality);
        let bytes = sum_free_bytes(&report, &filter);

        debug!(
            entries = report.len(),
            node = ?filter.node,
            pools = ?filter.pools,
            bytes,
            "aggregated free capacity"
        );

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::{Call, MemoryControlPlane, Operation};
    use crate::error::ControlPlaneError;
    use crate::topology::STORAGE_POOL_VALUE;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn pool(name: &str, node: &str, provider: &str, free: Option<i64>) -> StoragePool {
        StoragePool {
            storage_pool_name: name.into(),
            node_name: node.into(),
            provider_kind: provider.into(),
            free_capacity: free,
            ..Default::default()
        }
    }

    fn cluster() -> Arc<MemoryControlPlane> {
        let cp = MemoryControlPlane::new();
        cp.add_storage_pool(pool("pool-a", "node-1", "LVM_THIN", Some(1)));
        cp.add_storage_pool(pool("pool-a", "node-2", "LVM_THIN", Some(2)));
        cp.add_storage_pool(pool("pool-b", "node-1", "ZFS_THIN", Some(3)));
        cp.add_storage_pool(pool("pool-b", "node-2", "ZFS_THIN", Some(4)));
        Arc::new(cp)
    }

    fn segments(pairs: &[(&str, &str)]) -> Segments {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn params_with_pool(pool: &str) -> VolumeParameters {
        VolumeParameters {
            storage_pool: Some(pool.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_capacity_bytes() {
        let cp = cluster();
        let aggregator = CapacityAggregator::new(cp.clone());
        let ctx = RequestContext::new();
        let pool_a = format!("{}pool-a", STORAGE_POOL_KEY_PREFIX);

        let cases: Vec<(&str, VolumeParameters, Segments, u64)> = vec![
            ("all", VolumeParameters::default(), Segments::new(), 1 + 2 + 3 + 4),
            (
                "just node-1",
                VolumeParameters::default(),
                segments(&[(NODE_KEY, "node-1")]),
                1 + 3,
            ),
            (
                "just node-2",
                VolumeParameters::default(),
                segments(&[(NODE_KEY, "node-2")]),
                2 + 4,
            ),
            ("pool-a from params", params_with_pool("pool-a"), Segments::new(), 1 + 2),
            ("pool-b from params", params_with_pool("pool-b"), Segments::new(), 3 + 4),
            (
                "pool-a from topology",
                VolumeParameters::default(),
                segments(&[(pool_a.as_str(), STORAGE_POOL_VALUE)]),
                1 + 2,
            ),
            (
                "pool-a and node-1 from topology",
                VolumeParameters::default(),
                segments(&[(pool_a.as_str(), STORAGE_POOL_VALUE), (NODE_KEY, "node-1")]),
                1,
            ),
            (
                "topology pool beats parameter",
                params_with_pool("pool-b"),
                segments(&[(pool_a.as_str(), STORAGE_POOL_VALUE)]),
                1 + 2,
            ),
            (
                "unknown node",
                VolumeParameters::default(),
                segments(&[(NODE_KEY, "node-unknown")]),
                0,
            ),
            ("unknown pool", params_with_pool("pool-z"), Segments::new(), 0),
        ];

        for (name, params, locality, expected_kib) in cases {
            let bytes = aggregator
                .capacity_bytes(&ctx, &params, &locality)
                .await
                .unwrap();
            assert_eq!(bytes, expected_kib * 1024, "case {}", name);
        }

        // One report read per call, never cached
        assert_eq!(cp.calls_of(Operation::StoragePoolView).len(), 10);
    }

    #[test]
    fn test_missing_and_negative_capacity_count_as_zero() {
        let pools = vec![
            pool("pool-a", "node-1", "LVM", None),
            pool("pool-a", "node-2", "LVM", Some(-5)),
            pool("pool-a", "node-3", "LVM", Some(10)),
        ];
        assert_eq!(sum_free_bytes(&pools, &CapacityFilter::default()), 10 * 1024);
        assert_eq!(sum_free_bytes(&[], &CapacityFilter::default()), 0);
    }

    #[tokio::test]
    async fn test_query_failure_propagates() {
        let cp = cluster();
        cp.fail_with(Operation::StoragePoolView, || ControlPlaneError::Rejected {
            status: 500,
            message: "controller busy".into(),
        });
        let aggregator = CapacityAggregator::new(cp.clone());

        let result = aggregator
            .capacity_bytes(&RequestContext::new(), &VolumeParameters::default(), &Segments::new())
            .await;
        assert_matches!(
            result,
            Err(Error::CapacityQuery(ControlPlaneError::Rejected { status: 500, .. }))
        );
        assert_eq!(cp.calls(), vec![Call::StoragePoolView]);
    }
}
