//! In-Memory Control Plane
//!
//! A deterministic stand-in for LINSTOR. Keeps resources, nodes and storage
//! pools in memory, records every call in order and can be told to fail
//! individual operations.

use crate::domain::ports::{NodeProvider, ResourceProvider, StoragePoolProvider};
use crate::domain::resources::{
    Node, NodeFilter, Resource, ResourceCreate, ResourceWithVolumes, StoragePool, Volume,
    FLAG_DISKLESS, FLAG_DRBD_DISKLESS, FLAG_INACTIVE, KEY_STOR_POOL_NAME, PROVIDER_DISKLESS,
};
use crate::error::{ControlPlaneError, ControlPlaneResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Recorded Calls
// =============================================================================

/// Control plane operations, used to script failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ResourceView,
    Create,
    Get,
    Activate,
    Deactivate,
    Nodes,
    StoragePoolView,
}

/// A call received by the in-memory control plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ResourceView { volume: String },
    Create(ResourceCreate),
    Get { volume: String, node: String },
    Activate { volume: String, node: String },
    Deactivate { volume: String, node: String },
    Nodes(NodeFilter),
    StoragePoolView,
}

impl Call {
    pub fn operation(&self) -> Operation {
        match self {
            Call::ResourceView { .. } => Operation::ResourceView,
            Call::Create(_) => Operation::Create,
            Call::Get { .. } => Operation::Get,
            Call::Activate { .. } => Operation::Activate,
            Call::Deactivate { .. } => Operation::Deactivate,
            Call::Nodes(_) => Operation::Nodes,
            Call::StoragePoolView => Operation::StoragePoolView,
        }
    }

    /// Whether this call changes control plane state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self.operation(),
            Operation::Create | Operation::Activate | Operation::Deactivate
        )
    }
}

type FailureFn = Box<dyn Fn() -> ControlPlaneError + Send + Sync>;

#[derive(Default)]
struct State {
    resources: BTreeMap<String, Vec<ResourceWithVolumes>>,
    nodes: Vec<Node>,
    pools: Vec<StoragePool>,
    calls: Vec<Call>,
    failures: HashMap<Operation, FailureFn>,
}

// =============================================================================
// Memory Control Plane
// =============================================================================

/// In-memory implementation of every control plane port
#[derive(Default)]
pub struct MemoryControlPlane {
    state: Mutex<State>,
    latency: Option<Duration>,
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Replace the resource view of a volume
    pub fn set_resources(&self, volume: &str, resources: Vec<ResourceWithVolumes>) {
        self.state
            .lock()
            .resources
            .insert(volume.to_string(), resources);
    }

    /// Load the resource view of a volume from its JSON form
    pub fn set_resources_json(&self, volume: &str, json: &str) -> ControlPlaneResult<()> {
        let resources: Vec<ResourceWithVolumes> = serde_json::from_str(json)?;
        self.set_resources(volume, resources);
        Ok(())
    }

    pub fn resources(&self, volume: &str) -> Vec<ResourceWithVolumes> {
        self.state
            .lock()
            .resources
            .get(volume)
            .cloned()
            .unwrap_or_default()
    }

    pub fn add_node(&self, node: Node) {
        self.state.lock().nodes.push(node);
    }

    pub fn add_storage_pool(&self, pool: StoragePool) {
        self.state.lock().pools.push(pool);
    }

    /// Make every call of `operation` fail with the error built by `error`
    pub fn fail_with<F>(&self, operation: Operation, error: F)
    where
        F: Fn() -> ControlPlaneError + Send + Sync + 'static,
    {
        self.state.lock().failures.insert(operation, Box::new(error));
    }

    /// Stop failing `operation`
    pub fn clear_failure(&self, operation: Operation) {
        self.state.lock().failures.remove(&operation);
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Calls of one operation, in order
    pub fn calls_of(&self, operation: Operation) -> Vec<Call> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.operation() == operation)
            .cloned()
            .collect()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    /// Record a call and return the scripted failure for it, if any
    async fn enter(&self, call: Call) -> ControlPlaneResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        debug!(call = ?call, "memory control plane call");

        let mut state = self.state.lock();
        let operation = call.operation();
        state.calls.push(call);
        match state.failures.get(&operation) {
            Some(failure) => Err(failure()),
            None => Ok(()),
        }
    }

    fn set_inactive(&self, volume: &str, node: &str, inactive: bool) -> ControlPlaneResult<()> {
        let mut state = self.state.lock();
        let resource = state
            .resources
            .get_mut(volume)
            .and_then(|list| list.iter_mut().find(|r| r.node_name == node))
            .ok_or_else(|| ControlPlaneError::NotFound(format!("{}/{}", volume, node)))?;

        resource.flags.retain(|f| f != FLAG_INACTIVE);
        if inactive {
            resource.flags.push(FLAG_INACTIVE.to_string());
        }
        Ok(())
    }
}

fn resource_from_create(create: &ResourceCreate) -> ResourceWithVolumes {
    let diskless = create
        .resource
        .flags
        .iter()
        .any(|f| f == FLAG_DISKLESS || f == FLAG_DRBD_DISKLESS);
    let pool = create
        .resource
        .props
        .get(KEY_STOR_POOL_NAME)
        .cloned()
        .unwrap_or_default();

    ResourceWithVolumes {
        name: create.resource.name.clone(),
        node_name: create.resource.node_name.clone(),
        props: create.resource.props.clone(),
        flags: create.resource.flags.clone(),
        layer_object: None,
        volumes: vec![Volume {
            volume_number: 0,
            storage_pool_name: pool,
            provider_kind: if diskless {
                PROVIDER_DISKLESS.to_string()
            } else {
                String::new()
            },
        }],
        shared_name: None,
    }
}

#[async_trait]
impl ResourceProvider for MemoryControlPlane {
    async fn resource_view(&self, volume: &str) -> ControlPlaneResult<Vec<ResourceWithVolumes>> {
        self.enter(Call::ResourceView {
            volume: volume.to_string(),
        })
        .await?;
        Ok(self.resources(volume))
    }

    async fn create(&self, create: ResourceCreate) -> ControlPlaneResult<()> {
        self.enter(Call::Create(create.clone())).await?;

        let mut state = self.state.lock();
        let list = state
            .resources
            .entry(create.resource.name.clone())
            .or_default();
        if list.iter().any(|r| r.node_name == create.resource.node_name) {
            return Err(ControlPlaneError::AlreadyExists(format!(
                "{}/{}",
                create.resource.name, create.resource.node_name
            )));
        }
        list.push(resource_from_create(&create));
        Ok(())
    }

    async fn get(&self, volume: &str, node: &str) -> ControlPlaneResult<Resource> {
        self.enter(Call::Get {
            volume: volume.to_string(),
            node: node.to_string(),
        })
        .await?;

        self.resources(volume)
            .into_iter()
            .find(|r| r.node_name == node)
            .map(|r| Resource {
                name: r.name,
                node_name: r.node_name,
                props: r.props,
                flags: r.flags,
            })
            .ok_or_else(|| ControlPlaneError::NotFound(format!("{}/{}", volume, node)))
    }

    async fn activate(&self, volume: &str, node: &str) -> ControlPlaneResult<()> {
        self.enter(Call::Activate {
            volume: volume.to_string(),
            node: node.to_string(),
        })
        .await?;
        self.set_inactive(volume, node, false)
    }

    async fn deactivate(&self, volume: &str, node: &str) -> ControlPlaneResult<()> {
        self.enter(Call::Deactivate {
            volume: volume.to_string(),
            node: node.to_string(),
        })
        .await?;
        self.set_inactive(volume, node, true)
    }
}

#[async_trait]
impl NodeProvider for MemoryControlPlane {
    async fn nodes(&self, filter: &NodeFilter) -> ControlPlaneResult<Vec<Node>> {
        self.enter(Call::Nodes(filter.clone())).await?;

        Ok(self
            .state
            .lock()
            .nodes
            .iter()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StoragePoolProvider for MemoryControlPlane {
    async fn storage_pool_view(&self) -> ControlPlaneResult<Vec<StoragePool>> {
        self.enter(Call::StoragePoolView).await?;
        Ok(self.state.lock().pools.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn create(node: &str) -> ResourceCreate {
        ResourceCreate {
            resource: Resource {
                name: "rsc1".into(),
                node_name: node.into(),
                props: BTreeMap::new(),
                flags: vec![FLAG_DRBD_DISKLESS.into()],
            },
            layer_list: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let cp = MemoryControlPlane::new();
        cp.create(create("node-3")).await.unwrap();

        let res = cp.get("rsc1", "node-3").await.unwrap();
        assert_eq!(res.node_name, "node-3");
        assert_eq!(cp.resources("rsc1")[0].volumes[0].provider_kind, PROVIDER_DISKLESS);

        let again = cp.create(create("node-3")).await;
        assert_matches!(again, Err(ControlPlaneError::AlreadyExists(_)));
        assert_eq!(cp.mutations().len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_failure_is_recorded() {
        let cp = MemoryControlPlane::new();
        cp.fail_with(Operation::StoragePoolView, || ControlPlaneError::Rejected {
            status: 503,
            message: "controller offline".into(),
        });

        let result = cp.storage_pool_view().await;
        assert_matches!(result, Err(ControlPlaneError::Rejected { status: 503, .. }));
        assert_eq!(cp.calls(), vec![Call::StoragePoolView]);

        cp.clear_failure(Operation::StoragePoolView);
        assert!(cp.storage_pool_view().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_activation_flags() {
        let cp = MemoryControlPlane::new();
        cp.create(create("node-1")).await.unwrap();

        cp.deactivate("rsc1", "node-1").await.unwrap();
        assert!(cp.resources("rsc1")[0].has_flag(FLAG_INACTIVE));

        cp.activate("rsc1", "node-1").await.unwrap();
        assert!(!cp.resources("rsc1")[0].has_flag(FLAG_INACTIVE));

        let missing = cp.activate("rsc1", "node-9").await;
        assert_matches!(missing, Err(ControlPlaneError::NotFound(_)));
    }
}
