//! LINSTOR resource model
//!
//! Serde shapes of the objects exchanged with the control plane. Every field
//! the controller does not strictly need is optional or defaulted, since
//! satellites that are offline report only a fraction of the structure.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Well-known Keys and Flags
// =============================================================================

/// Property holding the storage pool of a resource
pub const KEY_STOR_POOL_NAME: &str = "StorPoolName";

/// Namespace of user-defined (auxiliary) properties
pub const NAMESPACE_AUXILIARY: &str = "Aux";

/// Resource flag: no local backing storage
pub const FLAG_DISKLESS: &str = "DISKLESS";

/// Resource flag: DRBD diskless client
pub const FLAG_DRBD_DISKLESS: &str = "DRBD_DISKLESS";

/// Resource flag: replica on a shared pool that is not currently active
pub const FLAG_INACTIVE: &str = "INACTIVE";

/// Provider kind reported for diskless volumes
pub const PROVIDER_DISKLESS: &str = "DISKLESS";

// =============================================================================
// Layers
// =============================================================================

/// Device layer kinds accepted in a resource create request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LayerKind {
    Drbd,
    Luks,
    Storage,
    Nvme,
    Cache,
    Writecache,
    Bcache,
}

impl LayerKind {
    /// Parse a layer name, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "drbd" => Some(LayerKind::Drbd),
            "luks" => Some(LayerKind::Luks),
            "storage" => Some(LayerKind::Storage),
            "nvme" => Some(LayerKind::Nvme),
            "cache" => Some(LayerKind::Cache),
            "writecache" => Some(LayerKind::Writecache),
            "bcache" => Some(LayerKind::Bcache),
            _ => None,
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerKind::Drbd => "drbd",
            LayerKind::Luks => "luks",
            LayerKind::Storage => "storage",
            LayerKind::Nvme => "nvme",
            LayerKind::Cache => "cache",
            LayerKind::Writecache => "writecache",
            LayerKind::Bcache => "bcache",
        };
        write!(f, "{}", name)
    }
}

// =============================================================================
// Resources
// =============================================================================

/// A resource (replica) of a resource definition on one node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub node_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: BTreeMap<String, String>,
    #[serde(default)]
    pub flags: Vec<String>,
}

/// Request body for creating a resource on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCreate {
    pub resource: Resource,
    #[serde(default)]
    pub layer_list: Vec<LayerKind>,
}

/// Resource as returned by the resource view, including layer and volume data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceWithVolumes {
    pub name: String,
    pub node_name: String,
    #[serde(default)]
    pub props: BTreeMap<String, String>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub layer_object: Option<ResourceLayer>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
    /// Shared space identifier of the backing pool, if any
    #[serde(default)]
    pub shared_name: Option<String>,
}

impl ResourceWithVolumes {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    /// The DRBD layer, wherever it sits in the layer tree
    pub fn drbd(&self) -> Option<&DrbdResource> {
        self.layer_object.as_ref().and_then(ResourceLayer::find_drbd)
    }
}

/// One node of the layer tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceLayer {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub drbd: Option<DrbdResource>,
    #[serde(default)]
    pub children: Vec<ResourceLayer>,
}

impl ResourceLayer {
    fn find_drbd(&self) -> Option<&DrbdResource> {
        self.drbd
            .as_ref()
            .or_else(|| self.children.iter().find_map(ResourceLayer::find_drbd))
    }
}

/// DRBD state of a resource
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrbdResource {
    #[serde(default)]
    pub node_id: Option<i32>,
    #[serde(default)]
    pub flags: Vec<String>,
    /// Peer connections keyed by peer node name
    #[serde(default)]
    pub connections: BTreeMap<String, DrbdConnection>,
    #[serde(default)]
    pub promotion_score: Option<i64>,
    #[serde(default)]
    pub may_promote: Option<bool>,
}

/// Connection state towards one peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrbdConnection {
    pub connected: bool,
    #[serde(default)]
    pub message: String,
}

/// Volume of a resource
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Volume {
    #[serde(default)]
    pub volume_number: i32,
    #[serde(default)]
    pub storage_pool_name: String,
    #[serde(default)]
    pub provider_kind: String,
}

// =============================================================================
// Nodes
// =============================================================================

/// A cluster node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default)]
    pub props: BTreeMap<String, String>,
    #[serde(default)]
    pub connection_status: Option<String>,
}

impl Node {
    /// Auxiliary properties with the `Aux/` prefix stripped
    pub fn aux_props(&self) -> BTreeMap<String, String> {
        let prefix = format!("{}/", NAMESPACE_AUXILIARY);
        self.props
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|k| (k.to_string(), v.clone())))
            .collect()
    }
}

/// Filter for the node list query; all conditions are conjunctive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilter {
    /// Restrict to these node names (empty: any node)
    pub nodes: Vec<String>,
    /// Property filters in `key=value` form
    pub props: Vec<String>,
}

impl NodeFilter {
    /// Filter on auxiliary properties
    pub fn aux<'a>(segments: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        Self {
            nodes: Vec::new(),
            props: segments
                .into_iter()
                .map(|(k, v)| format!("{}/{}={}", NAMESPACE_AUXILIARY, k, v))
                .collect(),
        }
    }

    /// Filter on node names
    pub fn names(nodes: Vec<String>) -> Self {
        Self {
            nodes,
            props: Vec::new(),
        }
    }

    /// Check a node against this filter
    pub fn matches(&self, node: &Node) -> bool {
        if !self.nodes.is_empty() && !self.nodes.contains(&node.name) {
            return false;
        }

        self.props.iter().all(|prop| match prop.split_once('=') {
            Some((k, v)) => node.props.get(k).map(|actual| actual == v).unwrap_or(false),
            None => node.props.contains_key(prop.as_str()),
        })
    }
}

// =============================================================================
// Storage Pools
// =============================================================================

/// Storage pool of one node, as reported by the storage pool view
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePool {
    pub storage_pool_name: String,
    pub node_name: String,
    #[serde(default)]
    pub provider_kind: String,
    /// Free capacity in KiB
    #[serde(default)]
    pub free_capacity: Option<i64>,
    /// Total capacity in KiB
    #[serde(default)]
    pub total_capacity: Option<i64>,
    #[serde(default)]
    pub shared_space: Option<String>,
}

// =============================================================================
// API Responses
// =============================================================================

/// Return code entry of a LINSTOR API call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiCallRc {
    #[serde(default)]
    pub ret_code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub cause: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drbd_found_in_children() {
        let res: ResourceWithVolumes = serde_json::from_str(
            r#"{"name":"rsc1","node_name":"node-0","layer_object":{"type":"LUKS","children":[
                {"type":"DRBD","drbd":{"promotion_score":7,"may_promote":true}}]}}"#,
        )
        .unwrap();

        let drbd = res.drbd().unwrap();
        assert_eq!(drbd.promotion_score, Some(7));
        assert!(drbd.connections.is_empty());
    }

    #[test]
    fn test_resource_create_wire_shape() {
        let create = ResourceCreate {
            resource: Resource {
                name: "rsc1".into(),
                node_name: "node-3".into(),
                props: BTreeMap::new(),
                flags: vec![FLAG_DRBD_DISKLESS.into()],
            },
            layer_list: vec![LayerKind::Drbd, LayerKind::Storage],
        };

        let json = serde_json::to_value(&create).unwrap();
        assert_eq!(json["layer_list"], serde_json::json!(["DRBD", "STORAGE"]));
        assert_eq!(json["resource"]["flags"], serde_json::json!(["DRBD_DISKLESS"]));
        assert!(json["resource"].get("props").is_none());
    }

    #[test]
    fn test_node_filter() {
        let mut node = Node {
            name: "node-1".into(),
            ..Default::default()
        };
        node.props.insert("Aux/zone".into(), "a".into());

        let mut segments = BTreeMap::new();
        segments.insert("zone".to_string(), "a".to_string());
        assert!(NodeFilter::aux(&segments).matches(&node));

        segments.insert("rack".to_string(), "1".to_string());
        assert!(!NodeFilter::aux(&segments).matches(&node));

        assert!(NodeFilter::names(vec!["node-1".into()]).matches(&node));
        assert!(!NodeFilter::names(vec!["node-2".into()]).matches(&node));
        assert_eq!(node.aux_props().get("zone").map(String::as_str), Some("a"));
    }

    #[test]
    fn test_layer_kind_parse() {
        assert_eq!(LayerKind::parse("DRBD"), Some(LayerKind::Drbd));
        assert_eq!(LayerKind::parse("storage"), Some(LayerKind::Storage));
        assert_eq!(LayerKind::parse("zfs"), None);
    }
}
