//! Volume parameters as passed down from the storage class

use crate::domain::resources::LayerKind;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use tracing::debug;

/// Optional prefix of parameter keys
pub const PARAMETER_PREFIX: &str = "linstor.csi.linbit.com/";

/// Parsed volume parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeParameters {
    /// Storage pool to place diskful replicas in
    pub storage_pool: Option<String>,
    /// Storage pool for diskless replicas, overriding the controller default
    pub diskless_storage_pool: Option<String>,
    /// Number of diskful replicas requested
    pub placement_count: Option<u32>,
    /// Device layer stack, top to bottom
    pub layer_list: Vec<LayerKind>,
}

impl Default for VolumeParameters {
    fn default() -> Self {
        Self {
            storage_pool: None,
            diskless_storage_pool: None,
            placement_count: None,
            layer_list: vec![LayerKind::Drbd, LayerKind::Storage],
        }
    }
}

impl VolumeParameters {
    /// Parse raw parameters; keys are case-insensitive and may carry
    /// [`PARAMETER_PREFIX`]
    pub fn parse(raw: &BTreeMap<String, String>) -> Result<Self> {
        let mut params = Self::default();

        for (key, value) in raw {
            let lower = key.to_ascii_lowercase();
            let name = lower.strip_prefix(PARAMETER_PREFIX).unwrap_or(lower.as_str());

            match name {
                "storagepool" => params.storage_pool = non_empty(value),
                "disklessstoragepool" => params.diskless_storage_pool = non_empty(value),
                "placementcount" | "autoplace" => {
                    let count: u32 = value.trim().parse().map_err(|e| Error::InvalidParameter {
                        key: key.clone(),
                        value: value.clone(),
                        reason: format!("{}", e),
                    })?;
                    if count == 0 {
                        return Err(Error::InvalidParameter {
                            key: key.clone(),
                            value: value.clone(),
                            reason: "must be at least 1".into(),
                        });
                    }
                    params.placement_count = Some(count);
                }
                "layerlist" => params.layer_list = parse_layer_list(key, value)?,
                _ => debug!(key = %key, "ignoring unknown volume parameter"),
            }
        }

        Ok(params)
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_layer_list(key: &str, value: &str) -> Result<Vec<LayerKind>> {
    let layers = value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| {
            LayerKind::parse(s).ok_or_else(|| Error::InvalidParameter {
                key: key.to_string(),
                value: value.to_string(),
                reason: format!("unknown layer '{}'", s),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if layers.is_empty() {
        return Err(Error::InvalidParameter {
            key: key.to_string(),
            value: value.to_string(),
            reason: "empty layer list".into(),
        });
    }

    Ok(layers)
}
