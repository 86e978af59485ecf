//! Remote Access Policy
//!
//! Rule-based [`LocalityPolicy`]: each rule lists the segment keys an
//! accessing node must share with the volume's location.

use super::NODE_KEY;
use crate::domain::ports::{LocalityPolicy, Segments};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One access rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    /// Keys whose values must match the source segments
    #[serde(rename = "fromSame", default)]
    pub from_same: Vec<String>,
}

/// Set of access rules; a node may access the volume if any rule allows it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteAccessPolicy(pub Vec<AccessRule>);

impl RemoteAccessPolicy {
    /// Access from every node
    pub fn anywhere() -> Self {
        Self(vec![AccessRule::default()])
    }

    /// Access only from the nodes holding the data
    pub fn local_only() -> Self {
        Self(vec![AccessRule {
            from_same: vec![NODE_KEY.to_string()],
        }])
    }

    pub fn rules(&self) -> &[AccessRule] {
        &self.0
    }
}

impl Default for RemoteAccessPolicy {
    fn default() -> Self {
        Self::anywhere()
    }
}

impl FromStr for RemoteAccessPolicy {
    type Err = Error;

    /// `anywhere`, `local-only`, or a JSON list of rules
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "anywhere" | "true" => Ok(Self::anywhere()),
            "local-only" | "false" => Ok(Self::local_only()),
            other => serde_json::from_str(other).map_err(|e| Error::InvalidParameter {
                key: "allowRemoteVolumeAccess".into(),
                value: s.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

fn is_subset(small: &Segments, large: &Segments) -> bool {
    small.iter().all(|(k, v)| large.get(k) == Some(v))
}

impl LocalityPolicy for RemoteAccessPolicy {
    /// A rule whose keys are not all present in `segments` cannot narrow the
    /// source down and yields the source segments unchanged.
    fn accessible_segments(&self, segments: &Segments) -> Vec<Segments> {
        self.0
            .iter()
            .map(|rule| {
                let narrowed: Option<Segments> = rule
                    .from_same
                    .iter()
                    .map(|k| segments.get(k).map(|v| (k.clone(), v.clone())))
                    .collect();
                narrowed.unwrap_or_else(|| segments.clone())
            })
            .collect()
    }

    /// Drop duplicates and every pattern that is more specific than another
    fn prune(&self, segments: Vec<Segments>) -> Vec<Segments> {
        segments
            .iter()
            .enumerate()
            .filter(|(i, candidate)| {
                !segments.iter().enumerate().any(|(j, other)| {
                    j != *i
                        && is_subset(other, candidate)
                        && (other.len() < candidate.len() || j < *i)
                })
            })
            .map(|(_, s)| s.clone())
            .collect()
    }
}
