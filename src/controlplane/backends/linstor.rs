//! LINSTOR REST Client
//!
//! Implements the control plane ports against the LINSTOR controller's
//! REST API (v1).

use crate::domain::ports::{NodeProvider, ResourceProvider, StoragePoolProvider};
use crate::domain::resources::{
    ApiCallRc, Node, NodeFilter, Resource, ResourceCreate, ResourceWithVolumes, StoragePool,
};
use crate::error::{ControlPlaneError, ControlPlaneResult, Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the LINSTOR client
#[derive(Debug, Clone)]
pub struct LinstorClientConfig {
    /// Controller endpoint, e.g. `http://linstor-controller:3370`
    pub endpoint: String,
    /// Per-request timeout enforced by the HTTP client
    pub request_timeout: Duration,
    /// Optional bearer token
    pub bearer_token: Option<String>,
}

impl Default for LinstorClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3370".to_string(),
            request_timeout: Duration::from_secs(60),
            bearer_token: None,
        }
    }
}

// =============================================================================
// LINSTOR Client
// =============================================================================

/// REST client for the LINSTOR controller
#[derive(Debug, Clone)]
pub struct LinstorClient {
    http: Client,
    base: String,
    bearer_token: Option<String>,
}

impl LinstorClient {
    /// Create a new client
    pub fn new(config: LinstorClientConfig) -> Result<Self> {
        let base = config.endpoint.trim_end_matches('/').to_string();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(Error::Configuration(format!(
                "LINSTOR endpoint must be an http(s) URL: {}",
                config.endpoint
            )));
        }

        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base,
            bearer_token: config.bearer_token,
        })
    }

    fn url(&self, segments: &[&str]) -> String {
        let mut url = format!("{}/v1", self.base);
        for segment in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        debug!(%method, %url, "LINSTOR request");
        let builder = self.http.request(method, url);
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> ControlPlaneResult<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = api_messages(&body).unwrap_or(body);

        Err(match status {
            StatusCode::NOT_FOUND => ControlPlaneError::NotFound(format!("{}: {}", what, message)),
            StatusCode::CONFLICT => {
                ControlPlaneError::AlreadyExists(format!("{}: {}", what, message))
            }
            _ => ControlPlaneError::Rejected {
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> ControlPlaneResult<T> {
        let bytes = self.send(builder, what).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Join the messages of an API call response, if the body is one
fn api_messages(body: &str) -> Option<String> {
    let rcs: Vec<ApiCallRc> = serde_json::from_str(body).ok()?;
    if rcs.is_empty() {
        return None;
    }

    Some(
        rcs.iter()
            .map(|rc| match &rc.cause {
                Some(cause) => format!("{} ({})", rc.message, cause),
                None => rc.message.clone(),
            })
            .collect::<Vec<_>>()
            .join("; "),
    )
}

#[async_trait]
impl ResourceProvider for LinstorClient {
    async fn resource_view(&self, volume: &str) -> ControlPlaneResult<Vec<ResourceWithVolumes>> {
        let builder = self
            .request(Method::GET, self.url(&["view", "resources"]))
            .query(&[("resources", volume)]);
        self.get_json(builder, volume).await
    }

    async fn create(&self, create: ResourceCreate) -> ControlPlaneResult<()> {
        let what = format!("{}/{}", create.resource.name, create.resource.node_name);
        let url = self.url(&[
            "resource-definitions",
            &create.resource.name,
            "resources",
            &create.resource.node_name,
        ]);
        self.send(self.request(Method::POST, url).json(&create), &what)
            .await?;
        Ok(())
    }

    async fn get(&self, volume: &str, node: &str) -> ControlPlaneResult<Resource> {
        let url = self.url(&["resource-definitions", volume, "resources", node]);
        self.get_json(self.request(Method::GET, url), &format!("{}/{}", volume, node))
            .await
    }

    async fn activate(&self, volume: &str, node: &str) -> ControlPlaneResult<()> {
        let url = self.url(&["resource-definitions", volume, "resources", node, "activate"]);
        self.send(self.request(Method::POST, url), &format!("{}/{}", volume, node))
            .await?;
        Ok(())
    }

    async fn deactivate(&self, volume: &str, node: &str) -> ControlPlaneResult<()> {
        let url = self.url(&["resource-definitions", volume, "resources", node, "deactivate"]);
        self.send(self.request(Method::POST, url), &format!("{}/{}", volume, node))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NodeProvider for LinstorClient {
    async fn nodes(&self, filter: &NodeFilter) -> ControlPlaneResult<Vec<Node>> {
        let query: Vec<(&str, &str)> = filter
            .nodes
            .iter()
            .map(|n| ("nodes", n.as_str()))
            .chain(filter.props.iter().map(|p| ("props", p.as_str())))
            .collect();

        let builder = self.request(Method::GET, self.url(&["nodes"])).query(&query);
        self.get_json(builder, "nodes").await
    }
}

#[async_trait]
impl StoragePoolProvider for LinstorClient {
    async fn storage_pool_view(&self) -> ControlPlaneResult<Vec<StoragePool>> {
        let builder = self.request(Method::GET, self.url(&["view", "storage-pools"]));
        self.get_json(builder, "storage-pools").await
    }
}
