//! Typed HTTP client for the fleet daemon REST API.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::rest::{ActionAccepted, BatchCheck, ErrorBody, Health};
use crate::domain::groups::StatusSnapshot;
use crate::domain::network::NetworkEntry;
use crate::domain::node::Node;
use crate::domain::reconcile::Batch;
use crate::domain::service::{AttributeValue, BulkResult, Family, NodeIndex};
use crate::domain::update::{GroupChange, NodeUpdate};

/// Non-2xx response carrying the daemon's error body.
#[derive(Debug, thiserror::Error)]
#[error("{url} returned {status}: {}", .body.message)]
pub struct ApiFailure {
    pub url: String,
    pub status: u16,
    pub body: ErrorBody,
}

pub struct FleetClient {
    base_url: String,
    http: Client,
}

impl FleetClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<Health> {
        self.get("/health").await
    }

    pub async fn index(&self, role: Option<&str>, names_only: bool) -> Result<NodeIndex> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(role) = role {
            query.push(("role", role.to_string()));
        }
        if names_only {
            query.push(("names_only", "true".to_string()));
        }
        let url = self.url("/api/v1/nodes");
        self.send(self.http.get(&url).query(&query), "GET", &url).await
    }

    pub async fn status(&self) -> Result<StatusSnapshot> {
        self.get("/api/v1/nodes/status").await
    }

    pub async fn list(&self) -> Result<BTreeMap<String, Node>> {
        self.get("/api/v1/nodes/list").await
    }

    pub async fn unallocated(&self) -> Result<BTreeMap<String, Node>> {
        self.get("/api/v1/nodes/unallocated").await
    }

    pub async fn families(&self) -> Result<BTreeMap<String, Family>> {
        self.get("/api/v1/families").await
    }

    pub async fn show(&self, name: &str, key: Option<&str>) -> Result<serde_json::Value> {
        let url = self.url(&format!("/api/v1/nodes/{name}"));
        let mut req = self.http.get(&url);
        if let Some(key) = key {
            req = req.query(&[("key", key)]);
        }
        self.send(req, "GET", &url).await
    }

    /// `path` is slash separated; empty returns the whole attribute tree.
    pub async fn attribute(&self, name: &str, path: &str) -> Result<AttributeValue> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            self.get(&format!("/api/v1/nodes/{name}/attribute")).await
        } else {
            self.get(&format!("/api/v1/nodes/{name}/attribute/{path}"))
                .await
        }
    }

    pub async fn network(&self, name: &str) -> Result<Vec<NetworkEntry>> {
        self.get(&format!("/api/v1/nodes/{name}/network")).await
    }

    pub async fn bulk(&self, batch: &Batch) -> Result<BulkResult> {
        self.post_json("/api/v1/nodes/bulk", batch).await
    }

    pub async fn bulk_check(&self, batch: &Batch) -> Result<BatchCheck> {
        self.post_json("/api/v1/nodes/bulk/check", batch).await
    }

    pub async fn update(&self, name: &str, update: &NodeUpdate) -> Result<Node> {
        self.post_json(&format!("/api/v1/nodes/{name}"), update)
            .await
    }

    pub async fn change_group(&self, node: &str, group: &str) -> Result<GroupChange> {
        self.post(&format!("/api/v1/nodes/{node}/group/{group}"))
            .await
    }

    pub async fn hit(&self, node: &str, action: &str) -> Result<ActionAccepted> {
        self.post(&format!("/api/v1/nodes/{node}/hit/{action}"))
            .await
    }

    // ── Internal helpers ───────────────────────────────────

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        self.send(self.http.get(&url), "GET", &url).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        self.send(self.http.post(&url), "POST", &url).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.url(path);
        self.send(self.http.post(&url).json(body), "POST", &url)
            .await
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder, method: &str, url: &str) -> Result<T> {
        let resp = req
            .send()
            .await
            .with_context(|| format!("{} {}", method, url))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let body = serde_json::from_str::<ErrorBody>(&text).unwrap_or(ErrorBody {
                error: crate::error::ErrorKind::Internal,
                message: text,
            });
            return Err(ApiFailure {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        resp.json()
            .await
            .with_context(|| format!("parsing response from {}", url))
    }
}
