// src/sink/elastic.rs
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{BulkOp, BulkTransport, ItemFailure};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store endpoint {endpoint:?}: {source}")]
    Endpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{op} request failed: {source}")]
    Http {
        op: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{op} returned HTTP {status}: {body}")]
    Status {
        op: &'static str,
        status: u16,
        body: String,
    },

    #[error("{op} on index {index} was not acknowledged")]
    NotAcknowledged { op: &'static str, index: String },

    #[error("{op} response could not be decoded: {source}")]
    Decode {
        op: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("reading mapping {path}: {source}")]
    Mapping {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Deserialize)]
struct Acknowledged {
    #[serde(default)]
    acknowledged: bool,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    status: u16,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Minimal client for an Elasticsearch-compatible HTTP API, bound to one index.
#[derive(Debug, Clone)]
pub struct ElasticClient {
    http: Client,
    base: Url,
    index: String,
    username: Option<String>,
    password: Option<String>,
}

impl ElasticClient {
    pub fn new(
        endpoint: &str,
        index: impl Into<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self, StoreError> {
        // `Url::join` drops the last path segment unless it ends in '/'.
        let normalized = if endpoint.ends_with('/') {
            endpoint.to_string()
        } else {
            format!("{}/", endpoint)
        };
        let base = Url::parse(&normalized).map_err(|source| StoreError::Endpoint {
            endpoint: endpoint.to_string(),
            source,
        })?;

        Ok(Self {
            http: Client::new(),
            base,
            index: index.into(),
            username: username.filter(|u| !u.is_empty()),
            password,
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn endpoint(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, StoreError> {
        self.base
            .join(path)
            .map_err(|source| StoreError::Endpoint {
                endpoint: format!("{}{}", self.base, path),
                source,
            })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, StoreError> {
        let req = self.http.request(method, self.url(path)?);
        Ok(match &self.username {
            Some(user) => req.basic_auth(user, self.password.as_deref()),
            None => req,
        })
    }

    async fn execute(&self, op: &'static str, req: RequestBuilder) -> Result<Response, StoreError> {
        let resp = req
            .send()
            .await
            .map_err(|source| StoreError::Http { op, source })?;
        Ok(resp)
    }

    async fn expect_success(op: &'static str, resp: Response) -> Result<Response, StoreError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(StoreError::Status { op, status, body })
    }

    async fn acknowledged(&self, op: &'static str, resp: Response) -> Result<(), StoreError> {
        let resp = Self::expect_success(op, resp).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|source| StoreError::Http { op, source })?;
        let ack: Acknowledged =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode { op, source })?;
        if !ack.acknowledged {
            return Err(StoreError::NotAcknowledged {
                op,
                index: self.index.clone(),
            });
        }
        Ok(())
    }

    /// HEAD /{index}
    pub async fn index_exists(&self) -> Result<bool, StoreError> {
        let op = "index exists";
        let resp = self.execute(op, self.request(Method::HEAD, &self.index)?).await?;
        match index_presence(resp.status()) {
            Some(exists) => Ok(exists),
            None => Self::expect_success(op, resp).await.map(|_| false),
        }
    }

    /// PUT /{index} with the mapping document as body.
    pub async fn create_index(&self, mapping: &str) -> Result<(), StoreError> {
        let op = "create index";
        let req = self
            .request(Method::PUT, &self.index)?
            .header(CONTENT_TYPE, "application/json")
            .body(mapping.to_string());
        let resp = self.execute(op, req).await?;
        self.acknowledged(op, resp).await
    }

    /// DELETE /{index}
    pub async fn delete_index(&self) -> Result<(), StoreError> {
        let op = "delete index";
        let resp = self
            .execute(op, self.request(Method::DELETE, &self.index)?)
            .await?;
        self.acknowledged(op, resp).await
    }

    /// Create the index from the mapping file unless it already exists.
    /// Returns whether it was created.
    #[instrument(level = "info", skip(self, mapping_path), fields(index = %self.index, mapping = %mapping_path.display()))]
    pub async fn ensure_index(&self, mapping_path: &Path) -> Result<bool, StoreError> {
        if self.index_exists().await? {
            warn!("Index already exists");
            return Ok(false);
        }
        let mapping =
            tokio::fs::read_to_string(mapping_path)
                .await
                .map_err(|source| StoreError::Mapping {
                    path: mapping_path.to_path_buf(),
                    source,
                })?;
        self.create_index(&mapping).await?;
        warn!("Index created");
        Ok(true)
    }
}

#[async_trait]
impl BulkTransport for ElasticClient {
    async fn send(&self, ops: &[BulkOp]) -> Result<Vec<ItemFailure>, StoreError> {
        let op = "bulk";
        let body = bulk_body(&self.index, ops);
        let req = self
            .request(Method::POST, "_bulk")?
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        let resp = Self::expect_success(op, self.execute(op, req).await?).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|source| StoreError::Http { op, source })?;
        let failures = parse_bulk_response(&bytes)?;
        debug!(ops = ops.len(), failed = failures.len(), "bulk committed");
        Ok(failures)
    }
}

/// Only 404 means absent. `None` for statuses that are neither.
fn index_presence(status: StatusCode) -> Option<bool> {
    if status == StatusCode::NOT_FOUND {
        Some(false)
    } else if status.is_success() {
        Some(true)
    } else {
        None
    }
}

/// NDJSON body of `create` actions, each followed by its document.
pub fn bulk_body(index: &str, ops: &[BulkOp]) -> String {
    let mut body = String::with_capacity(ops.iter().map(|op| op.body.len() + 64).sum());
    for op in ops {
        let action = json!({ "create": { "_index": index, "_id": op.id.as_str() } });
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&op.body);
        body.push('\n');
    }
    body
}

/// Pull the rejected items out of a bulk response.
pub fn parse_bulk_response(bytes: &[u8]) -> Result<Vec<ItemFailure>, StoreError> {
    let resp: BulkResponse = serde_json::from_slice(bytes)
        .map_err(|source| StoreError::Decode { op: "bulk", source })?;
    if !resp.errors {
        return Ok(Vec::new());
    }

    let failures = resp
        .items
        .into_iter()
        .flat_map(|item| item.into_values())
        .filter(|item| item.error.is_some() || item.status >= 300)
        .map(|item| ItemFailure {
            id: item.id.unwrap_or_default(),
            status: item.status,
            reason: item
                .error
                .as_ref()
                .map(describe_error)
                .unwrap_or_else(|| format!("HTTP {}", item.status)),
        })
        .collect::<Vec<_>>();
    info!(failed = failures.len(), "bulk response reported errors");
    Ok(failures)
}

fn describe_error(error: &serde_json::Value) -> String {
    match (error.get("type"), error.get("reason")) {
        (Some(t), Some(r)) => format!(
            "{}: {}",
            t.as_str().unwrap_or_default(),
            r.as_str().unwrap_or_default()
        ),
        _ => error.to_string(),
    }
}
