//! Object-storage resource store (S3-compatible HTTP API).
//!
//! # Responsibilities
//! - `GET`/`PUT` the aggregate object with `ETag` based compare-and-set
//! - `PUT`/`DELETE` attachment objects under a dedicated prefix
//! - List attachments with `list-type=2` pagination; listing bodies are
//!   deserialized with `quick-xml`
//!
//! # Design Decisions
//! - Conditional writes use `If-Match`, or `If-None-Match: *` for the first commit
//! - `412 Precondition Failed` and `409 Conflict` both mean the race was lost
//! - Authentication is an optional bearer token; request signing is left to a
//!   fronting gateway

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, ETAG, IF_MATCH, IF_NONE_MATCH};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;

use super::{ResourceStore, StoreError, StoreResult, StoredBlob};
use crate::config::ObjectStorageConfig;

#[derive(Debug, Clone)]
pub struct ObjectStore {
    client: Client,
    bucket_url: String,
    resource_key: String,
    attachments_prefix: String,
    auth_token: Option<String>,
}

impl ObjectStore {
    pub fn new(config: &ObjectStorageConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            bucket_url: format!("{}/{}", config.endpoint.trim_end_matches('/'), config.bucket),
            resource_key: config.resource_key.trim_matches('/').to_string(),
            attachments_prefix: config.policy_attachments_prefix.trim_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.bucket_url, key)
    }

    fn attachment_key(&self, filename: &str) -> String {
        format!("{}/{}", self.attachments_prefix, filename)
    }

    async fn head_etag(&self, key: &str) -> StoreResult<String> {
        let response = self.request(Method::HEAD, self.object_url(key)).send().await?;
        if !response.status().is_success() {
            return Err(StoreError::Protocol(format!("HEAD {} returned {}", key, response.status())));
        }
        etag_header(&response)
            .ok_or_else(|| StoreError::Protocol(format!("HEAD {} returned no ETag", key)))
    }
}

fn etag_header(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// `ListObjectsV2` response body; only the fields used for paging.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    contents: Vec<ListedObject>,
    #[serde(default)]
    is_truncated: bool,
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListedObject {
    key: String,
}

fn parse_listing(body: &str) -> StoreResult<ListBucketResult> {
    quick_xml::de::from_str(body).map_err(|e| StoreError::Protocol(format!("malformed bucket listing: {}", e)))
}

#[async_trait]
impl ResourceStore for ObjectStore {
    async fn read_resource(&self) -> StoreResult<Option<StoredBlob>> {
        let response = self
            .request(Method::GET, self.object_url(&self.resource_key))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(StoreError::Protocol(format!(
                "GET {} returned {}",
                self.resource_key,
                response.status()
            )));
        }

        let etag = etag_header(&response)
            .ok_or_else(|| StoreError::Protocol(format!("GET {} returned no ETag", self.resource_key)))?;
        let content = response.bytes().await?.to_vec();
        Ok(Some(StoredBlob { content, etag }))
    }

    async fn write_resource(&self, content: Vec<u8>, expected_etag: Option<&str>) -> StoreResult<String> {
        let builder = self
            .request(Method::PUT, self.object_url(&self.resource_key))
            .header(CONTENT_TYPE, "application/json");
        let builder = match expected_etag {
            Some(etag) => builder.header(IF_MATCH, etag),
            None => builder.header(IF_NONE_MATCH, "*"),
        };

        let response = builder.body(content).send().await?;
        match response.status() {
            StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => {
                return Err(StoreError::PreconditionFailed(format!(
                    "{} was modified concurrently",
                    self.resource_key
                )));
            }
            status if !status.is_success() => {
                return Err(StoreError::Protocol(format!("PUT {} returned {}", self.resource_key, status)));
            }
            _ => {}
        }

        match etag_header(&response) {
            Some(etag) => Ok(etag),
            None => self.head_etag(&self.resource_key).await,
        }
    }

    async fn write_attachment(&self, filename: &str, content: &[u8]) -> StoreResult<()> {
        let key = self.attachment_key(filename);
        let response = self
            .request(Method::PUT, self.object_url(&key))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(content.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::Protocol(format!("PUT {} returned {}", key, response.status())));
        }
        Ok(())
    }

    async fn delete_attachment(&self, filename: &str) -> StoreResult<()> {
        let key = self.attachment_key(filename);
        let response = self.request(Method::DELETE, self.object_url(&key)).send().await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(StoreError::Protocol(format!("DELETE {} returned {}", key, status)))
        }
    }

    async fn list_attachments(&self) -> StoreResult<Vec<String>> {
        let prefix = format!("{}/", self.attachments_prefix);
        let mut names = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut query = vec![("list-type", "2".to_string()), ("prefix", prefix.clone())];
            if let Some(token) = &continuation {
                query.push(("continuation-token", token.clone()));
            }

            let response = self
                .request(Method::GET, self.bucket_url.clone())
                .query(&query)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(StoreError::Protocol(format!(
                    "listing {} returned {}",
                    prefix,
                    response.status()
                )));
            }

            let listing = parse_listing(&response.text().await?)?;
            for object in listing.contents {
                if let Some(name) = object.key.strip_prefix(&prefix) {
                    if !name.is_empty() && !name.contains('/') {
                        names.push(name.to_string());
                    }
                }
            }

            continuation = listing.next_continuation_token;
            if !listing.is_truncated || continuation.is_none() {
                break;
            }
        }

        names.sort();
        Ok(names)
    }

    fn backend_name(&self) -> &'static str {
        "object_storage"
    }
}
