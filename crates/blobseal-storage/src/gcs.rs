//! Cloud Storage backend
//!
//! Talks to the Cloud Storage JSON API directly:
//!
//! - metadata: `GET /storage/v1/b/<bucket>/o/<name>`
//! - content: the same URL with `alt=media`, pinned to a `generation` when
//!   the caller knows which revision it inspected
//! - write: multipart upload (object resource + content), then reload
//! - patch: `PATCH` with `ifMetagenerationMatch`; keys dropped from the map
//!   are sent as `null` so the service removes them. When a retried patch
//!   meets a precondition failure after an attempt whose reply was lost, the
//!   object is reloaded and the patch counts as applied if its metadata
//!   already matches.
//!
//! Every call is retried on transient errors under the configured policy.

use crate::traits::{Metadata, ObjectInfo, ObjectStore, StorageError, StorageResult};
use async_trait::async_trait;
use blobseal_core::auth::TokenProvider;
use blobseal_core::retry::{retry_transient, RetryError, Transient};
use blobseal_core::types::RetryPolicy;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Cloud Storage endpoint
pub const GCS_URL: &str = "https://storage.googleapis.com";

/// Longest error body kept in a [`StorageError::Status`] message
const MAX_ERROR_BODY: usize = 512;

/// Cloud Storage object store
pub struct GcsObjectStore {
    client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    base_url: String,
    retry: RetryPolicy,
}

/// Object resource as returned by the JSON API (integers arrive as strings)
#[derive(Deserialize)]
struct ObjectResource {
    bucket: String,
    name: String,
    #[serde(default)]
    metadata: Option<Metadata>,
    #[serde(deserialize_with = "int_or_string")]
    generation: i64,
    #[serde(deserialize_with = "int_or_string")]
    metageneration: i64,
    #[serde(default, deserialize_with = "int_or_string")]
    size: u64,
}

impl From<ObjectResource> for ObjectInfo {
    fn from(resource: ObjectResource) -> Self {
        ObjectInfo {
            bucket: resource.bucket,
            name: resource.name,
            metadata: resource.metadata.unwrap_or_default(),
            generation: resource.generation,
            metageneration: resource.metageneration,
            size: resource.size,
        }
    }
}

fn int_or_string<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Deserialize<'de>,
    T::Err: Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        Text(String),
        Number(T),
    }

    match Raw::<T>::deserialize(deserializer)? {
        Raw::Text(s) => s.parse().map_err(de::Error::custom),
        Raw::Number(n) => Ok(n),
    }
}

impl GcsObjectStore {
    /// `client` should carry the configured request timeout
    pub fn new(client: reqwest::Client, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            client,
            tokens,
            base_url: GCS_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Point at an emulator or test server
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn object_url(&self, bucket: &str, name: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.base_url,
            urlencoding::encode(bucket),
            urlencoding::encode(name)
        )
    }

    fn upload_url(&self, bucket: &str) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=multipart",
            self.base_url,
            urlencoding::encode(bucket)
        )
    }

    /// Map a non-success response onto a storage error
    async fn check(
        response: reqwest::Response,
        bucket: &str,
        name: &str,
        expected_metageneration: Option<i64>,
    ) -> StorageResult<reqwest::Response> {
        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(response);
        }

        match status {
            404 => Err(StorageError::not_found(bucket, name)),
            412 => Err(StorageError::precondition_failed(
                bucket,
                name,
                expected_metageneration.unwrap_or_default(),
            )),
            401 | 403 => Err(StorageError::PermissionDenied {
                bucket: bucket.to_string(),
                name: name.to_string(),
            }),
            _ => {
                let mut message = response.text().await.unwrap_or_default();
                if message.len() > MAX_ERROR_BODY {
                    let cut = (0..=MAX_ERROR_BODY)
                        .rev()
                        .find(|i| message.is_char_boundary(*i))
                        .unwrap_or(0);
                    message.truncate(cut);
                }
                Err(StorageError::Status { status, message })
            }
        }
    }

    async fn parse_object(response: reqwest::Response) -> StorageResult<ObjectInfo> {
        let body = response.text().await?;
        let resource: ObjectResource = serde_json::from_str(&body)
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;
        Ok(resource.into())
    }

    async fn get_once(&self, bucket: &str, name: &str) -> StorageResult<ObjectInfo> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .get(self.object_url(bucket, name))
            .bearer_auth(token.secret())
            .send()
            .await?;

        let response = Self::check(response, bucket, name, None).await?;
        Self::parse_object(response).await
    }

    async fn read_once(
        &self,
        bucket: &str,
        name: &str,
        generation: Option<i64>,
    ) -> StorageResult<Vec<u8>> {
        let mut url = format!("{}?alt=media", self.object_url(bucket, name));
        if let Some(generation) = generation {
            url.push_str(&format!("&generation={}", generation));
        }

        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token.secret())
            .send()
            .await?;

        let response = Self::check(response, bucket, name, None).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn upload_once(
        &self,
        bucket: &str,
        name: &str,
        content: &[u8],
        metadata: &Metadata,
    ) -> StorageResult<()> {
        let token = self.tokens.access_token().await?;
        let (content_type, body) = multipart_body(name, content, metadata)?;

        let response = self
            .client
            .post(self.upload_url(bucket))
            .bearer_auth(token.secret())
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        Self::check(response, bucket, name, None).await?;
        Ok(())
    }

    async fn patch_once(
        &self,
        bucket: &str,
        name: &str,
        metadata: &Metadata,
        if_metageneration_match: Option<i64>,
        in_doubt: &AtomicBool,
    ) -> StorageResult<ObjectInfo> {
        let current = self.get_once(bucket, name).await?;
        if let Some(expected) = if_metageneration_match {
            if current.metageneration != expected {
                return Err(StorageError::precondition_failed(bucket, name, expected));
            }
        }

        let body = serde_json::json!({ "metadata": replacement_map(&current.metadata, metadata) });

        let mut url = self.object_url(bucket, name);
        if let Some(expected) = if_metageneration_match {
            url.push_str(&format!("?ifMetagenerationMatch={}", expected));
        }

        let token = self.tokens.access_token().await?;
        let outcome = match self
            .client
            .patch(url)
            .bearer_auth(token.secret())
            .json(&body)
            .send()
            .await
        {
            Ok(response) => Self::check(response, bucket, name, if_metageneration_match).await,
            Err(e) => Err(e.into()),
        };

        // A timeout or 5xx leaves open whether the service applied the patch
        if matches!(&outcome, Err(e) if e.is_transient()) {
            in_doubt.store(true, Ordering::SeqCst);
        }
        Self::parse_object(outcome?).await
    }

    /// After a precondition failure, check whether an earlier attempt whose
    /// reply was lost already applied `metadata`
    async fn reconcile_lost_patch(
        &self,
        bucket: &str,
        name: &str,
        metadata: &Metadata,
        err: StorageError,
    ) -> StorageResult<ObjectInfo> {
        let current = retry_transient(&self.retry, "storage-get", || self.get_once(bucket, name))
            .await
            .map_err(RetryError::into_source)?;
        if current.metadata != *metadata {
            return Err(err);
        }

        info!(
            "Earlier patch of gs://{}/{} landed before its reply was lost",
            bucket, name
        );
        Ok(current)
    }
}

/// Patch map that turns `current` into exactly `desired`
fn replacement_map(current: &Metadata, desired: &Metadata) -> BTreeMap<String, Option<String>> {
    let mut map: BTreeMap<String, Option<String>> = current
        .keys()
        .filter(|k| !desired.contains_key(*k))
        .map(|k| (k.clone(), None))
        .collect();
    map.extend(desired.iter().map(|(k, v)| (k.clone(), Some(v.clone()))));
    map
}

/// `multipart/related` upload body: object resource, then content
fn multipart_body(
    name: &str,
    content: &[u8],
    metadata: &Metadata,
) -> StorageResult<(String, Vec<u8>)> {
    let boundary = format!("blobseal-{}", uuid::Uuid::new_v4().simple());
    let resource = serde_json::to_vec(&serde_json::json!({
        "name": name,
        "metadata": metadata,
    }))
    .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;

    let mut body = Vec::with_capacity(content.len() + resource.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(&resource);
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    Ok((format!("multipart/related; boundary={}", boundary), body))
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn get_object(&self, bucket: &str, name: &str) -> StorageResult<ObjectInfo> {
        retry_transient(&self.retry, "storage-get", || self.get_once(bucket, name))
            .await
            .map_err(RetryError::into_source)
    }

    async fn read_object(
        &self,
        bucket: &str,
        name: &str,
        generation: Option<i64>,
    ) -> StorageResult<Vec<u8>> {
        let content = retry_transient(&self.retry, "storage-read", || {
            self.read_once(bucket, name, generation)
        })
        .await
        .map_err(RetryError::into_source)?;

        debug!("Downloaded {} bytes from gs://{}/{}", content.len(), bucket, name);
        Ok(content)
    }

    async fn write_object(
        &self,
        bucket: &str,
        name: &str,
        content: Vec<u8>,
        metadata: &Metadata,
    ) -> StorageResult<ObjectInfo> {
        retry_transient(&self.retry, "storage-upload", || {
            self.upload_once(bucket, name, &content, metadata)
        })
        .await
        .map_err(RetryError::into_source)?;

        info!("Uploaded {} bytes to gs://{}/{}", content.len(), bucket, name);
        self.get_object(bucket, name).await
    }

    async fn patch_metadata(
        &self,
        bucket: &str,
        name: &str,
        metadata: &Metadata,
        if_metageneration_match: Option<i64>,
    ) -> StorageResult<ObjectInfo> {
        let in_doubt = AtomicBool::new(false);
        let result = retry_transient(&self.retry, "storage-patch", || {
            self.patch_once(bucket, name, metadata, if_metageneration_match, &in_doubt)
        })
        .await
        .map_err(RetryError::into_source);

        match result {
            Err(err) if err.is_precondition_failed() && in_doubt.load(Ordering::SeqCst) => {
                self.reconcile_lost_patch(bucket, name, metadata, err).await
            }
            other => other,
        }
    }

    fn name(&self) -> &'static str {
        "gcs"
    }
}
