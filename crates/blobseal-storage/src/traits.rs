//! Object-store capability

use async_trait::async_trait;
use blobseal_core::auth::AuthError;
use blobseal_core::retry::Transient;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// User metadata of a stored object
pub type Metadata = BTreeMap<String, String>;

/// A stored object as reported by the store after its last reload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub bucket: String,
    pub name: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// Content revision
    pub generation: i64,
    /// Metadata revision, the optimistic-concurrency token for patches
    pub metageneration: i64,
    #[serde(default)]
    pub size: u64,
}

impl ObjectInfo {
    /// `gs://bucket/name` style display path
    pub fn uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.name)
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object gs://{bucket}/{name} not found")]
    NotFound { bucket: String, name: String },

    #[error(
        "metadata of gs://{bucket}/{name} changed concurrently \
         (expected metageneration {expected})"
    )]
    PreconditionFailed {
        bucket: String,
        name: String,
        expected: i64,
    },

    #[error("permission denied on gs://{bucket}/{name}")]
    PermissionDenied { bucket: String, name: String },

    #[error("invalid object reference: {0}")]
    InvalidName(String),

    #[error("storage service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("storage request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("could not authenticate to the storage service: {0}")]
    Auth(#[from] AuthError),

    #[error("invalid storage response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn not_found(bucket: &str, name: &str) -> Self {
        StorageError::NotFound {
            bucket: bucket.to_string(),
            name: name.to_string(),
        }
    }

    pub fn precondition_failed(bucket: &str, name: &str, expected: i64) -> Self {
        StorageError::PreconditionFailed {
            bucket: bucket.to_string(),
            name: name.to_string(),
            expected,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, StorageError::PreconditionFailed { .. })
    }
}

impl Transient for StorageError {
    fn is_transient(&self) -> bool {
        match self {
            StorageError::Status { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            StorageError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            StorageError::Auth(e) => e.is_transient(),
            StorageError::NotFound { .. }
            | StorageError::PreconditionFailed { .. }
            | StorageError::PermissionDenied { .. }
            | StorageError::InvalidName(_)
            | StorageError::InvalidResponse(_)
            | StorageError::Io(_) => false,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Capability: whole-object reads and writes plus metadata patches
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Object metadata only
    async fn get_object(&self, bucket: &str, name: &str) -> StorageResult<ObjectInfo>;

    /// Whole object content
    ///
    /// With `generation`, only that revision is read; an object replaced
    /// since is reported as [`StorageError::NotFound`].
    async fn read_object(
        &self,
        bucket: &str,
        name: &str,
        generation: Option<i64>,
    ) -> StorageResult<Vec<u8>>;

    /// Write the whole content with `metadata`, then reload and return the
    /// stored object
    async fn write_object(
        &self,
        bucket: &str,
        name: &str,
        content: Vec<u8>,
        metadata: &Metadata,
    ) -> StorageResult<ObjectInfo>;

    /// Replace the object's user metadata with `metadata`
    ///
    /// Keys absent from `metadata` are removed. With
    /// `if_metageneration_match`, the patch fails with
    /// [`StorageError::PreconditionFailed`] when the object's current
    /// metageneration differs.
    async fn patch_metadata(
        &self,
        bucket: &str,
        name: &str,
        metadata: &Metadata,
        if_metageneration_match: Option<i64>,
    ) -> StorageResult<ObjectInfo>;

    /// Backend name for log messages
    fn name(&self) -> &'static str;
}
