//! Key sources
//!
//! A [`KeySource`] returns the latest version of a named key. Every failure
//! is a [`SecretError`]; the stages collapse all of them into one
//! secret-access failure, while the retry engine uses
//! [`Transient::is_transient`] to decide which ones are worth another try.

pub mod file;
pub mod secret_manager;

use crate::security::KeyMaterial;
use async_trait::async_trait;
use blobseal_core::auth::AuthError;
use blobseal_core::retry::Transient;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret {name} not found")]
    NotFound { name: String },

    #[error("permission denied accessing secret {name}")]
    PermissionDenied { name: String },

    #[error("secret service returned HTTP {status} for {name}")]
    Status { name: String, status: u16 },

    #[error("secret request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("could not authenticate to the secret service: {0}")]
    Auth(#[from] AuthError),

    #[error("invalid secret payload for {name}: {reason}")]
    InvalidPayload { name: String, reason: String },

    #[error("failed to read key file {}: {source}", .path.display())]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SecretError {
    pub(crate) fn invalid_payload(name: &str, reason: impl Into<String>) -> Self {
        SecretError::InvalidPayload {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl Transient for SecretError {
    fn is_transient(&self) -> bool {
        match self {
            SecretError::Status { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            SecretError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SecretError::Auth(e) => e.is_transient(),
            SecretError::NotFound { .. }
            | SecretError::PermissionDenied { .. }
            | SecretError::InvalidPayload { .. }
            | SecretError::KeyFile { .. } => false,
        }
    }
}

/// Capability: fetch the latest version of a named key
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn fetch_latest(&self, secret_name: &str) -> Result<KeyMaterial, SecretError>;

    /// Source name for log messages
    fn name(&self) -> &'static str;
}

pub use file::FileKeySource;
pub use secret_manager::SecretManagerSource;
