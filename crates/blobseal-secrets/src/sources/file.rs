//! Key material from a local file
//!
//! For development and offline runs. The secret name is ignored: the file
//! holds exactly one key. A single trailing line ending is dropped so a key
//! file saved by an editor still matches the key it was written with.

use super::{KeySource, SecretError};
use crate::security::KeyMaterial;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct FileKeySource {
    path: PathBuf,
}

impl FileKeySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl KeySource for FileKeySource {
    async fn fetch_latest(&self, secret_name: &str) -> Result<KeyMaterial, SecretError> {
        debug!(
            "Reading key for {} from {}",
            secret_name,
            self.path.display()
        );

        let mut bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| SecretError::KeyFile {
                path: self.path.clone(),
                source,
            })?;

        if bytes.ends_with(b"\r\n") {
            bytes.truncate(bytes.len() - 2);
        } else if bytes.ends_with(b"\n") {
            bytes.truncate(bytes.len() - 1);
        }

        if bytes.is_empty() {
            return Err(SecretError::invalid_payload(secret_name, "key file is empty"));
        }

        Ok(KeyMaterial::new(bytes))
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
