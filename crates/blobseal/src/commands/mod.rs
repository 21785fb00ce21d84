//! CLI command implementations
//!
//! The stage commands share one wiring step: runtime settings pick the
//! storage backend, key source and log sink handed to the stage.

pub mod decrypt;
pub mod encrypt;
pub mod keygen;

#[cfg(test)]
pub(crate) mod test_env;

use anyhow::{Context, Result};
use blobseal_core::auth::default_provider;
use blobseal_core::config::{KeySourceKind, LogSinkKind, StorageBackend};
use blobseal_core::{RuntimeSettings, SettingsLoader, StageConfig};
use blobseal_secrets::{FileKeySource, KeySource, SealOptions, SecretManagerSource};
use blobseal_stages::{
    CloudLoggingFactory, FixedSink, LogSinkFactory, StageError, StdoutJsonSink,
};
use blobseal_storage::{GcsObjectStore, LocalObjectStore, ObjectStore};
use camino::Utf8Path;
use std::sync::Arc;
use tracing::debug;

/// Capabilities a stage runs over
pub struct Backends {
    pub store: Arc<dyn ObjectStore>,
    pub keys: Arc<dyn KeySource>,
    pub sinks: Arc<dyn LogSinkFactory>,
}

impl Backends {
    /// Build the configured backends. No network call happens here.
    pub async fn build(settings: &RuntimeSettings, config: &StageConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.http_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        let tokens = default_provider(client.clone());

        let store: Arc<dyn ObjectStore> = match settings.storage_backend {
            StorageBackend::Gcs => Arc::new(
                GcsObjectStore::new(client.clone(), tokens.clone())
                    .with_retry(settings.retry.clone()),
            ),
            StorageBackend::Local => Arc::new(
                LocalObjectStore::new(&settings.local_root)
                    .await
                    .with_context(|| {
                        format!(
                            "Failed to open local storage at {}",
                            settings.local_root.display()
                        )
                    })?,
            ),
        };

        let keys: Arc<dyn KeySource> = match settings.key_source {
            KeySourceKind::SecretManager => Arc::new(
                SecretManagerSource::new(client.clone(), tokens.clone(), &config.project_id)
                    .with_retry(settings.retry.clone()),
            ),
            KeySourceKind::File => {
                let path = settings
                    .key_file
                    .as_ref()
                    .context("key-source 'file' needs key-file")?;
                Arc::new(FileKeySource::new(path))
            }
        };

        let sinks: Arc<dyn LogSinkFactory> = match settings.log_sink {
            LogSinkKind::Stdout => Arc::new(FixedSink::new(Arc::new(StdoutJsonSink::new()))),
            LogSinkKind::Cloud => Arc::new(CloudLoggingFactory::new(
                client,
                tokens,
                &config.project_id,
            )),
        };

        debug!(
            "Backends: storage={}, keys={}, log sink={:?}",
            store.name(),
            keys.name(),
            settings.log_sink
        );

        Ok(Self { store, keys, sinks })
    }
}

/// Load runtime settings, reported as a configuration failure
pub fn load_settings(path: Option<&Utf8Path>) -> Result<RuntimeSettings, StageError> {
    let settings = SettingsLoader::with_fallback(path.map(Utf8Path::to_path_buf)).load()?;
    Ok(settings)
}

pub fn seal_options(settings: &RuntimeSettings) -> SealOptions {
    SealOptions {
        compress: settings.compress,
    }
}
