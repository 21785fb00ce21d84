//! Configuration for blobseal stages
//!
//! Two layers:
//! - [`StageConfig`]: the required per-stage environment (project, bucket, secret name)
//! - [`RuntimeSettings`]: optional tuning (backends, retry, timeouts) loaded from
//!   YAML and overridden by `BLOBSEAL_*` environment variables

mod settings;
mod stage;

pub use settings::{
    KeySourceKind, LogSinkKind, RuntimeSettings, SettingsLoader, StorageBackend, CONFIG_ENV,
};
pub use stage::{StageConfig, StageKind, PROJECT_ID_ENV, SECRET_KEY_ENV};
