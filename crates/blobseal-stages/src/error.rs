//! Stage failure taxonomy
//!
//! Every failure is fatal to the run. Its message is prefixed with the
//! [`Phase`] that failed, e.g. `secret access failed: secret k not found`.

use crate::event::EventError;
use crate::logging::LogSinkError;
use blobseal_secrets::{CipherError, SecretError};
use blobseal_storage::StorageError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The part of a run that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Configuration,
    Input,
    LoggerInit,
    ObjectNaming,
    SecretAccess,
    Transform,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Configuration => "configuration",
            Phase::Input => "input",
            Phase::LoggerInit => "logger initialization",
            Phase::ObjectNaming => "object naming",
            Phase::SecretAccess => "secret access",
            Phase::Transform => "transform",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("configuration failed: {0}")]
    Configuration(#[from] blobseal_core::Error),

    #[error("input failed: file {} does not exist", .path.display())]
    InputNotFound { path: PathBuf },

    #[error("logger initialization failed: {0}")]
    LoggerInit(#[source] LogSinkError),

    #[error("object naming failed: {0}")]
    ObjectNaming(#[from] NamingError),

    #[error("secret access failed: {0}")]
    SecretAccess(#[from] SecretError),

    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),
}

/// Destination or source object could not be named or resolved
#[derive(Debug, Error)]
pub enum NamingError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error("gs://{bucket}/{name} carries no {key} metadata")]
    MissingMetadata {
        bucket: String,
        name: String,
        key: &'static str,
    },
}

/// Reading, sealing or opening the payload, writing it, or patching the
/// written object's metadata failed
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to read {}: {source}", .path.display())]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl StageError {
    pub fn phase(&self) -> Phase {
        match self {
            StageError::Configuration(_) => Phase::Configuration,
            StageError::InputNotFound { .. } => Phase::Input,
            StageError::LoggerInit(_) => Phase::LoggerInit,
            StageError::ObjectNaming(_) => Phase::ObjectNaming,
            StageError::SecretAccess(_) => Phase::SecretAccess,
            StageError::Transform(_) => Phase::Transform,
        }
    }

    /// The metadata patch lost a race with a concurrent writer
    pub fn is_precondition_failed(&self) -> bool {
        matches!(
            self,
            StageError::Transform(TransformError::Storage(e)) if e.is_precondition_failed()
        )
    }

    /// The payload failed authentication under the fetched key
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            StageError::Transform(TransformError::Cipher(e)) if e.is_authentication_failure()
        )
    }
}
