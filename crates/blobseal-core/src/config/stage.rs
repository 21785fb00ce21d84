//! Required per-stage environment

use crate::error::{Error, Result};
use std::fmt;

/// Environment variable holding the cloud project identifier
pub const PROJECT_ID_ENV: &str = "PROJECT_ID";

/// Environment variable holding the name of the secret with the key material
pub const SECRET_KEY_ENV: &str = "SECRET_KEY";

/// Which stage is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Encrypt,
    Decrypt,
}

impl StageKind {
    /// Stage identity as it appears in the `name` log label
    pub fn stage_name(&self) -> &'static str {
        match self {
            StageKind::Encrypt => "encriptar",
            StageKind::Decrypt => "desencriptar",
        }
    }

    /// Environment variable naming this stage's destination bucket
    pub fn bucket_env(&self) -> &'static str {
        match self {
            StageKind::Encrypt => "BUCKET_ENCRIPTADOS",
            StageKind::Decrypt => "BUCKET_DESENCRIPTADOS",
        }
    }

    /// Accepted when [`bucket_env`](Self::bucket_env) is unset or blank
    pub fn bucket_env_alias(&self) -> &'static str {
        match self {
            StageKind::Encrypt => "ENCRYPTED_BUCKET",
            StageKind::Decrypt => "DECRYPTED_BUCKET",
        }
    }

    /// Suffix of the objects this stage writes
    pub fn output_suffix(&self) -> &'static str {
        match self {
            StageKind::Encrypt => "encrypted",
            StageKind::Decrypt => "txt",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stage_name())
    }
}

/// Required configuration of one stage invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageConfig {
    pub kind: StageKind,
    pub project_id: String,
    pub bucket: String,
    pub secret_name: String,
}

impl StageConfig {
    /// Read the stage configuration from the process environment
    pub fn from_env(kind: StageKind) -> Result<Self> {
        Self::from_lookup(kind, |name| std::env::var(name).ok())
    }

    /// Read the stage configuration through an arbitrary lookup
    ///
    /// Unset and empty values are both treated as missing.
    pub fn from_lookup<F>(kind: StageKind, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |name: &str| value(name).ok_or_else(|| Error::missing_env(name));

        let bucket = value(kind.bucket_env())
            .or_else(|| value(kind.bucket_env_alias()))
            .ok_or_else(|| Error::missing_env(kind.bucket_env()))?;

        Ok(Self {
            kind,
            project_id: required(PROJECT_ID_ENV)?,
            bucket,
            secret_name: required(SECRET_KEY_ENV)?,
        })
    }

    /// Resource path of the latest version of the key secret
    pub fn secret_version_path(&self) -> String {
        format!(
            "projects/{}/secrets/{}/versions/latest",
            self.project_id, self.secret_name
        )
    }
}
