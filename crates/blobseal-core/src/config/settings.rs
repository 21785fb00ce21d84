//! Runtime settings with precedence
//!
//! Loads settings from the following sources (low to high):
//! 1. Built-in defaults
//! 2. YAML settings file (`--config`, else `BLOBSEAL_CONFIG`)
//! 3. Environment variables (`BLOBSEAL_*` prefix)

use crate::error::{Error, Result};
use crate::types::{RetryPolicy, RetryStrategy};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable pointing at a YAML settings file
pub const CONFIG_ENV: &str = "BLOBSEAL_CONFIG";

const STORAGE_BACKEND_ENV: &str = "BLOBSEAL_STORAGE_BACKEND";
const LOCAL_ROOT_ENV: &str = "BLOBSEAL_LOCAL_ROOT";
const KEY_SOURCE_ENV: &str = "BLOBSEAL_KEY_SOURCE";
const KEY_FILE_ENV: &str = "BLOBSEAL_KEY_FILE";
const LOG_SINK_ENV: &str = "BLOBSEAL_LOG_SINK";
const COMPRESS_ENV: &str = "BLOBSEAL_COMPRESS";
const HTTP_TIMEOUT_ENV: &str = "BLOBSEAL_HTTP_TIMEOUT_SECS";
const RETRY_MAX_ATTEMPTS_ENV: &str = "BLOBSEAL_RETRY_MAX_ATTEMPTS";
const RETRY_INITIAL_DELAY_ENV: &str = "BLOBSEAL_RETRY_INITIAL_DELAY_MS";
const RETRY_MAX_DELAY_ENV: &str = "BLOBSEAL_RETRY_MAX_DELAY_MS";
const RETRY_STRATEGY_ENV: &str = "BLOBSEAL_RETRY_STRATEGY";

/// Object storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    /// Cloud Storage JSON API (default)
    #[default]
    Gcs,
    /// Local filesystem directory, one subdirectory per bucket
    Local,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gcs" => Ok(StorageBackend::Gcs),
            "local" => Ok(StorageBackend::Local),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Gcs => write!(f, "gcs"),
            StorageBackend::Local => write!(f, "local"),
        }
    }
}

/// Where key material comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum KeySourceKind {
    /// Secret Manager, latest version (default)
    #[default]
    SecretManager,
    /// Local key file
    File,
}

impl FromStr for KeySourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "secret-manager" | "secretmanager" => Ok(KeySourceKind::SecretManager),
            "file" => Ok(KeySourceKind::File),
            other => Err(format!("unknown key source '{}'", other)),
        }
    }
}

/// Destination of checkpoint log events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogSinkKind {
    /// Structured JSON lines on stdout (default)
    #[default]
    Stdout,
    /// Cloud Logging `entries:write` API
    Cloud,
}

impl FromStr for LogSinkKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" => Ok(LogSinkKind::Stdout),
            "cloud" => Ok(LogSinkKind::Cloud),
            other => Err(format!("unknown log sink '{}'", other)),
        }
    }
}

/// Optional runtime tuning shared by both stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuntimeSettings {
    #[serde(default)]
    pub storage_backend: StorageBackend,

    /// Root directory of the local storage backend
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,

    #[serde(default)]
    pub key_source: KeySourceKind,

    /// Key file, required when `key-source` is `file`
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    #[serde(default)]
    pub log_sink: LogSinkKind,

    /// Gzip the plaintext before sealing
    #[serde(default)]
    pub compress: bool,

    /// Per-request timeout for every HTTP call
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Retry policy for secret and storage calls
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::default(),
            local_root: default_local_root(),
            key_source: KeySourceKind::default(),
            key_file: None,
            log_sink: LogSinkKind::default(),
            compress: false,
            http_timeout_secs: default_http_timeout_secs(),
            retry: RetryPolicy::default(),
        }
    }
}

fn default_local_root() -> PathBuf {
    PathBuf::from("storage")
}

fn default_http_timeout_secs() -> u64 {
    60
}

impl RuntimeSettings {
    /// Per-request HTTP timeout
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.key_source == KeySourceKind::File && self.key_file.is_none() {
            return Err(Error::invalid_value(
                "key-file",
                "",
                "a key file is required when key-source is 'file'",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::invalid_value(
                "retry.max-attempts",
                "0",
                "at least one attempt is required",
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(Error::invalid_value(
                "http-timeout-secs",
                "0",
                "timeout must be positive",
            ));
        }
        Ok(())
    }
}

/// Settings loader
pub struct SettingsLoader {
    path: Option<Utf8PathBuf>,
}

impl SettingsLoader {
    /// Create a loader for an explicit settings file (or none)
    pub fn new(path: Option<Utf8PathBuf>) -> Self {
        Self { path }
    }

    /// Create a loader using `BLOBSEAL_CONFIG` when no explicit path is given
    pub fn with_fallback(path: Option<Utf8PathBuf>) -> Self {
        let path = path.or_else(|| {
            std::env::var(CONFIG_ENV)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(Utf8PathBuf::from)
        });
        Self { path }
    }

    /// Load settings from the file (if any) and the process environment
    pub fn load(&self) -> Result<RuntimeSettings> {
        self.load_with(|name| std::env::var(name).ok())
    }

    /// Load settings from the file (if any) and an arbitrary variable lookup
    pub fn load_with<F>(&self, lookup: F) -> Result<RuntimeSettings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = match &self.path {
            Some(path) => Self::load_yaml_file(path)?,
            None => RuntimeSettings::default(),
        };

        let settings = Self::apply_env_overrides(settings, lookup)?;
        settings.validate()?;
        Ok(settings)
    }

    fn load_yaml_file(path: &Utf8Path) -> Result<RuntimeSettings> {
        if !path.exists() {
            return Err(Error::settings_not_found(path.as_str()));
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(RuntimeSettings::default());
        }
        Ok(serde_yaml_ng::from_str(&content)?)
    }

    /// Apply `BLOBSEAL_*` overrides on top of `settings`
    pub fn apply_env_overrides<F>(
        mut settings: RuntimeSettings,
        lookup: F,
    ) -> Result<RuntimeSettings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(STORAGE_BACKEND_ENV) {
            settings.storage_backend = parse_with(STORAGE_BACKEND_ENV, &v)?;
        }
        if let Some(v) = get(LOCAL_ROOT_ENV) {
            settings.local_root = PathBuf::from(v);
        }
        if let Some(v) = get(KEY_SOURCE_ENV) {
            settings.key_source = parse_with(KEY_SOURCE_ENV, &v)?;
        }
        if let Some(v) = get(KEY_FILE_ENV) {
            settings.key_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get(LOG_SINK_ENV) {
            settings.log_sink = parse_with(LOG_SINK_ENV, &v)?;
        }
        if let Some(v) = get(COMPRESS_ENV) {
            settings.compress = parse_bool(COMPRESS_ENV, &v)?;
        }
        if let Some(v) = get(HTTP_TIMEOUT_ENV) {
            settings.http_timeout_secs = parse_with(HTTP_TIMEOUT_ENV, &v)?;
        }
        if let Some(v) = get(RETRY_MAX_ATTEMPTS_ENV) {
            settings.retry.max_attempts = parse_with(RETRY_MAX_ATTEMPTS_ENV, &v)?;
        }
        if let Some(v) = get(RETRY_INITIAL_DELAY_ENV) {
            settings.retry.initial_delay_ms = parse_with(RETRY_INITIAL_DELAY_ENV, &v)?;
        }
        if let Some(v) = get(RETRY_MAX_DELAY_ENV) {
            settings.retry.max_delay_ms = parse_with(RETRY_MAX_DELAY_ENV, &v)?;
        }
        if let Some(v) = get(RETRY_STRATEGY_ENV) {
            settings.retry.strategy = parse_with::<RetryStrategy>(RETRY_STRATEGY_ENV, &v)?;
        }

        Ok(settings)
    }
}

fn parse_with<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| Error::invalid_value(name, value, e.to_string()))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::invalid_value(name, value, "expected a boolean")),
    }
}
