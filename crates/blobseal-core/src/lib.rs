//! # blobseal-core
//!
//! Core library for blobseal providing:
//! - Stage configuration from the process environment
//! - Runtime settings (YAML file plus `BLOBSEAL_*` overrides)
//! - Retry execution engine with policy-based configuration
//! - Access-token providers for the cloud REST APIs

pub mod auth;
pub mod config;
pub mod error;
pub mod retry;
pub mod types;

pub use config::{RuntimeSettings, SettingsLoader, StageConfig, StageKind};
pub use error::{Error, Result};
pub use types::{RetryPolicy, RetryStrategy};
