//! Common test utilities for blobseal-stages
//!
//! - In-memory object store with call recording and fault injection
//! - Fixed key source
//! - Recording log sink
//! - Stage builders over those fakes

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod mocks;

pub use mocks::*;

use blobseal_core::{StageConfig, StageKind};
use blobseal_stages::{DecryptStage, EncryptStage, LogSinkFactory};
use chrono::{DateTime, Local, TimeZone};
use std::sync::Arc;

pub const PROJECT_ID: &str = "proj-1";
pub const ENCRYPTED_BUCKET: &str = "enc-bkt";
pub const DECRYPTED_BUCKET: &str = "dec-bkt";
pub const SECRET_NAME: &str = "enc-key";
pub const KEY: &str = "k1";

pub fn config(kind: StageKind) -> StageConfig {
    let bucket = match kind {
        StageKind::Encrypt => ENCRYPTED_BUCKET,
        StageKind::Decrypt => DECRYPTED_BUCKET,
    };
    StageConfig {
        kind,
        project_id: PROJECT_ID.to_string(),
        bucket: bucket.to_string(),
        secret_name: SECRET_NAME.to_string(),
    }
}

/// 2024-03-15 10:30 local time
pub fn encrypt_day() -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap()
}

/// 2024-03-16 08:00 local time
pub fn decrypt_day() -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 3, 16, 8, 0, 0).unwrap()
}

/// Everything a stage talks to, shared between stages of one flow
#[derive(Clone)]
pub struct Harness {
    pub store: Arc<MemoryObjectStore>,
    pub keys: Arc<FixedKeySource>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryObjectStore::new()),
            keys: Arc::new(FixedKeySource::new(KEY)),
            sink: Arc::new(RecordingSink::new()),
        }
    }

    pub fn with_keys(mut self, keys: FixedKeySource) -> Self {
        self.keys = Arc::new(keys);
        self
    }

    pub fn sinks(&self) -> Arc<dyn LogSinkFactory> {
        self.sink.factory()
    }

    pub fn encrypt_stage(&self) -> EncryptStage {
        EncryptStage::new(
            config(StageKind::Encrypt),
            self.store.clone(),
            self.keys.clone(),
            self.sinks(),
        )
        .with_start_time(encrypt_day())
    }

    pub fn decrypt_stage(&self) -> DecryptStage {
        DecryptStage::new(
            config(StageKind::Decrypt),
            self.store.clone(),
            self.keys.clone(),
            self.sinks(),
        )
        .with_start_time(decrypt_day())
    }
}
