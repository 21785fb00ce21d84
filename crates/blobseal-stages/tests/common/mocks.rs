//! Fakes for the stage capabilities
//!
//! Provides in-memory implementations of the object store, key source and
//! log sink so stages run without network or cloud credentials.

#![allow(dead_code)]

use async_trait::async_trait;
use blobseal_secrets::{KeyMaterial, KeySource, SecretError};
use blobseal_stages::{
    FixedSink, LogEvent, LogSink, LogSinkError, LogSinkFactory, RunContext, Severity,
};
use blobseal_storage::{Metadata, ObjectInfo, ObjectStore, StorageError, StorageResult};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory object store
///
/// Records every call as `"<op> <bucket>/<name>"`.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), (Vec<u8>, ObjectInfo)>>,
    calls: Mutex<Vec<String>>,
    /// Bump the metageneration right after every write, as a concurrent
    /// metadata writer would
    race_after_write: AtomicBool,
    /// Fail every metadata patch with a server error
    fail_patches: AtomicBool,
    /// Content and metadata that replace an object right after the next
    /// metadata read, as a concurrent rerun of the writer would
    replace_after_get: Mutex<Option<(Vec<u8>, Metadata)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn race_after_write(&self) {
        self.race_after_write.store(true, Ordering::SeqCst);
    }

    pub fn fail_patches(&self) {
        self.fail_patches.store(true, Ordering::SeqCst);
    }

    pub fn replace_after_get(&self, content: Vec<u8>, metadata: Metadata) {
        *self.replace_after_get.lock().unwrap() = Some((content, metadata));
    }

    /// Place an object directly, bypassing call recording
    pub fn insert(&self, bucket: &str, name: &str, content: Vec<u8>, metadata: Metadata) {
        let info = ObjectInfo {
            bucket: bucket.to_string(),
            name: name.to_string(),
            metadata,
            generation: 1,
            metageneration: 1,
            size: content.len() as u64,
        };
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), name.to_string()), (content, info));
    }

    pub fn object(&self, bucket: &str, name: &str) -> Option<(Vec<u8>, ObjectInfo)> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), name.to_string()))
            .cloned()
    }

    pub fn object_names(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, n)| n.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, op: &str, bucket: &str, name: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}/{}", op, bucket, name));
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, bucket: &str, name: &str) -> StorageResult<ObjectInfo> {
        self.record("get", bucket, name);
        let info = self
            .object(bucket, name)
            .map(|(_, info)| info)
            .ok_or_else(|| StorageError::not_found(bucket, name))?;

        if let Some((content, metadata)) = self.replace_after_get.lock().unwrap().take() {
            let mut objects = self.objects.lock().unwrap();
            if let Some(stored) = objects.get_mut(&(bucket.to_string(), name.to_string())) {
                stored.1.generation += 1;
                stored.1.metageneration = 1;
                stored.1.metadata = metadata;
                stored.1.size = content.len() as u64;
                stored.0 = content;
            }
        }
        Ok(info)
    }

    async fn read_object(
        &self,
        bucket: &str,
        name: &str,
        generation: Option<i64>,
    ) -> StorageResult<Vec<u8>> {
        self.record("read", bucket, name);
        self.object(bucket, name)
            .filter(|(_, info)| generation.is_none_or(|g| g == info.generation))
            .map(|(content, _)| content)
            .ok_or_else(|| StorageError::not_found(bucket, name))
    }

    async fn write_object(
        &self,
        bucket: &str,
        name: &str,
        content: Vec<u8>,
        metadata: &Metadata,
    ) -> StorageResult<ObjectInfo> {
        self.record("write", bucket, name);
        let key = (bucket.to_string(), name.to_string());
        let mut objects = self.objects.lock().unwrap();

        let generation = objects.get(&key).map(|(_, i)| i.generation + 1).unwrap_or(1);
        let info = ObjectInfo {
            bucket: bucket.to_string(),
            name: name.to_string(),
            metadata: metadata.clone(),
            generation,
            metageneration: 1,
            size: content.len() as u64,
        };
        objects.insert(key.clone(), (content, info.clone()));

        if self.race_after_write.load(Ordering::SeqCst) {
            if let Some((_, stored)) = objects.get_mut(&key) {
                stored.metageneration += 1;
                stored
                    .metadata
                    .insert("touched-by".to_string(), "someone-else".to_string());
            }
        }

        Ok(info)
    }

    async fn patch_metadata(
        &self,
        bucket: &str,
        name: &str,
        metadata: &Metadata,
        if_metageneration_match: Option<i64>,
    ) -> StorageResult<ObjectInfo> {
        self.record("patch", bucket, name);
        if self.fail_patches.load(Ordering::SeqCst) {
            return Err(StorageError::Status {
                status: 500,
                message: "backend unavailable".to_string(),
            });
        }

        let mut objects = self.objects.lock().unwrap();
        let (_, info) = objects
            .get_mut(&(bucket.to_string(), name.to_string()))
            .ok_or_else(|| StorageError::not_found(bucket, name))?;

        if let Some(expected) = if_metageneration_match {
            if info.metageneration != expected {
                return Err(StorageError::precondition_failed(bucket, name, expected));
            }
        }

        info.metadata = metadata.clone();
        info.metageneration += 1;
        Ok(info.clone())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Key source returning one fixed key, or failing
pub struct FixedKeySource {
    key: Option<KeyMaterial>,
    calls: AtomicU32,
}

impl FixedKeySource {
    pub fn new(key: &str) -> Self {
        Self {
            key: Some(KeyMaterial::from(key)),
            calls: AtomicU32::new(0),
        }
    }

    /// Every fetch fails as if the secret did not exist
    pub fn missing() -> Self {
        Self {
            key: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySource for FixedKeySource {
    async fn fetch_latest(&self, secret_name: &str) -> Result<KeyMaterial, SecretError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.key.clone().ok_or_else(|| SecretError::NotFound {
            name: secret_name.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Log sink keeping every event in memory
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LogEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(self: &Arc<Self>) -> Arc<dyn LogSinkFactory> {
        Arc::new(FixedSink::new(self.clone()))
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_for(&self, stage_name: &str) -> Vec<LogEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.labels.name == stage_name)
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.message).collect()
    }

    pub fn errors(&self) -> Vec<LogEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.severity == Severity::Error)
            .collect()
    }
}

#[async_trait]
impl LogSink for RecordingSink {
    async fn emit(&self, event: &LogEvent) -> Result<(), LogSinkError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Sink factory that can never connect
pub struct UnavailableSinks;

#[async_trait]
impl LogSinkFactory for UnavailableSinks {
    async fn create(&self, _ctx: &RunContext) -> Result<Arc<dyn LogSink>, LogSinkError> {
        Err(LogSinkError::Init("no credentials".to_string()))
    }
}
