//! Local filesystem object store
//!
//! Objects live at `<root>/<bucket>/<name>`. Each object has a JSON sidecar
//! `<name>.meta.json` holding its user metadata, generation and
//! metageneration, so patches get the same precondition semantics as the
//! cloud backend.

use crate::traits::{Metadata, ObjectInfo, ObjectStore, StorageError, StorageResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

/// Suffix of the metadata sidecar files
pub const SIDECAR_SUFFIX: &str = ".meta.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Sidecar {
    #[serde(default)]
    metadata: Metadata,
    generation: i64,
    metageneration: i64,
}

/// Object store rooted at a local directory
pub struct LocalObjectStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles on sidecars
    lock: Mutex<()>,
}

impl LocalObjectStore {
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an object to its content path, refusing anything that could
    /// escape the root
    fn object_path(&self, bucket: &str, name: &str) -> StorageResult<PathBuf> {
        validate_segment("bucket", bucket)?;
        if name.is_empty() || name.ends_with('/') {
            return Err(StorageError::InvalidName(format!(
                "object name {:?} is empty or a directory",
                name
            )));
        }
        if name.ends_with(SIDECAR_SUFFIX) {
            return Err(StorageError::InvalidName(format!(
                "object name {:?} collides with a metadata sidecar",
                name
            )));
        }

        let relative = Path::new(name);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidName(format!(
                "object name {:?} is not a plain relative path",
                name
            )));
        }

        Ok(self.root.join(bucket).join(relative))
    }

    fn sidecar_path(content: &Path) -> PathBuf {
        let mut os = content.as_os_str().to_owned();
        os.push(SIDECAR_SUFFIX);
        PathBuf::from(os)
    }

    async fn read_sidecar(path: &Path) -> StorageResult<Sidecar> {
        match fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StorageError::InvalidResponse(format!("{}: {}", path.display(), e))),
            // Files dropped in by hand have no sidecar yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Sidecar {
                generation: 1,
                metageneration: 1,
                ..Sidecar::default()
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_sidecar(path: &Path, sidecar: &Sidecar) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(sidecar)
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;
        write_atomic(path, &bytes).await
    }

    async fn load(&self, bucket: &str, name: &str, content: &Path) -> StorageResult<ObjectInfo> {
        let size = match fs::metadata(content).await {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => return Err(StorageError::not_found(bucket, name)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(bucket, name))
            }
            Err(e) => return Err(e.into()),
        };

        let sidecar = Self::read_sidecar(&Self::sidecar_path(content)).await?;
        Ok(ObjectInfo {
            bucket: bucket.to_string(),
            name: name.to_string(),
            metadata: sidecar.metadata,
            generation: sidecar.generation,
            metageneration: sidecar.metageneration,
            size,
        })
    }
}

fn validate_segment(what: &str, value: &str) -> StorageResult<()> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains('/')
        || value.contains('\\')
    {
        return Err(StorageError::InvalidName(format!(
            "{} {:?} is not a single path segment",
            what, value
        )));
    }
    Ok(())
}

/// Write to a temporary sibling, then rename over the target
async fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get_object(&self, bucket: &str, name: &str) -> StorageResult<ObjectInfo> {
        let content = self.object_path(bucket, name)?;
        self.load(bucket, name, &content).await
    }

    async fn read_object(
        &self,
        bucket: &str,
        name: &str,
        generation: Option<i64>,
    ) -> StorageResult<Vec<u8>> {
        let content = self.object_path(bucket, name)?;
        // Content and sidecar must come from the same write
        let _guard = self.lock.lock().await;

        let bytes = match fs::read(&content).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(bucket, name))
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(expected) = generation {
            let current = Self::read_sidecar(&Self::sidecar_path(&content))
                .await?
                .generation;
            if current != expected {
                debug!(
                    "gs://{}/{} is at generation {}, wanted {}",
                    bucket, name, current, expected
                );
                return Err(StorageError::not_found(bucket, name));
            }
        }
        Ok(bytes)
    }

    async fn write_object(
        &self,
        bucket: &str,
        name: &str,
        content: Vec<u8>,
        metadata: &Metadata,
    ) -> StorageResult<ObjectInfo> {
        let path = self.object_path(bucket, name)?;
        let sidecar_path = Self::sidecar_path(&path);
        let _guard = self.lock.lock().await;

        let previous_generation = match fs::try_exists(&path).await? {
            true => Self::read_sidecar(&sidecar_path).await?.generation,
            false => 0,
        };

        write_atomic(&path, &content).await?;
        Self::write_sidecar(
            &sidecar_path,
            &Sidecar {
                metadata: metadata.clone(),
                generation: previous_generation + 1,
                metageneration: 1,
            },
        )
        .await?;

        debug!("Wrote {} bytes to {}", content.len(), path.display());
        self.load(bucket, name, &path).await
    }

    async fn patch_metadata(
        &self,
        bucket: &str,
        name: &str,
        metadata: &Metadata,
        if_metageneration_match: Option<i64>,
    ) -> StorageResult<ObjectInfo> {
        let path = self.object_path(bucket, name)?;
        let _guard = self.lock.lock().await;

        let current = self.load(bucket, name, &path).await?;
        if let Some(expected) = if_metageneration_match {
            if current.metageneration != expected {
                return Err(StorageError::precondition_failed(bucket, name, expected));
            }
        }

        Self::write_sidecar(
            &Self::sidecar_path(&path),
            &Sidecar {
                metadata: metadata.clone(),
                generation: current.generation,
                metageneration: current.metageneration + 1,
            },
        )
        .await?;

        self.load(bucket, name, &path).await
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
