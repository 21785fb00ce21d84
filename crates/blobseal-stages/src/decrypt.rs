//! Decrypt stage
//!
//! Handles one object-created event for a ciphertext object: inherits the
//! run's `process_id` from the object's metadata, opens the envelope under
//! the latest key version and stores the plaintext at
//! `data/<run date>/<base>.txt` in the destination bucket.
//!
//! The content read is pinned to the generation whose metadata was inspected,
//! so a ciphertext replaced in between fails the run instead of pairing one
//! run's plaintext with another run's `process_id`.
//!
//! The plaintext is written carrying only the `metadata-pending` sentinel.
//! The source object's metadata is then copied over it verbatim, guarded by
//! the metageneration the write returned. Because the patch replaces the whole
//! map, the sentinel disappears exactly when the copy lands; an output that
//! still carries it had its metadata patch fail.

use crate::context::RunContext;
use crate::error::{NamingError, StageError, TransformError};
use crate::event::StorageEvent;
use crate::logging::{CheckpointLogger, LogSinkFactory};
use crate::{METADATA_PENDING, PROCESS_ID_KEY, STATE_KEY};
use blobseal_core::{StageConfig, StageKind};
use blobseal_secrets::{Cipher, KeySource};
use blobseal_storage::{naming, Metadata, ObjectInfo, ObjectStore};
use chrono::{DateTime, Local};
use std::sync::Arc;
use tracing::debug;

pub struct DecryptStage {
    config: StageConfig,
    store: Arc<dyn ObjectStore>,
    keys: Arc<dyn KeySource>,
    sinks: Arc<dyn LogSinkFactory>,
    start_time: Option<DateTime<Local>>,
}

impl DecryptStage {
    pub fn new(
        config: StageConfig,
        store: Arc<dyn ObjectStore>,
        keys: Arc<dyn KeySource>,
        sinks: Arc<dyn LogSinkFactory>,
    ) -> Self {
        Self {
            config,
            store,
            keys,
            sinks,
            start_time: None,
        }
    }

    /// Pin the run's start time instead of reading the clock
    pub fn with_start_time(mut self, start_time: DateTime<Local>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Decrypt the object `event` refers to, returning the plaintext object
    pub async fn handle(&self, event: &StorageEvent) -> Result<ObjectInfo, StageError> {
        let started_at = self.start_time.unwrap_or_else(Local::now);
        event.validate().map_err(NamingError::from)?;

        let source = self
            .store
            .get_object(&event.bucket, &event.name)
            .await
            .map_err(NamingError::from)?;
        let process_id = source
            .metadata
            .get(PROCESS_ID_KEY)
            .filter(|id| !id.is_empty())
            .cloned()
            .ok_or_else(|| NamingError::MissingMetadata {
                bucket: event.bucket.clone(),
                name: event.name.clone(),
                key: PROCESS_ID_KEY,
            })?;

        let work_file = naming::work_file(&event.name).map_err(NamingError::from)?;
        let ctx = RunContext::new(StageKind::Decrypt, process_id, work_file, started_at);

        let sink = self
            .sinks
            .create(&ctx)
            .await
            .map_err(StageError::LoggerInit)?;
        let logger = CheckpointLogger::new(sink, &ctx);

        match self.checkpoints(&ctx, &logger, event, &source).await {
            Ok(info) => {
                logger
                    .info(format!(
                        "Process completed successfully ({}s)",
                        ctx.elapsed_secs()
                    ))
                    .await;
                Ok(info)
            }
            Err(e) => {
                logger.error(e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn checkpoints(
        &self,
        ctx: &RunContext,
        logger: &CheckpointLogger,
        event: &StorageEvent,
        source: &ObjectInfo,
    ) -> Result<ObjectInfo, StageError> {
        logger.info("Decryption run started").await;

        // OBJECT_NAMED
        logger
            .info("Creating storage object for the decrypted content")
            .await;
        let object = naming::object_name(
            ctx.run_date(),
            &event.name,
            StageKind::Decrypt.output_suffix(),
        )
        .map_err(NamingError::from)?;
        debug!("Destination is gs://{}/{}", self.config.bucket, object);

        // KEY_FETCHED
        logger.info("Fetching the decryption key").await;
        let key = self.keys.fetch_latest(&self.config.secret_name).await?;

        // TRANSFORMED
        logger.info("Decrypting the file").await;
        let sealed = self
            .store
            .read_object(&event.bucket, &event.name, Some(source.generation))
            .await
            .map_err(TransformError::from)?;
        let plaintext = Cipher::new(&key)
            .and_then(|cipher| cipher.open(&sealed))
            .map_err(TransformError::from)?;

        let pending = Metadata::from([(STATE_KEY.to_string(), METADATA_PENDING.to_string())]);
        let written = self
            .store
            .write_object(&self.config.bucket, &object, plaintext, &pending)
            .await
            .map_err(TransformError::from)?;

        let copied = self
            .store
            .patch_metadata(
                &self.config.bucket,
                &object,
                &source.metadata,
                Some(written.metageneration),
            )
            .await
            .map_err(TransformError::from)?;

        Ok(copied)
    }
}
