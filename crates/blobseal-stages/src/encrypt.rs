//! Encrypt stage
//!
//! Reads a local file, seals it under the latest key version and stores the
//! envelope at `data/<run date>/<base>.encrypted`. The stored object is then
//! stamped with `{process_id, job_name}`, guarded by the metageneration the
//! upload returned, so a concurrent writer makes the run fail instead of
//! being overwritten.

use crate::context::RunContext;
use crate::error::{NamingError, StageError, TransformError};
use crate::logging::{CheckpointLogger, LogSinkFactory};
use crate::{JOB_NAME_KEY, PROCESS_ID_KEY};
use blobseal_core::{StageConfig, StageKind};
use blobseal_secrets::{Cipher, KeySource, SealOptions};
use blobseal_storage::{naming, Metadata, ObjectInfo, ObjectStore};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub struct EncryptStage {
    config: StageConfig,
    store: Arc<dyn ObjectStore>,
    keys: Arc<dyn KeySource>,
    sinks: Arc<dyn LogSinkFactory>,
    options: SealOptions,
    start_time: Option<DateTime<Local>>,
}

impl EncryptStage {
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
            options: SealOptions::default(),
            start_time: None,
        }
    }

    pub fn with_options(mut self, options: SealOptions) -> Self {
        self.options = options;
        self
    }

    /// Pin the run's start time instead of reading the clock
    pub fn with_start_time(mut self, start_time: DateTime<Local>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Encrypt `input` and store it, returning the stamped object
    pub async fn run(&self, input: &Path, job_name: &str) -> Result<ObjectInfo, StageError> {
        let started_at = self.start_time.unwrap_or_else(Local::now);

        if !is_file(input).await {
            return Err(StageError::InputNotFound {
                path: input.to_path_buf(),
            });
        }

        let source = input.to_string_lossy();
        let work_file = naming::work_file(&source).map_err(NamingError::from)?;
        let ctx = RunContext::new(
            StageKind::Encrypt,
            RunContext::generate_process_id(),
            work_file,
            started_at,
        );

        let sink = self
            .sinks
            .create(&ctx)
            .await
            .map_err(StageError::LoggerInit)?;
        let logger = CheckpointLogger::new(sink, &ctx);

        match self.checkpoints(&ctx, &logger, input, job_name).await {
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
        input: &Path,
        job_name: &str,
    ) -> Result<ObjectInfo, StageError> {
        logger.info("Encryption run started").await;

        // OBJECT_NAMED
        logger
            .info("Creating storage object for the encrypted content")
            .await;
        let object = naming::object_name(
            ctx.run_date(),
            &input.to_string_lossy(),
            StageKind::Encrypt.output_suffix(),
        )
        .map_err(NamingError::from)?;
        debug!("Destination is gs://{}/{}", self.config.bucket, object);

        // KEY_FETCHED
        logger.info("Fetching the encryption key").await;
        let key = self.keys.fetch_latest(&self.config.secret_name).await?;

        // TRANSFORMED
        logger.info("Encrypting the file").await;
        let plaintext = tokio::fs::read(input)
            .await
            .map_err(|source| TransformError::ReadInput {
                path: PathBuf::from(input),
                source,
            })?;
        let sealed = Cipher::new(&key)
            .and_then(|cipher| cipher.seal(&plaintext, self.options))
            .map_err(TransformError::from)?;

        let written = self
            .store
            .write_object(&self.config.bucket, &object, sealed, &Metadata::new())
            .await
            .map_err(TransformError::from)?;

        let metadata = Metadata::from([
            (PROCESS_ID_KEY.to_string(), ctx.process_id().to_string()),
            (JOB_NAME_KEY.to_string(), job_name.to_string()),
        ]);
        let stamped = self
            .store
            .patch_metadata(
                &self.config.bucket,
                &object,
                &metadata,
                Some(written.metageneration),
            )
            .await
            .map_err(TransformError::from)?;

        Ok(stamped)
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
