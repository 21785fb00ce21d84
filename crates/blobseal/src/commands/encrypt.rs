//! `blobseal encrypt`

use super::{load_settings, seal_options, Backends};
use crate::cli::EncryptArgs;
use crate::output;
use anyhow::Result;
use blobseal_core::{StageConfig, StageKind};
use blobseal_stages::{EncryptStage, StageError, EXIT_FAILURE, EXIT_SUCCESS};
use blobseal_storage::ObjectInfo;
use camino::Utf8Path;
use std::io::Write;

pub async fn run(args: EncryptArgs, config: Option<&Utf8Path>) -> i32 {
    run_with(args, config, &mut std::io::stdout()).await
}

/// Run the stage, writing the final status line to `out`
pub async fn run_with(
    args: EncryptArgs,
    config: Option<&Utf8Path>,
    out: &mut impl Write,
) -> i32 {
    match encrypt(args, config).await {
        Ok(info) => {
            output::kv("object", &info.uri());
            output::write_status(out, output::COMPLETED);
            EXIT_SUCCESS
        }
        Err(e) => {
            output::error(&format!("{:#}", e));
            output::write_status(out, output::FAILED);
            EXIT_FAILURE
        }
    }
}

async fn encrypt(args: EncryptArgs, config: Option<&Utf8Path>) -> Result<ObjectInfo> {
    // Required configuration first, before any backend exists
    let stage_config = StageConfig::from_env(StageKind::Encrypt).map_err(StageError::from)?;
    let settings = load_settings(config)?;
    let backends = Backends::build(&settings, &stage_config).await?;

    let stage = EncryptStage::new(stage_config, backends.store, backends.keys, backends.sinks)
        .with_options(seal_options(&settings));
    let info = stage.run(args.file.as_std_path(), &args.job_name).await?;
    Ok(info)
}
