//! `blobseal decrypt`

use super::{load_settings, Backends};
use crate::cli::DecryptArgs;
use crate::output;
use anyhow::{Context, Result};
use blobseal_core::{StageConfig, StageKind};
use blobseal_stages::{
    DecryptStage, NamingError, StageError, StorageEvent, EXIT_FAILURE, EXIT_SUCCESS,
};
use blobseal_storage::ObjectInfo;
use camino::Utf8Path;
use std::io::Read;

pub async fn run(args: DecryptArgs, config: Option<&Utf8Path>) -> i32 {
    match decrypt(args, config).await {
        Ok(info) => {
            output::success(&format!("Decrypted to {}", info.uri()));
            EXIT_SUCCESS
        }
        Err(e) => {
            output::error(&format!("{:#}", e));
            EXIT_FAILURE
        }
    }
}

async fn decrypt(args: DecryptArgs, config: Option<&Utf8Path>) -> Result<ObjectInfo> {
    let stage_config = StageConfig::from_env(StageKind::Decrypt).map_err(StageError::from)?;
    let settings = load_settings(config)?;
    let event = resolve_event(&args)?;
    let backends = Backends::build(&settings, &stage_config).await?;

    let stage = DecryptStage::new(stage_config, backends.store, backends.keys, backends.sinks);
    let info = stage.handle(&event).await?;
    Ok(info)
}

/// The event named on the command line, or read from a file or stdin
fn resolve_event(args: &DecryptArgs) -> Result<StorageEvent> {
    if let (Some(bucket), Some(name)) = (&args.bucket, &args.name) {
        return Ok(StorageEvent::new(bucket, name));
    }

    let source = args.event.as_deref().context("no event given")?;
    let payload = if source == "-" {
        let mut payload = String::new();
        std::io::stdin()
            .read_to_string(&mut payload)
            .context("Failed to read event from stdin")?;
        payload
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read event file {}", source))?
    };

    let event = StorageEvent::from_json(&payload)
        .map_err(NamingError::from)
        .map_err(StageError::from)?;
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_env::ScopedEnv;
    use blobseal_secrets::{seal, KeyMaterial, SealOptions};
    use blobseal_storage::{LocalObjectStore, Metadata, ObjectStore};
    use serial_test::serial;
    use tempfile::TempDir;

    const SOURCE: &str = "data/20240315/orders.encrypted";

    fn args(bucket: Option<&str>, name: Option<&str>, event: Option<&str>) -> DecryptArgs {
        DecryptArgs {
            bucket: bucket.map(String::from),
            name: name.map(String::from),
            event: event.map(String::from),
        }
    }

    #[test]
    fn test_event_from_flags() {
        let event = resolve_event(&args(
            Some("enc-bkt"),
            Some("data/20240315/orders.encrypted"),
            None,
        ))
        .unwrap();
        assert_eq!(event.bucket, "enc-bkt");
        assert_eq!(event.name, "data/20240315/orders.encrypted");
    }

    #[test]
    fn test_event_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("event.json");
        std::fs::write(
            &path,
            r#"{"data": {"bucket": "enc-bkt", "name": "data/20240315/orders.encrypted"}}"#,
        )
        .unwrap();

        let event = resolve_event(&args(None, None, path.to_str())).unwrap();
        assert_eq!(event.bucket, "enc-bkt");
        assert_eq!(event.name, "data/20240315/orders.encrypted");
    }

    #[test]
    fn test_malformed_event_is_a_naming_failure() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("event.json");
        std::fs::write(&path, "not json").unwrap();

        let err = resolve_event(&args(None, None, path.to_str())).unwrap_err();
        let stage = err.downcast_ref::<StageError>().unwrap();
        assert!(matches!(stage, StageError::ObjectNaming(_)));
    }

    /// A local store holding one sealed `orders` object stamped with
    /// `process_id` abc123, and the key file it was sealed with
    async fn seeded_workspace() -> TempDir {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("blobseal.key"), "k1\n").unwrap();

        let store = LocalObjectStore::new(temp.path().join("storage")).await.unwrap();
        let key = KeyMaterial::from("k1");
        let sealed = seal(b"id,amount\n1,10\n", &key, SealOptions::default()).unwrap();
        let metadata = Metadata::from([
            ("process_id".to_string(), "abc123".to_string()),
            ("job_name".to_string(), "nightly".to_string()),
        ]);
        store
            .write_object("enc-bkt", SOURCE, sealed, &metadata)
            .await
            .unwrap();
        temp
    }

    fn object_args() -> DecryptArgs {
        args(Some("enc-bkt"), Some(SOURCE), None)
    }

    /// Objects written to the decrypted bucket
    fn decrypted_files(root: &std::path::Path) -> Vec<std::path::PathBuf> {
        let Ok(days) = std::fs::read_dir(root.join("dec-bkt/data")) else {
            return Vec::new();
        };
        days.flat_map(|day| std::fs::read_dir(day.unwrap().path()).unwrap())
            .map(|file| file.unwrap().path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "txt"))
            .collect()
    }

    #[tokio::test]
    #[serial]
    async fn test_decrypt_exits_one_and_copies_metadata() {
        let temp = seeded_workspace().await;
        let root = temp.path().join("storage");
        let _env = ScopedEnv::local(&root, &temp.path().join("blobseal.key"));

        assert_eq!(run(object_args(), None).await, EXIT_SUCCESS);

        let files = decrypted_files(&root);
        assert_eq!(files.len(), 1);
        assert_eq!(std::fs::read(&files[0]).unwrap(), b"id,amount\n1,10\n");

        let name = files[0]
            .strip_prefix(root.join("dec-bkt"))
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let store = LocalObjectStore::new(&root).await.unwrap();
        let info = store.get_object("dec-bkt", &name).await.unwrap();
        assert_eq!(info.metadata["process_id"], "abc123");
        assert_eq!(info.metadata["job_name"], "nightly");
        assert_eq!(info.metadata.len(), 2);
    }

    #[tokio::test]
    #[serial]
    async fn test_logger_init_failure_exits_minus_one_without_output() {
        let temp = seeded_workspace().await;
        let root = temp.path().join("storage");
        let env = ScopedEnv::local(&root, &temp.path().join("blobseal.key"));
        env.set("BLOBSEAL_LOG_SINK", "cloud");
        // No token and no reachable metadata server
        env.set("GCE_METADATA_HOST", "127.0.0.1:1");

        assert_eq!(run(object_args(), None).await, EXIT_FAILURE);
        assert!(decrypted_files(&root).is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_missing_bucket_configuration_fails() {
        let temp = seeded_workspace().await;
        let root = temp.path().join("storage");
        let env = ScopedEnv::local(&root, &temp.path().join("blobseal.key"));
        env.remove("BUCKET_DESENCRIPTADOS");

        assert_eq!(run(object_args(), None).await, EXIT_FAILURE);
        assert!(decrypted_files(&root).is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_wrong_key_exits_minus_one() {
        let temp = seeded_workspace().await;
        let root = temp.path().join("storage");
        let _env = ScopedEnv::local(&root, &temp.path().join("blobseal.key"));
        std::fs::write(temp.path().join("blobseal.key"), "k2\n").unwrap();

        assert_eq!(run(object_args(), None).await, EXIT_FAILURE);
        assert!(decrypted_files(&root).is_empty());
    }
}
