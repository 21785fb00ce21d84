//! `blobseal keygen`
//!
//! Prints fresh key material, or writes it to a file readable only by its
//! owner. Store the key in Secret Manager as the `SECRET_KEY` secret, or
//! point `BLOBSEAL_KEY_FILE` at the file.

use crate::cli::KeygenArgs;
use crate::output;
use anyhow::{bail, Context, Result};
use blobseal_secrets::generate_key;
use blobseal_stages::{EXIT_FAILURE, EXIT_SUCCESS};
use camino::Utf8Path;
use std::io::Write;

pub fn run(args: KeygenArgs) -> i32 {
    let key = generate_key();
    let result = match &args.output {
        Some(path) => write_key(path, &key, args.force)
            .map(|()| output::success(&format!("Wrote key to {}", path))),
        None => {
            output::status(&key);
            Ok(())
        }
    };

    match result {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            EXIT_FAILURE
        }
    }
}

fn write_key(path: &Utf8Path, key: &str, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent))?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to open {}", path))?;
    writeln!(file, "{}", key).with_context(|| format!("Failed to write {}", path))?;
    Ok(())
}
