//! Process environment for command tests

use std::path::Path;

/// Every variable the stage commands read
const VARS: &[&str] = &[
    "PROJECT_ID",
    "SECRET_KEY",
    "BUCKET_ENCRIPTADOS",
    "BUCKET_DESENCRIPTADOS",
    "ENCRYPTED_BUCKET",
    "DECRYPTED_BUCKET",
    "BLOBSEAL_CONFIG",
    "BLOBSEAL_STORAGE_BACKEND",
    "BLOBSEAL_LOCAL_ROOT",
    "BLOBSEAL_KEY_SOURCE",
    "BLOBSEAL_KEY_FILE",
    "BLOBSEAL_LOG_SINK",
    "BLOBSEAL_COMPRESS",
    "GOOGLE_OAUTH_ACCESS_TOKEN",
    "GCE_METADATA_HOST",
];

/// Sets the given variables and clears the rest of [`VARS`] until dropped
///
/// Tests holding one must run `#[serial]`.
pub struct ScopedEnv {
    saved: Vec<(&'static str, Option<String>)>,
}

impl ScopedEnv {
    pub fn new(vars: &[(&str, &str)]) -> Self {
        let saved = VARS
            .iter()
            .map(|&name| (name, std::env::var(name).ok()))
            .collect();
        for name in VARS {
            std::env::remove_var(name);
        }
        for (name, value) in vars {
            assert!(VARS.contains(name), "{} is not a stage variable", name);
            std::env::set_var(name, value);
        }
        Self { saved }
    }

    /// Both stages against a local store under `root` with the key in
    /// `key_file`, logging to stdout
    pub fn local(root: &Path, key_file: &Path) -> Self {
        Self::new(&[
            ("PROJECT_ID", "proj-1"),
            ("SECRET_KEY", "blobseal-key"),
            ("BUCKET_ENCRIPTADOS", "enc-bkt"),
            ("BUCKET_DESENCRIPTADOS", "dec-bkt"),
            ("BLOBSEAL_STORAGE_BACKEND", "local"),
            ("BLOBSEAL_LOCAL_ROOT", path_str(root)),
            ("BLOBSEAL_KEY_SOURCE", "file"),
            ("BLOBSEAL_KEY_FILE", path_str(key_file)),
            ("BLOBSEAL_LOG_SINK", "stdout"),
        ])
    }

    /// Override one variable for the rest of the scope
    pub fn set(&self, name: &str, value: &str) {
        assert!(VARS.contains(&name), "{} is not a stage variable", name);
        std::env::set_var(name, value);
    }

    pub fn remove(&self, name: &str) {
        std::env::remove_var(name);
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (name, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(name, v),
                None => std::env::remove_var(name),
            }
        }
    }
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("temp paths are UTF-8")
}
