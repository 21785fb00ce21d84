//! Key material, key retrieval and payload encryption for blobseal
//!
//! - **Key material**: [`KeyMaterial`] holds the opaque key bytes, zeroed on
//!   drop and never printed
//! - **Sources**: [`KeySource`] fetches the latest key version from Secret
//!   Manager or a local file
//! - **Cipher**: [`cipher::seal`] / [`cipher::open`] wrap a whole payload in a
//!   ChaCha20-Poly1305 envelope keyed from the key material

pub mod cipher;
pub mod security;
pub mod sources;

pub use cipher::{generate_key, open, seal, Cipher, CipherError, SealOptions};
pub use security::KeyMaterial;
pub use sources::{FileKeySource, KeySource, SecretError, SecretManagerSource};
