//! Whole-payload authenticated encryption
//!
//! A sealed payload is a single envelope:
//!
//! ```text
//! magic "BSL1" (4) | flags (1) | key id (8) | nonce (12) | ciphertext + tag (16)
//! ```
//!
//! The 25-byte header is the AEAD associated data, so changing any header
//! byte breaks authentication just like changing the ciphertext does. A
//! failure is reported as a key mismatch whenever the header's key id differs
//! from the supplied key's; a wrong key and an altered key id look the same.
//!
//! The key material is opaque. The 256-bit data key and the 8-byte key id are
//! both derived from the raw key bytes with HMAC-SHA256 under distinct labels,
//! so any secret string works as a key and the key id never reveals the key.

use crate::security::KeyMaterial;
use base64::{engine::general_purpose::URL_SAFE, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::io::{Read, Write};
use thiserror::Error;
use zeroize::Zeroizing;

/// Envelope magic and format version
pub const MAGIC: &[u8; 4] = b"BSL1";

/// Size of the key id in bytes
pub const KEY_ID_SIZE: usize = 8;

/// Size of the nonce in bytes (96 bits for ChaCha20-Poly1305)
pub const NONCE_SIZE: usize = 12;

/// Size of the Poly1305 tag in bytes
pub const TAG_SIZE: usize = 16;

/// magic + flags + key id + nonce
pub const HEADER_SIZE: usize = MAGIC.len() + 1 + KEY_ID_SIZE + NONCE_SIZE;

/// Flag bit: the plaintext was gzip-compressed before sealing
pub const FLAG_GZIP: u8 = 0b0000_0001;

const KNOWN_FLAGS: u8 = FLAG_GZIP;

/// Largest plaintext a compressed envelope may inflate to
pub const MAX_PLAINTEXT_SIZE: u64 = 1 << 30;

const DATA_KEY_LABEL: &[u8] = b"blobseal/v1/data-key";
const KEY_ID_LABEL: &[u8] = b"blobseal/v1/key-id";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// Authentication failed and the header names another key id, either
    /// because the key is wrong or because the key id bytes were altered
    #[error("key mismatch: payload was sealed with key {sealed_with}, supplied key is {supplied}")]
    KeyMismatch {
        sealed_with: String,
        supplied: String,
    },

    #[error("integrity check failed: payload or header was modified")]
    Integrity,

    #[error("key material is empty")]
    EmptyKey,

    #[error("encryption failed")]
    Seal,

    #[error("compression failed: {0}")]
    Compression(#[source] std::io::Error),
}

impl CipherError {
    /// True when the envelope could not be authenticated under the supplied key
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, CipherError::KeyMismatch { .. } | CipherError::Integrity)
    }
}

/// Options applied when sealing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SealOptions {
    /// Gzip the plaintext before encrypting it
    pub compress: bool,
}

impl SealOptions {
    pub fn compressed() -> Self {
        Self { compress: true }
    }
}

/// An AEAD instance bound to one key
pub struct Cipher {
    aead: ChaCha20Poly1305,
    key_id: [u8; KEY_ID_SIZE],
}

impl Cipher {
    /// Derive the data key and key id from opaque key material
    pub fn new(key: &KeyMaterial) -> Result<Self, CipherError> {
        if key.is_empty() {
            return Err(CipherError::EmptyKey);
        }

        let data_key = derive(key.as_bytes(), DATA_KEY_LABEL)?;
        let id_bytes = derive(key.as_bytes(), KEY_ID_LABEL)?;

        let mut key_id = [0u8; KEY_ID_SIZE];
        key_id.copy_from_slice(&id_bytes[..KEY_ID_SIZE]);

        Ok(Self {
            aead: ChaCha20Poly1305::new(Key::from_slice(&data_key[..])),
            key_id,
        })
    }

    /// Key id as lowercase hex
    pub fn key_id(&self) -> String {
        to_hex(&self.key_id)
    }

    /// Seal `plaintext` into a new envelope with a fresh random nonce
    pub fn seal(&self, plaintext: &[u8], options: SealOptions) -> Result<Vec<u8>, CipherError> {
        let (flags, body) = if options.compress {
            (FLAG_GZIP, Zeroizing::new(gzip(plaintext)?))
        } else {
            (0, Zeroizing::new(plaintext.to_vec()))
        };

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let mut envelope = Vec::with_capacity(HEADER_SIZE + body.len() + TAG_SIZE);
        envelope.extend_from_slice(MAGIC);
        envelope.push(flags);
        envelope.extend_from_slice(&self.key_id);
        envelope.extend_from_slice(&nonce_bytes);

        let ciphertext = self
            .aead
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: body.as_slice(),
                    aad: &envelope,
                },
            )
            .map_err(|_| CipherError::Seal)?;

        envelope.extend_from_slice(&ciphertext);
        Ok(envelope)
    }

    /// Authenticate and decrypt an envelope
    pub fn open(&self, envelope: &[u8]) -> Result<Vec<u8>, CipherError> {
        if envelope.len() < HEADER_SIZE + TAG_SIZE {
            return Err(CipherError::Malformed(format!(
                "{} bytes is shorter than the {}-byte minimum",
                envelope.len(),
                HEADER_SIZE + TAG_SIZE
            )));
        }

        let (header, ciphertext) = envelope.split_at(HEADER_SIZE);
        if &header[..MAGIC.len()] != MAGIC {
            return Err(CipherError::Integrity);
        }

        let flags = header[MAGIC.len()];
        let key_id_start = MAGIC.len() + 1;
        let sealed_with = &header[key_id_start..key_id_start + KEY_ID_SIZE];
        let nonce = &header[key_id_start + KEY_ID_SIZE..];

        let body = self
            .aead
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: header,
                },
            )
            .map_err(|_| {
                if sealed_with != self.key_id {
                    CipherError::KeyMismatch {
                        sealed_with: to_hex(sealed_with),
                        supplied: self.key_id(),
                    }
                } else {
                    CipherError::Integrity
                }
            })?;
        let body = Zeroizing::new(body);

        if flags & !KNOWN_FLAGS != 0 {
            return Err(CipherError::Malformed(format!(
                "unsupported flags {:#04x}",
                flags
            )));
        }

        if flags & FLAG_GZIP != 0 {
            gunzip(&body, MAX_PLAINTEXT_SIZE)
        } else {
            Ok(body.to_vec())
        }
    }
}

/// Seal `plaintext` under `key`
pub fn seal(
    plaintext: &[u8],
    key: &KeyMaterial,
    options: SealOptions,
) -> Result<Vec<u8>, CipherError> {
    Cipher::new(key)?.seal(plaintext, options)
}

/// Open an envelope sealed under `key`
pub fn open(envelope: &[u8], key: &KeyMaterial) -> Result<Vec<u8>, CipherError> {
    Cipher::new(key)?.open(envelope)
}

/// Generate fresh key material: 32 random bytes as URL-safe base64
pub fn generate_key() -> String {
    let mut bytes = Zeroizing::new([0u8; 32]);
    rand::rng().fill_bytes(&mut bytes[..]);
    URL_SAFE.encode(&bytes[..])
}

fn derive(key: &[u8], label: &[u8]) -> Result<Zeroizing<[u8; 32]>, CipherError> {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| CipherError::EmptyKey)?;
    mac.update(label);

    let mut out = Zeroizing::new([0u8; 32]);
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

fn gzip(data: &[u8]) -> Result<Vec<u8>, CipherError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(CipherError::Compression)?;
    encoder.finish().map_err(CipherError::Compression)
}

fn gunzip(data: &[u8], limit: u64) -> Result<Vec<u8>, CipherError> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .take(limit + 1)
        .read_to_end(&mut out)
        .map_err(CipherError::Compression)?;

    if out.len() as u64 > limit {
        return Err(CipherError::Malformed(format!(
            "compressed payload inflates past {} bytes",
            limit
        )));
    }
    Ok(out)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
