//! Symmetric key management and the encryption capability.
//!
//! A key file holds the url-safe base64 text of a 32-byte key (the Fernet key
//! format). The first run that needs a key creates and persists it, even in
//! dry-run mode: regenerating a different key between a preview and the real
//! run would be far worse than writing one small file early.
//!
//! Two stores exist. [`FernetKeyStore`] (cargo feature `fernet`, on by default)
//! can create keys and encrypt. [`RawKeyStore`] can only create keys; it is
//! what a build without the `fernet` feature gets, and the CLI refuses
//! `--encrypt` with it.

use crate::output::OutputFormatter;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Length of the raw key in bytes.
pub const RAW_KEY_LEN: usize = 32;

/// Errors raised by key stores.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("Failed to access key file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid key in {}: {reason}", path.display())]
    InvalidKey { path: PathBuf, reason: String },
    #[error("Failed to generate random key material: {0}")]
    Randomness(String),
    #[error("Encryption requested but this build has no cipher (enable the 'fernet' feature)")]
    EncryptionUnavailable,
    #[error("Invalid key material: {0}")]
    BadKey(String),
    #[error("Decryption failed: ciphertext is corrupt or was made with another key")]
    DecryptionFailed,
}

/// Result type for key store operations.
pub type KeyStoreResult<T> = Result<T, KeyStoreError>;

/// Encoded key bytes as stored in the key file.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial(String);

impl KeyMaterial {
    /// Validates that `encoded` is url-safe base64 of exactly [`RAW_KEY_LEN`] bytes.
    pub fn from_encoded(encoded: &str) -> Result<Self, String> {
        let encoded = encoded.trim();
        let raw = URL_SAFE
            .decode(encoded)
            .map_err(|e| format!("not url-safe base64: {}", e))?;
        if raw.len() != RAW_KEY_LEN {
            return Err(format!(
                "expected {} key bytes, found {}",
                RAW_KEY_LEN,
                raw.len()
            ));
        }
        Ok(Self(encoded.to_string()))
    }

    fn from_raw(raw: &[u8; RAW_KEY_LEN]) -> Self {
        Self(URL_SAFE.encode(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyMaterial(<redacted>)")
    }
}

/// A source of keys and, optionally, a cipher.
pub trait KeyStore {
    /// Short name for messages.
    fn name(&self) -> &'static str;

    /// Whether [`encrypt`](Self::encrypt) can succeed.
    fn can_encrypt(&self) -> bool;

    /// Creates fresh key material.
    fn generate_key(&self) -> KeyStoreResult<KeyMaterial>;

    /// Encrypts `plaintext` as one unit.
    fn encrypt(&self, plaintext: &[u8], key: &KeyMaterial) -> KeyStoreResult<Vec<u8>>;

    /// Inverse of [`encrypt`](Self::encrypt).
    fn decrypt(&self, ciphertext: &[u8], key: &KeyMaterial) -> KeyStoreResult<Vec<u8>>;

    /// Reads the key at `key_file`, or creates and persists a new one there.
    fn load_or_create(&self, key_file: &Path) -> KeyStoreResult<KeyMaterial> {
        match fs::read_to_string(key_file) {
            Ok(content) => {
                return KeyMaterial::from_encoded(&content).map_err(|reason| {
                    KeyStoreError::InvalidKey {
                        path: key_file.to_path_buf(),
                        reason,
                    }
                });
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(KeyStoreError::Io {
                    path: key_file.to_path_buf(),
                    source,
                });
            }
        }

        let key = self.generate_key()?;
        persist_key(key_file, &key)?;
        OutputFormatter::info(&format!(
            "Wrote {} key file: {}",
            self.name(),
            key_file.display()
        ));
        Ok(key)
    }
}

fn persist_key(key_file: &Path, key: &KeyMaterial) -> KeyStoreResult<()> {
    let io_err = |source| KeyStoreError::Io {
        path: key_file.to_path_buf(),
        source,
    };

    if let Some(parent) = key_file.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(key_file)
        .map_err(io_err)?;
    file.write_all(key.as_bytes()).map_err(io_err)?;
    file.sync_all().map_err(io_err)
}

/// Keys and Fernet tokens from the `fernet` crate.
#[cfg(feature = "fernet")]
#[derive(Debug, Clone, Copy, Default)]
pub struct FernetKeyStore;

#[cfg(feature = "fernet")]
impl FernetKeyStore {
    fn cipher(key: &KeyMaterial) -> KeyStoreResult<fernet::Fernet> {
        fernet::Fernet::new(key.as_str())
            .ok_or_else(|| KeyStoreError::BadKey("rejected by Fernet".to_string()))
    }
}

#[cfg(feature = "fernet")]
impl KeyStore for FernetKeyStore {
    fn name(&self) -> &'static str {
        "fernet"
    }

    fn can_encrypt(&self) -> bool {
        true
    }

    fn generate_key(&self) -> KeyStoreResult<KeyMaterial> {
        KeyMaterial::from_encoded(&fernet::Fernet::generate_key()).map_err(KeyStoreError::BadKey)
    }

    fn encrypt(&self, plaintext: &[u8], key: &KeyMaterial) -> KeyStoreResult<Vec<u8>> {
        Ok(Self::cipher(key)?.encrypt(plaintext).into_bytes())
    }

    fn decrypt(&self, ciphertext: &[u8], key: &KeyMaterial) -> KeyStoreResult<Vec<u8>> {
        let token = std::str::from_utf8(ciphertext).map_err(|_| KeyStoreError::DecryptionFailed)?;
        Self::cipher(key)?
            .decrypt(token)
            .map_err(|_| KeyStoreError::DecryptionFailed)
    }
}

/// Fallback store: random key bytes from the OS, no cipher.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawKeyStore;

impl KeyStore for RawKeyStore {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn can_encrypt(&self) -> bool {
        false
    }

    fn generate_key(&self) -> KeyStoreResult<KeyMaterial> {
        let mut raw = [0u8; RAW_KEY_LEN];
        getrandom::getrandom(&mut raw).map_err(|e| KeyStoreError::Randomness(e.to_string()))?;
        Ok(KeyMaterial::from_raw(&raw))
    }

    fn encrypt(&self, _plaintext: &[u8], _key: &KeyMaterial) -> KeyStoreResult<Vec<u8>> {
        Err(KeyStoreError::EncryptionUnavailable)
    }

    fn decrypt(&self, _ciphertext: &[u8], _key: &KeyMaterial) -> KeyStoreResult<Vec<u8>> {
        Err(KeyStoreError::EncryptionUnavailable)
    }
}

/// Picks the best store compiled into this build.
#[cfg(feature = "fernet")]
pub fn select_key_store() -> Box<dyn KeyStore> {
    Box::new(FernetKeyStore)
}

/// Picks the best store compiled into this build.
#[cfg(not(feature = "fernet"))]
pub fn select_key_store() -> Box<dyn KeyStore> {
    Box::new(RawKeyStore)
}
