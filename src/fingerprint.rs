//! Content fingerprints.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Bytes read per step while hashing. Files are never loaded whole.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// A 256-bit content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl From<[u8; 32]> for Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Computes a content fingerprint for a file.
pub trait Fingerprinter {
    fn fingerprint(&self, path: &Path) -> io::Result<Digest>;
}

/// BLAKE3 over the file contents, streamed in [`CHUNK_SIZE`] pieces.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Fingerprinter;

impl Fingerprinter for Blake3Fingerprinter {
    fn fingerprint(&self, path: &Path) -> io::Result<Digest> {
        let mut file = File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            let bytes_read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(Digest(*hasher.finalize().as_bytes()))
    }
}
