//! Digest primitive.
//!
//! SHA-256 over byte slices and readers. Digest text is standard base64 with
//! padding; the manifest format depends on that encoding never changing.

use std::io::{self, Read};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};

/// Byte length of every digest this crate produces.
pub const DIGEST_LEN: usize = 32;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Computes SHA-256 hash of data and returns raw bytes.
pub fn sha256_bytes(data: &[u8]) -> [u8; DIGEST_LEN] {
    Sha256::digest(data).into()
}

/// Computes SHA-256 hash of data and returns base64-encoded string.
pub fn sha256_base64(data: &[u8]) -> String {
    encode_digest(&sha256_bytes(data))
}

/// Computes SHA-256 hash of everything `reader` yields until EOF.
///
/// A read error aborts the whole computation; no partial digest is returned.
pub fn sha256_reader<R: Read>(reader: R) -> io::Result<[u8; DIGEST_LEN]> {
    let mut hasher = StreamHasher::new();
    hasher.update_reader(reader)?;
    Ok(hasher.finalize())
}

/// Incremental SHA-256 over any sequence of slices and readers.
///
/// Feeding the same bytes in any chunking yields the same digest.
#[derive(Clone, Default)]
pub struct StreamHasher {
    inner: Sha256,
}

impl StreamHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Feeds `reader` to EOF and returns the number of bytes consumed.
    pub fn update_reader<R: Read>(&mut self, mut reader: R) -> io::Result<u64> {
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        let mut total = 0u64;

        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.inner.update(&buffer[..read]);
            total += read as u64;
        }

        Ok(total)
    }

    pub fn finalize(self) -> [u8; DIGEST_LEN] {
        self.inner.finalize().into()
    }
}

/// Encodes a digest as the manifest text form.
pub fn encode_digest(digest: &[u8]) -> String {
    BASE64.encode(digest)
}
