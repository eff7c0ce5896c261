//! Trust-seal verification.
//!
//! Recovers the trailer of a sealed archive and recomputes the digest over
//! the bytes it covers.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Serialize;

use crate::crypto::{encode_digest, sha256_reader};
use crate::error::{HashError, Result};
use crate::sealed::read_trailer;

/// Result of a successful seal check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SealVerification {
    pub payload_size: u64,
    pub digest_length: i32,
    /// Base64 text of the verified digest.
    pub digest: String,
}

/// Verifies the trust seal of the archive at `archive_path`.
///
/// Fails with [`HashError::SealMismatch`] when the archive bytes no longer
/// hash to the digest stored in the trailer.
pub fn verify_sealed_archive(archive_path: &Path) -> Result<SealVerification> {
    let seal = read_trailer(archive_path)?;

    let file = File::open(archive_path).map_err(|e| HashError::io(archive_path, e))?;
    let computed =
        sha256_reader(file.take(seal.payload_len)).map_err(|e| HashError::io(archive_path, e))?;

    if computed != seal.digest {
        tracing::warn!(path = %archive_path.display(), "trust seal mismatch");
        return Err(HashError::SealMismatch);
    }

    tracing::debug!(path = %archive_path.display(), "trust seal verified");

    Ok(SealVerification {
        payload_size: seal.payload_len,
        digest_length: seal.length,
        digest: encode_digest(&seal.digest),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sha256_base64;
    use crate::sealed::seal_archive;
    use std::fs::{self, OpenOptions};
    use std::io::{Seek, SeekFrom, Write};

    #[test]
    fn test_verify_fresh_seal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.zip");
        fs::write(&path, b"archive body").unwrap();
        seal_archive(&path).unwrap();

        let verification = verify_sealed_archive(&path).unwrap();
        assert_eq!(verification.payload_size, 12);
        assert_eq!(verification.digest_length, 32);
        assert_eq!(verification.digest, sha256_base64(b"archive body"));
    }

    #[test]
    fn test_verify_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.zip");
        fs::write(&path, b"archive body").unwrap();
        seal_archive(&path).unwrap();

        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.write_all(b"A").unwrap();
        drop(file);

        assert!(matches!(
            verify_sealed_archive(&path),
            Err(HashError::SealMismatch)
        ));
    }

    #[test]
    fn test_verify_unsealed_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.zip");
        fs::write(&path, vec![0xAB; 200]).unwrap();

        assert!(matches!(
            verify_sealed_archive(&path),
            Err(HashError::SealMalformed { .. })
        ));
    }
}
