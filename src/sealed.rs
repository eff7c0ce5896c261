//! Archive trust seals.
//!
//! A seal is a trailer appended after the archive's own end record:
//!
//! ```text
//! [archive bytes][i32 LE: N][N bytes: SHA-256 of archive bytes]
//! ```
//!
//! Zip readers locate their central directory by scanning back from the end,
//! so a sealed archive still opens normally. Only a reader that knows to look
//! at `size - 4 - N .. size` finds the seal.
//!
//! Sealing is not idempotent. A second seal hashes the first trailer too and
//! nests a new one after it, so every archive must be sealed exactly once.
//!
//! The default in-place append is not atomic: if interrupted after the length
//! field is written, the archive ends with a truncated trailer. Use
//! [`SealStrategy::AtomicCopy`] where that matters.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::crypto::{sha256_reader, DIGEST_LEN};
use crate::error::{HashError, Result};

/// Byte width of the trailer's length field.
pub const LENGTH_FIELD_SIZE: u64 = 4;

/// Total bytes a seal adds to an archive.
pub const TRAILER_SIZE: u64 = LENGTH_FIELD_SIZE + DIGEST_LEN as u64;

/// How the trailer reaches the archive on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SealStrategy {
    /// Append to the archive in place.
    #[default]
    InPlace,
    /// Write archive plus trailer to a temporary file in the same directory,
    /// then rename it over the archive.
    AtomicCopy,
}

/// Sizes reported after a seal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SealResult {
    pub original_size: u64,
    pub digest_length: i32,
    pub final_size: u64,
}

/// A trailer read back from a sealed archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTrustSeal {
    pub length: i32,
    pub digest: [u8; DIGEST_LEN],
    /// Size of the archive bytes the digest covers.
    pub payload_len: u64,
}

/// Appends a trust seal to the archive at `archive_path`, in place.
pub fn seal_archive(archive_path: &Path) -> Result<SealResult> {
    seal_archive_with(archive_path, SealStrategy::InPlace)
}

/// Appends a trust seal to the archive at `archive_path` using `strategy`.
pub fn seal_archive_with(archive_path: &Path, strategy: SealStrategy) -> Result<SealResult> {
    let io_err = |e| HashError::io(archive_path, e);

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(archive_path)
        .map_err(io_err)?;
    let original_size = file.metadata().map_err(io_err)?.len();

    let digest = sha256_reader(&mut file).map_err(io_err)?;
    let trailer = encode_trailer(&digest);

    let final_size = match strategy {
        SealStrategy::InPlace => append_trailer(file, &trailer).map_err(io_err)?,
        SealStrategy::AtomicCopy => {
            let permissions = file.metadata().map_err(io_err)?.permissions();
            drop(file);
            write_sealed_copy(archive_path, original_size, &trailer, permissions)?
        }
    };

    tracing::info!(
        path = %archive_path.display(),
        original_size,
        digest_length = DIGEST_LEN,
        final_size,
        "archive sealed"
    );

    Ok(SealResult {
        original_size,
        digest_length: DIGEST_LEN as i32,
        final_size,
    })
}

/// Reads the trust seal at the end of `archive_path`.
pub fn read_trailer(archive_path: &Path) -> Result<ArchiveTrustSeal> {
    let io_err = |e| HashError::io(archive_path, e);

    let mut file = File::open(archive_path).map_err(io_err)?;
    let size = file.metadata().map_err(io_err)?.len();
    if size < TRAILER_SIZE {
        return Err(HashError::SealMalformed {
            reason: format!("file is {size} bytes, shorter than a {TRAILER_SIZE}-byte trailer"),
        });
    }

    let payload_len = size - TRAILER_SIZE;
    file.seek(SeekFrom::Start(payload_len)).map_err(io_err)?;

    let mut length_field = [0u8; LENGTH_FIELD_SIZE as usize];
    file.read_exact(&mut length_field).map_err(io_err)?;
    let length = i32::from_le_bytes(length_field);
    if length != DIGEST_LEN as i32 {
        return Err(HashError::SealMalformed {
            reason: format!("trailer declares a {length}-byte digest, expected {DIGEST_LEN}"),
        });
    }

    let mut digest = [0u8; DIGEST_LEN];
    file.read_exact(&mut digest).map_err(io_err)?;

    Ok(ArchiveTrustSeal {
        length,
        digest,
        payload_len,
    })
}

fn encode_trailer(digest: &[u8; DIGEST_LEN]) -> Vec<u8> {
    let mut trailer = Vec::with_capacity(TRAILER_SIZE as usize);
    trailer.extend_from_slice(&(DIGEST_LEN as i32).to_le_bytes());
    trailer.extend_from_slice(digest);
    trailer
}

fn append_trailer(mut file: File, trailer: &[u8]) -> io::Result<u64> {
    file.seek(SeekFrom::End(0))?;
    file.write_all(trailer)?;
    file.sync_all()?;
    Ok(file.metadata()?.len())
}

/// Copies the first `original_size` bytes of the archive plus `trailer` into a
/// temporary sibling and renames it over the archive.
fn write_sealed_copy(
    archive_path: &Path,
    original_size: u64,
    trailer: &[u8],
    permissions: fs::Permissions,
) -> Result<u64> {
    let io_err = |e| HashError::io(archive_path, e);

    let dir = match archive_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    {
        let source = File::open(archive_path).map_err(io_err)?;
        let copied = io::copy(&mut source.take(original_size), tmp.as_file_mut()).map_err(io_err)?;
        if copied != original_size {
            return Err(io_err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "archive shrank while it was being sealed",
            )));
        }
    }

    tmp.write_all(trailer).map_err(io_err)?;
    tmp.as_file().set_permissions(permissions).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    let final_size = tmp.as_file().metadata().map_err(io_err)?.len();

    tmp.persist(archive_path)
        .map_err(|e| HashError::io(archive_path, e.error))?;

    Ok(final_size)
}
