//! Zip archive construction.
//!
//! Compresses a source directory into a deflate zip so it can be sealed.
//! Entry names are relative to the source directory with forward slashes,
//! directories get their own `name/` entries, and entries are written in
//! sorted order so the same tree always produces the same entry list.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::Path;

use serde::Serialize;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::builder::relative_path;
use crate::error::{HashError, Result};
use crate::sealed::{seal_archive_with, SealResult, SealStrategy};

/// Summary of a freshly built archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveInfo {
    pub files: usize,
    pub directories: usize,
    pub size: u64,
}

/// Zips `source_dir` into `target_path`, creating parent directories.
pub fn create_archive(source_dir: &Path, target_path: &Path) -> Result<ArchiveInfo> {
    if !source_dir.is_dir() {
        return Err(HashError::Config(format!(
            "archive source is not a directory: {}",
            source_dir.display()
        )));
    }

    if let Some(parent) = target_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| HashError::io(parent, e))?;
        }
    }

    let target = File::create(target_path).map_err(|e| HashError::io(target_path, e))?;
    let mut zip = ZipWriter::new(BufWriter::new(target));
    let file_options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let dir_options = FileOptions::default().compression_method(CompressionMethod::Stored);

    let target_name = target_path.file_name();
    let target_canonical = target_path.canonicalize().ok();
    let mut files = 0;
    let mut directories = 0;

    for entry in WalkDir::new(source_dir)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1)
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source_dir).to_path_buf();
            HashError::traversal(path, io::Error::from(e))
        })?;

        let file_type = entry.file_type();

        // The target may live inside the source tree.
        if file_type.is_file()
            && Some(entry.file_name()) == target_name
            && entry.path().canonicalize().ok() == target_canonical
        {
            continue;
        }

        let name = relative_path(source_dir, entry.path())?;

        if file_type.is_dir() {
            zip.add_directory(format!("{name}/"), dir_options)?;
            directories += 1;
        } else if file_type.is_file() {
            zip.start_file(name.as_str(), file_options)?;
            let mut source =
                File::open(entry.path()).map_err(|e| HashError::traversal(entry.path(), e))?;
            io::copy(&mut source, &mut zip).map_err(|e| HashError::io(entry.path(), e))?;
            files += 1;
        } else {
            return Err(HashError::traversal(
                entry.path(),
                io::Error::new(io::ErrorKind::InvalidInput, "cannot archive this file type"),
            ));
        }

        tracing::debug!(entry = %name, "archived");
    }

    let mut writer = zip.finish()?;
    io::Write::flush(&mut writer).map_err(|e| HashError::io(target_path, e))?;
    drop(writer);

    let size = fs::metadata(target_path)
        .map_err(|e| HashError::io(target_path, e))?
        .len();

    tracing::info!(
        path = %target_path.display(),
        files,
        directories,
        size,
        "archive created"
    );

    Ok(ArchiveInfo {
        files,
        directories,
        size,
    })
}

/// Zips `source_dir` into `target_path` and seals the result.
pub fn pack_and_seal(
    source_dir: &Path,
    target_path: &Path,
    strategy: SealStrategy,
) -> Result<(ArchiveInfo, SealResult)> {
    let info = create_archive(source_dir, target_path)?;
    let seal = seal_archive_with(target_path, strategy)?;
    Ok((info, seal))
}
