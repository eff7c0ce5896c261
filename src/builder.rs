//! Manifest construction.
//!
//! Walks a root directory depth-first and hashes every eligible entry. The
//! walk threads an explicit accumulator through each step and stops at the
//! first entry it cannot stat, open or read: an incomplete manifest is worse
//! than none, so nothing is written unless the whole walk succeeds.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use walkdir::{DirEntry, WalkDir};

use crate::classifier::{normalize_separators, PathClassifier};
use crate::config::ManifestConfig;
use crate::crypto::{sha256_reader, StreamHasher, DIGEST_LEN};
use crate::error::{HashError, Result};
use crate::manifest::{EntryKind, Manifest, ManifestEntry};

/// Counters collected while building a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStats {
    pub files_hashed: usize,
    pub directories_hashed: usize,
    pub bytes_hashed: u64,
    pub entries_excluded: usize,
}

/// State threaded through the walk.
#[derive(Debug, Default)]
struct Accumulator {
    manifest: Manifest,
    stats: BuildStats,
}

/// Builds manifests for one root under one exclusion policy.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    root: PathBuf,
    classifier: PathClassifier,
}

impl ManifestBuilder {
    pub fn new(root: impl Into<PathBuf>, classifier: PathClassifier) -> Self {
        Self {
            root: root.into(),
            classifier,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walks the root and returns the finished manifest with its counters.
    pub fn build(&self) -> Result<(Manifest, BuildStats)> {
        let metadata =
            fs::metadata(&self.root).map_err(|e| HashError::traversal(&self.root, e))?;
        if !metadata.is_dir() {
            return Err(HashError::traversal(
                &self.root,
                io::Error::new(io::ErrorKind::InvalidInput, "manifest root is not a directory"),
            ));
        }

        let acc = walker(&self.root)
            .into_iter()
            .try_fold(Accumulator::default(), |acc, entry| {
                let entry = entry.map_err(|e| walk_error(&self.root, e))?;
                self.visit(acc, &entry)
            })?;

        tracing::info!(
            root = %self.root.display(),
            files = acc.stats.files_hashed,
            directories = acc.stats.directories_hashed,
            bytes = acc.stats.bytes_hashed,
            excluded = acc.stats.entries_excluded,
            "manifest built"
        );

        Ok((acc.manifest, acc.stats))
    }

    /// One traversal step: classify `entry` and fold it into `acc`.
    fn visit(&self, mut acc: Accumulator, entry: &DirEntry) -> Result<Accumulator> {
        if entry.depth() == 0 {
            return Ok(acc);
        }

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            return Err(symlink_error(entry.path()));
        }

        let relative = relative_path(&self.root, entry.path())?;
        let is_directory = file_type.is_dir();

        if !self.classifier.is_eligible(&relative, is_directory) {
            if !is_directory || self.classifier.includes_directories() {
                tracing::debug!(path = %relative, "excluded");
                acc.stats.entries_excluded += 1;
            }
            return Ok(acc);
        }

        if is_directory {
            let digest = self.digest_subtree(entry.path())?;
            tracing::debug!(path = %relative, "hashed directory");
            acc.manifest
                .insert(ManifestEntry::new(relative, EntryKind::Directory, digest));
            acc.stats.directories_hashed += 1;
        } else if file_type.is_file() {
            let (digest, size) = hash_file(entry.path())?;
            tracing::debug!(path = %relative, size, "hashed file");
            acc.manifest
                .insert(ManifestEntry::new(relative, EntryKind::File, digest));
            acc.stats.files_hashed += 1;
            acc.stats.bytes_hashed += size;
        } else {
            return Err(HashError::traversal(
                entry.path(),
                io::Error::new(io::ErrorKind::InvalidInput, "unsupported file type"),
            ));
        }

        Ok(acc)
    }

    /// Folds every eligible file below `dir` into one digest.
    ///
    /// Per file, in sorted traversal order: name relative to `dir`, a zero
    /// byte, the size as little-endian u64, then the content.
    fn digest_subtree(&self, dir: &Path) -> Result<[u8; DIGEST_LEN]> {
        let mut hasher = StreamHasher::new();

        for entry in walker(dir).min_depth(1) {
            let entry = entry.map_err(|e| walk_error(dir, e))?;
            let file_type = entry.file_type();
            if file_type.is_symlink() {
                return Err(symlink_error(entry.path()));
            }
            if !file_type.is_file() {
                continue;
            }

            let from_root = relative_path(&self.root, entry.path())?;
            if !self.classifier.is_eligible(&from_root, false) {
                continue;
            }

            let name = relative_path(dir, entry.path())?;
            let size = entry
                .metadata()
                .map_err(|e| walk_error(entry.path(), e))?
                .len();
            let file = File::open(entry.path()).map_err(|e| HashError::traversal(entry.path(), e))?;

            hasher.update(name.as_bytes());
            hasher.update(&[0]);
            hasher.update(&size.to_le_bytes());
            hasher
                .update_reader(file)
                .map_err(|e| HashError::io(entry.path(), e))?;
        }

        Ok(hasher.finalize())
    }
}

/// Builds the manifest for `root` using `classifier`.
pub fn build_manifest(root: &Path, classifier: &PathClassifier) -> Result<Manifest> {
    ManifestBuilder::new(root, classifier.clone())
        .build()
        .map(|(manifest, _)| manifest)
}

/// Outcome of a full generate run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSummary {
    pub manifest_path: PathBuf,
    pub entries: usize,
    #[serde(flatten)]
    pub stats: BuildStats,
}

/// Builds the manifest described by `config` and writes it under the root.
pub fn generate(config: &ManifestConfig) -> Result<GenerateSummary> {
    let builder = ManifestBuilder::new(&config.root, config.classifier());
    let (manifest, stats) = builder.build()?;

    let manifest_path = config.output_path();
    manifest.write(&manifest_path)?;

    Ok(GenerateSummary {
        manifest_path,
        entries: manifest.len(),
        stats,
    })
}

/// Canonical relative path of `path` below `root`: forward slashes only.
pub fn relative_path(root: &Path, path: &Path) -> Result<String> {
    let stripped = path.strip_prefix(root).map_err(|_| {
        HashError::traversal(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "path is outside the manifest root"),
        )
    })?;

    let mut parts = Vec::new();
    for component in stripped.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    HashError::traversal(
                        path,
                        io::Error::new(io::ErrorKind::InvalidData, "path is not valid UTF-8"),
                    )
                })?;
                parts.push(part);
            }
            Component::CurDir => {}
            _ => {
                return Err(HashError::traversal(
                    path,
                    io::Error::new(io::ErrorKind::InvalidInput, "unexpected path component"),
                ))
            }
        }
    }

    Ok(normalize_separators(&parts.join("/")))
}

fn walker(root: &Path) -> WalkDir {
    WalkDir::new(root).follow_links(false).sort_by_file_name()
}

fn hash_file(path: &Path) -> Result<([u8; DIGEST_LEN], u64)> {
    let file = File::open(path).map_err(|e| HashError::traversal(path, e))?;
    let size = file
        .metadata()
        .map_err(|e| HashError::traversal(path, e))?
        .len();
    let digest = sha256_reader(file).map_err(|e| HashError::io(path, e))?;
    Ok((digest, size))
}

fn walk_error(fallback: &Path, err: walkdir::Error) -> HashError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| fallback.to_path_buf());
    HashError::traversal(path, io::Error::from(err))
}

fn symlink_error(path: &Path) -> HashError {
    HashError::traversal(
        path,
        io::Error::new(io::ErrorKind::InvalidInput, "symbolic links are not followed"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{encode_digest, sha256_bytes};
    use crate::manifest::{parse_line, MANIFEST_FILE_NAME};
    use std::fs;
    use tempfile::TempDir;

    fn tree(files: &[(&str, &[u8])]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(full, content).unwrap();
        }
        dir
    }

    fn classifier() -> PathClassifier {
        PathClassifier::new(MANIFEST_FILE_NAME, Some("treeseal".to_string()))
    }

    #[test]
    fn test_build_hashes_nested_files() {
        let dir = tree(&[
            ("hello.txt", b"hello"),
            ("lib/core.dll", b"\x00\x01\x02"),
            ("lib/deep/data.bin", b""),
        ]);

        let (manifest, stats) = ManifestBuilder::new(dir.path(), classifier()).build().unwrap();

        assert_eq!(manifest.len(), 3);
        assert_eq!(stats.files_hashed, 3);
        assert_eq!(stats.directories_hashed, 0);
        assert_eq!(stats.bytes_hashed, 8);

        let hello = manifest.get("hello.txt").unwrap();
        assert_eq!(
            encode_digest(&hello.content_digest),
            "LPJNul+wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ="
        );
        assert_eq!(hello.path_digest, sha256_bytes(b"hello.txt"));

        let empty = manifest.get("lib/deep/data.bin").unwrap();
        assert_eq!(
            encode_digest(&empty.content_digest),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn test_relative_paths_use_forward_slashes() {
        let dir = tree(&[("a/b/c.txt", b"c")]);
        let manifest = build_manifest(dir.path(), &classifier()).unwrap();
        let entry = manifest.entries().next().unwrap();
        assert_eq!(entry.relative_path, "a/b/c.txt");
        assert_eq!(entry.path_digest, sha256_bytes(b"a/b/c.txt"));
    }

    #[test]
    fn test_relative_path_normalizes_backslashes() {
        let root = Path::new("root");
        let path = Path::new("root").join("dir\\sub").join("file.txt");
        assert_eq!(relative_path(root, &path).unwrap(), "dir/sub/file.txt");
    }

    #[test]
    fn test_relative_path_outside_root_fails() {
        let result = relative_path(Path::new("/srv/a"), Path::new("/srv/b/file"));
        assert!(matches!(result, Err(HashError::Traversal { .. })));
    }

    #[test]
    fn test_excluded_files_never_appear() {
        let dir = tree(&[
            (MANIFEST_FILE_NAME, b"old manifest"),
            ("treeseal", b"binary"),
            ("treeseal.toml", b"kept"),
            ("app.bin", b"app"),
        ]);

        let (manifest, stats) = ManifestBuilder::new(dir.path(), classifier()).build().unwrap();

        assert!(!manifest.contains(MANIFEST_FILE_NAME));
        assert!(!manifest.contains("treeseal"));
        assert!(manifest.contains("treeseal.toml"));
        assert!(manifest.contains("app.bin"));
        assert_eq!(stats.entries_excluded, 2);
    }

    #[test]
    fn test_excluded_directory_is_still_descended() {
        let dir = tree(&[("treeseal/inner.txt", b"inner")]);
        let manifest = build_manifest(dir.path(), &classifier().with_directories(true)).unwrap();
        assert!(!manifest.contains("treeseal"));
        assert!(manifest.contains("treeseal/inner.txt"));
    }

    #[test]
    fn test_tree_of_only_excluded_files_is_empty() {
        let dir = tree(&[(MANIFEST_FILE_NAME, b"x"), ("treeseal", b"y")]);
        let config = ManifestConfig::new(dir.path()).with_executable("treeseal");
        let summary = generate(&config).unwrap();

        assert_eq!(summary.entries, 0);
        assert_eq!(fs::read_to_string(config.output_path()).unwrap(), "");
    }

    #[test]
    fn test_generate_is_deterministic() {
        let dir = tree(&[
            ("z.txt", b"z"),
            ("a.txt", b"a"),
            ("m/n/o.txt", b"o"),
            ("m/p.txt", b"p"),
        ]);
        let config = ManifestConfig::new(dir.path());

        generate(&config).unwrap();
        let first = fs::read(config.output_path()).unwrap();
        generate(&config).unwrap();
        let second = fs::read(config.output_path()).unwrap();

        assert_eq!(first, second);
        let text = String::from_utf8(first).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert!(text.lines().all(|line| parse_line(line).is_some()));
    }

    #[test]
    fn test_directory_mode_emits_subtree_digest() {
        let dir = tree(&[("assets/a.txt", b"aa"), ("assets/b/c.txt", b"c")]);
        let manifest = build_manifest(dir.path(), &classifier().with_directories(true)).unwrap();

        let mut expected = StreamHasher::new();
        for (name, content) in [("a.txt", &b"aa"[..]), ("b/c.txt", &b"c"[..])] {
            expected.update(name.as_bytes());
            expected.update(&[0]);
            expected.update(&(content.len() as u64).to_le_bytes());
            expected.update(content);
        }

        let entry = manifest.get("assets").unwrap();
        assert_eq!(entry.kind, EntryKind::Directory);
        assert_eq!(entry.content_digest, expected.finalize());
        assert!(manifest.contains("assets/b"));
        assert!(manifest.contains("assets/a.txt"));
    }

    #[test]
    fn test_directory_mode_off_by_default() {
        let dir = tree(&[("assets/a.txt", b"aa")]);
        let manifest = build_manifest(dir.path(), &classifier()).unwrap();
        assert!(!manifest.contains("assets"));
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = build_manifest(&dir.path().join("absent"), &classifier());
        assert!(matches!(result, Err(HashError::Traversal { .. })));
    }

    #[test]
    fn test_file_root_fails() {
        let dir = tree(&[("file.txt", b"x")]);
        let result = build_manifest(&dir.path().join("file.txt"), &classifier());
        assert!(matches!(result, Err(HashError::Traversal { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_aborts_build() {
        let dir = tree(&[("target.txt", b"t")]);
        std::os::unix::fs::symlink(dir.path().join("target.txt"), dir.path().join("link.txt"))
            .unwrap();

        match build_manifest(dir.path(), &classifier()) {
            Err(HashError::Traversal { path, .. }) => assert!(path.ends_with("link.txt")),
            other => panic!("expected traversal failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_leaves_manifest_untouched() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tree(&[
            (MANIFEST_FILE_NAME, b"previous run\n"),
            ("ok.txt", b"ok"),
            ("secret.txt", b"secret"),
        ]);
        let secret = dir.path().join("secret.txt");
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users ignore file modes.
        if File::open(&secret).is_ok() {
            return;
        }

        let config = ManifestConfig::new(dir.path());
        let result = generate(&config);

        fs::set_permissions(&secret, fs::Permissions::from_mode(0o644)).unwrap();
        assert!(matches!(result, Err(HashError::Traversal { .. })));
        assert_eq!(
            fs::read_to_string(config.output_path()).unwrap(),
            "previous run\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_name_aborts_build() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tree(&[(MANIFEST_FILE_NAME, b"previous run\n"), ("ok.txt", b"ok")]);
        let bad_name = OsStr::from_bytes(b"bad\xff");

        // Some filesystems only accept UTF-8 names.
        if fs::write(dir.path().join(bad_name), b"bad").is_err() {
            return;
        }

        match build_manifest(dir.path(), &classifier()) {
            Err(HashError::Traversal { path, .. }) => {
                assert_eq!(path.file_name(), Some(bad_name))
            }
            other => panic!("expected traversal failure, got {other:?}"),
        }

        let config = ManifestConfig::new(dir.path());
        assert!(matches!(generate(&config), Err(HashError::Traversal { .. })));
        assert_eq!(
            fs::read_to_string(config.output_path()).unwrap(),
            "previous run\n"
        );
    }
}
