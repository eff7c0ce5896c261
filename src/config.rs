//! Run configuration.
//!
//! Resolves the manifest root and the exclusion names from whatever the caller
//! supplied, falling back to the location of the running executable.

use std::env;
use std::path::{Path, PathBuf};

use crate::builder::relative_path;
use crate::classifier::{canonical_relative_name, PathClassifier};
use crate::error::{HashError, Result};
use crate::manifest::MANIFEST_FILE_NAME;

/// Default directory for archives built by `pack`.
pub const DEFAULT_ARCHIVE_OUTPUT_DIR: &str = ".";

/// Settings for one manifest generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestConfig {
    pub root: PathBuf,
    pub output_name: String,
    pub executable_name: Option<String>,
    pub hash_directories: bool,
}

impl ManifestConfig {
    /// Config for `root` that excludes nothing but the manifest itself.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output_name: MANIFEST_FILE_NAME.to_string(),
            executable_name: None,
            hash_directories: false,
        }
    }

    /// Resolves a config the way the command line does.
    ///
    /// A missing `root` means the directory holding the running executable.
    /// The executable is always excluded: by its root-relative path when it
    /// lives under the root, otherwise by its bare file name.
    pub fn resolve(root: Option<PathBuf>, output_name: Option<String>) -> Result<Self> {
        let exe = env::current_exe()
            .map_err(|e| HashError::Config(format!("cannot locate running executable: {e}")))?;

        let root = match root {
            Some(root) => root,
            None => exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| HashError::Config("executable has no parent directory".into()))?,
        };

        let output_name = match output_name {
            Some(name) => validate_output_name(&name)?,
            None => MANIFEST_FILE_NAME.to_string(),
        };

        Ok(Self {
            executable_name: executable_exclusion(&root, &exe),
            root,
            output_name,
            hash_directories: false,
        })
    }

    pub fn with_executable(mut self, name: impl Into<String>) -> Self {
        self.executable_name = Some(name.into());
        self
    }

    pub fn with_directories(mut self, enabled: bool) -> Self {
        self.hash_directories = enabled;
        self
    }

    /// Absolute location of the manifest file.
    pub fn output_path(&self) -> PathBuf {
        self.root.join(&self.output_name)
    }

    pub fn classifier(&self) -> PathClassifier {
        PathClassifier::new(self.output_name.clone(), self.executable_name.clone())
            .with_directories(self.hash_directories)
    }
}

/// Name under which the executable at `exe` would appear in a manifest of `root`.
pub fn executable_exclusion(root: &Path, exe: &Path) -> Option<String> {
    let canonical_root = root.canonicalize().ok();
    let canonical_exe = exe.canonicalize().ok();

    if let (Some(root), Some(exe)) = (canonical_root, canonical_exe) {
        if exe.starts_with(&root) {
            if let Ok(relative) = relative_path(&root, &exe) {
                return Some(relative);
            }
        }
    }

    exe.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

/// The manifest name is a path relative to the root; absolute paths and parent
/// references would let it escape the tree it describes.
fn validate_output_name(name: &str) -> Result<String> {
    canonical_relative_name(name)
        .filter(|_| !Path::new(name).is_absolute())
        .ok_or_else(|| {
            HashError::Config(format!(
                "manifest name must be a relative path inside the root: {name}"
            ))
        })
}
