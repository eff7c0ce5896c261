//! Path classification.
//!
//! Decides which walked entries are hashed. Rules, in order:
//!
//! 1. The relative path equals the manifest output name: excluded.
//! 2. The relative path equals the executable name: excluded. This is an exact
//!    match, never a prefix match.
//! 3. Directories are eligible only in whole-subtree mode.
//! 4. Everything else is eligible.
//!
//! Paths are compared in their normalized, forward-slash form relative to the
//! manifest root. An excluded directory is still descended into.

use crate::manifest::MANIFEST_FILE_NAME;

/// Exclusion policy for one manifest run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathClassifier {
    manifest_name: String,
    executable_name: Option<String>,
    include_directories: bool,
}

impl Default for PathClassifier {
    fn default() -> Self {
        Self::new(MANIFEST_FILE_NAME, None)
    }
}

impl PathClassifier {
    pub fn new(manifest_name: impl Into<String>, executable_name: Option<String>) -> Self {
        Self {
            manifest_name: canonical_name(&manifest_name.into()),
            executable_name: executable_name.map(|name| canonical_name(&name)),
            include_directories: false,
        }
    }

    /// Enables directory entries for whole-subtree hashing.
    pub fn with_directories(mut self, include: bool) -> Self {
        self.include_directories = include;
        self
    }

    pub fn manifest_name(&self) -> &str {
        &self.manifest_name
    }

    pub fn executable_name(&self) -> Option<&str> {
        self.executable_name.as_deref()
    }

    pub fn includes_directories(&self) -> bool {
        self.include_directories
    }

    /// Returns whether the entry at `relative_path` gets a manifest line.
    pub fn is_eligible(&self, relative_path: &str, is_directory: bool) -> bool {
        if relative_path == self.manifest_name {
            return false;
        }
        if self.executable_name.as_deref() == Some(relative_path) {
            return false;
        }
        if is_directory {
            return self.include_directories;
        }
        true
    }
}

/// Rewrites every backslash separator to a forward slash.
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Rewrites `name` into the form walked paths take: forward slashes, no `.`
/// or empty components.
///
/// Returns `None` when no walked path could ever equal `name`: absolute
/// paths, `..` components, or nothing left after cleanup.
pub fn canonical_relative_name(name: &str) -> Option<String> {
    let normalized = normalize_separators(name);
    if normalized.starts_with('/') {
        return None;
    }

    let mut parts = Vec::new();
    for part in normalized.split('/') {
        match part {
            "" | "." => {}
            ".." => return None,
            part => parts.push(part),
        }
    }

    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

fn canonical_name(name: &str) -> String {
    canonical_relative_name(name).unwrap_or_else(|| normalize_separators(name))
}
