//! Manifest data model and serialization.
//!
//! A manifest is rendered as one line per entry:
//!
//! ```text
//! f;<base64 path digest>;<base64 content digest>
//! ```
//!
//! Lines are sorted by their full text before writing, so an unchanged tree
//! always yields a byte-identical file.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::crypto::{encode_digest, sha256_bytes, DIGEST_LEN};
use crate::error::{HashError, Result};

/// Well-known name of the manifest written at the root of a hashed tree.
pub const MANIFEST_FILE_NAME: &str = "hash_sum.txt";

/// Field separator inside a manifest line.
const FIELD_SEPARATOR: char = ';';

/// Kind of a hashed filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryKind {
    File,
    /// Whole-subtree digest; only produced when directory hashing is enabled.
    Directory,
}

impl EntryKind {
    /// Single-character tag used in the manifest line.
    pub fn tag(&self) -> char {
        match self {
            EntryKind::File => 'f',
            EntryKind::Directory => 'd',
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "f" => Some(EntryKind::File),
            "d" => Some(EntryKind::Directory),
            _ => None,
        }
    }
}

/// One hashed filesystem object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub relative_path: String,
    pub kind: EntryKind,
    pub path_digest: [u8; DIGEST_LEN],
    pub content_digest: [u8; DIGEST_LEN],
}

impl ManifestEntry {
    /// Creates an entry, deriving the path digest from `relative_path`.
    pub fn new(relative_path: String, kind: EntryKind, content_digest: [u8; DIGEST_LEN]) -> Self {
        let path_digest = sha256_bytes(relative_path.as_bytes());
        Self {
            relative_path,
            kind,
            path_digest,
            content_digest,
        }
    }

    /// Renders the manifest line, without the trailing newline.
    pub fn render_line(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.kind.tag(),
            encode_digest(&self.path_digest),
            encode_digest(&self.content_digest),
            sep = FIELD_SEPARATOR
        )
    }
}

/// Entries accumulated during one build, keyed by relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry. A repeated path replaces the earlier entry.
    pub fn insert(&mut self, entry: ManifestEntry) -> Option<ManifestEntry> {
        self.entries.insert(entry.relative_path.clone(), entry)
    }

    pub fn get(&self, relative_path: &str) -> Option<&ManifestEntry> {
        self.entries.get(relative_path)
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.entries.contains_key(relative_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    /// Rendered lines, sorted by full line text.
    pub fn sorted_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.entries().map(ManifestEntry::render_line).collect();
        lines.sort();
        lines
    }

    /// Renders the whole manifest file content.
    pub fn render(&self) -> String {
        let lines = self.sorted_lines();
        let mut out = String::with_capacity(lines.len() * (2 * 44 + 4));
        for line in lines {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    /// Writes the manifest to `output_path`, replacing any previous file.
    ///
    /// The content goes to a temporary file next to the destination first and
    /// is renamed into place, so a failed write leaves the old file untouched.
    pub fn write(&self, output_path: &Path) -> Result<()> {
        let content = self.render();

        let dir = match output_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| HashError::io(output_path, e))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| HashError::io(output_path, e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| HashError::io(output_path, e))?;
        tmp.persist(output_path)
            .map_err(|e| HashError::io(output_path, e.error))?;

        tracing::info!(
            path = %output_path.display(),
            entries = self.len(),
            "manifest written"
        );
        Ok(())
    }
}

/// One manifest line read back from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestLine {
    pub kind: EntryKind,
    pub path_digest: String,
    pub content_digest: String,
}

/// Parses a single rendered line. Returns `None` for anything malformed.
pub fn parse_line(line: &str) -> Option<ManifestLine> {
    let mut fields = line.trim_end_matches(['\r', '\n']).split(FIELD_SEPARATOR);
    let kind = EntryKind::from_tag(fields.next()?)?;
    let path_digest = fields.next()?.to_string();
    let content_digest = fields.next()?.to_string();
    if fields.next().is_some() || path_digest.is_empty() || content_digest.is_empty() {
        return None;
    }
    Some(ManifestLine {
        kind,
        path_digest,
        content_digest,
    })
}
