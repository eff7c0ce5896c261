//! Treeseal
//!
//! Tamper-evident integrity manifests for directory trees, and digest trust
//! seals for archives.
//!
//! The manifest (`hash_sum.txt` by default) holds one line per file with a
//! SHA-256 digest of its relative path and of its content. A trust seal is a
//! length-prefixed SHA-256 trailer appended to a finished archive.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use treeseal::{generate, seal_archive, verify_sealed_archive, ManifestConfig};
//!
//! // Write hash_sum.txt for a shipped bundle
//! let summary = generate(&ManifestConfig::new("./dist/app")).unwrap();
//!
//! // Seal a zip built from it, then check the seal later
//! seal_archive(Path::new("app.zip")).unwrap();
//! verify_sealed_archive(Path::new("app.zip")).unwrap();
//! ```

pub mod archive;
pub mod builder;
pub mod classifier;
pub mod config;
pub mod crypto;
pub mod error;
pub mod manifest;
pub mod sealed;
pub mod verify;

pub use archive::{create_archive, pack_and_seal, ArchiveInfo};
pub use builder::{build_manifest, generate, BuildStats, GenerateSummary, ManifestBuilder};
pub use classifier::PathClassifier;
pub use config::ManifestConfig;
pub use error::{HashError, Result};
pub use manifest::{EntryKind, Manifest, ManifestEntry, MANIFEST_FILE_NAME};
pub use sealed::{read_trailer, seal_archive, seal_archive_with, ArchiveTrustSeal, SealResult, SealStrategy};
pub use verify::{verify_sealed_archive, SealVerification};
