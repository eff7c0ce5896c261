//! Treeseal CLI
//!
//! Generate integrity manifests and seal archives from the command line.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use treeseal::config::DEFAULT_ARCHIVE_OUTPUT_DIR;
use treeseal::{
    generate, pack_and_seal, seal_archive_with, verify_sealed_archive, ArchiveInfo,
    GenerateSummary, HashError, ManifestConfig, SealResult, SealStrategy, SealVerification,
};

/// Treeseal - integrity manifests and archive trust seals
#[derive(Parser, Debug)]
#[command(name = "treeseal")]
#[command(version)]
#[command(about = "Generate integrity manifests for directory trees and seal archives")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output format: text or json
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Show debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Hash every file under a directory into a manifest
    Manifest {
        /// Directory to hash (defaults to the executable's directory)
        #[arg(short, long, value_name = "DIR")]
        root: Option<PathBuf>,

        /// Manifest file name, relative to the root
        #[arg(short, long, value_name = "NAME")]
        output: Option<String>,

        /// Also emit a whole-subtree digest for every directory
        #[arg(long)]
        directories: bool,
    },

    /// Append a digest trailer to an existing archive
    Seal {
        /// Archive to seal. Seal each archive exactly once.
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// Write to a temporary copy and rename it into place
        #[arg(long)]
        atomic: bool,
    },

    /// Zip a directory and seal the resulting archive
    Pack {
        /// Directory to compress
        #[arg(value_name = "FOLDER")]
        folder: PathBuf,

        /// File name of the archive to create
        #[arg(short, long, value_name = "ZIP")]
        name: String,

        /// Directory the archive is written to
        #[arg(short, long, value_name = "DIR", default_value = DEFAULT_ARCHIVE_OUTPUT_DIR)]
        output: PathBuf,

        /// Write to a temporary copy and rename it into place
        #[arg(long)]
        atomic: bool,
    },

    /// Check the digest trailer of a sealed archive
    Check {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,
    },
}

#[derive(Clone, Debug, PartialEq)]
enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use 'text' or 'json'", s)),
        }
    }
}

/// What a successful command produced.
enum Outcome {
    Manifest(GenerateSummary),
    Sealed {
        archive: PathBuf,
        seal: SealResult,
    },
    Packed {
        archive: PathBuf,
        info: ArchiveInfo,
        seal: SealResult,
    },
    Checked {
        archive: PathBuf,
        verification: SealVerification,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    initialize_tracing(args.verbose);

    match run(&args).and_then(|outcome| print_success(&outcome, &args.format)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            print_error(&e, &args.format);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn initialize_tracing(verbose: bool) {
    let default_level = if verbose { "treeseal=debug" } else { "treeseal=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> Result<Outcome, HashError> {
    match &args.command {
        Command::Manifest {
            root,
            output,
            directories,
        } => {
            let config = ManifestConfig::resolve(root.clone(), output.clone())?
                .with_directories(*directories);
            tracing::info!(root = %config.root.display(), "hashing directory");
            generate(&config).map(Outcome::Manifest)
        }
        Command::Seal { archive, atomic } => {
            let seal = seal_archive_with(archive, strategy(*atomic))?;
            Ok(Outcome::Sealed {
                archive: archive.clone(),
                seal,
            })
        }
        Command::Pack {
            folder,
            name,
            output,
            atomic,
        } => {
            let archive = archive_target(output, name)?;
            let (info, seal) = pack_and_seal(folder, &archive, strategy(*atomic))?;
            Ok(Outcome::Packed {
                archive,
                info,
                seal,
            })
        }
        Command::Check { archive } => {
            let verification = verify_sealed_archive(archive)?;
            Ok(Outcome::Checked {
                archive: archive.clone(),
                verification,
            })
        }
    }
}

fn strategy(atomic: bool) -> SealStrategy {
    if atomic {
        SealStrategy::AtomicCopy
    } else {
        SealStrategy::InPlace
    }
}

fn archive_target(output_dir: &Path, name: &str) -> Result<PathBuf, HashError> {
    let file_name = Path::new(name);
    if name.is_empty() || file_name.components().count() != 1 || file_name.file_name().is_none() {
        return Err(HashError::Config(format!(
            "archive name must be a plain file name: {name}"
        )));
    }
    Ok(output_dir.join(file_name))
}

fn print_success(outcome: &Outcome, format: &OutputFormat) -> Result<(), HashError> {
    if *format == OutputFormat::Json {
        print_success_json(outcome)
    } else {
        print_success_text(outcome);
        Ok(())
    }
}

fn print_success_text(outcome: &Outcome) {
    match outcome {
        Outcome::Manifest(summary) => {
            println!("Manifest written: {}", summary.manifest_path.display());
            println!("- Entries:     {}", summary.entries);
            println!("- Files:       {}", summary.stats.files_hashed);
            if summary.stats.directories_hashed > 0 {
                println!("- Directories: {}", summary.stats.directories_hashed);
            }
            println!("- Bytes:       {}", summary.stats.bytes_hashed);
            println!("- Excluded:    {}", summary.stats.entries_excluded);
        }
        Outcome::Sealed { archive, seal } => {
            println!("Archive sealed: {}", archive.display());
            print_seal_text(seal);
        }
        Outcome::Packed {
            archive,
            info,
            seal,
        } => {
            println!("Archive created: {}", archive.display());
            println!("- Files:         {}", info.files);
            println!("- Directories:   {}", info.directories);
            print_seal_text(seal);
        }
        Outcome::Checked {
            archive,
            verification,
        } => {
            println!("Trust seal verified: {}", archive.display());
            println!("- Payload size:  {} bytes", verification.payload_size);
            println!("- Digest:        {}", verification.digest);
        }
    }
}

fn print_seal_text(seal: &SealResult) {
    println!("- Original size: {} bytes", seal.original_size);
    println!("- Digest length: {} bytes", seal.digest_length);
    println!("- Final size:    {} bytes", seal.final_size);
}

fn print_success_json(outcome: &Outcome) -> Result<(), HashError> {
    let json = match outcome {
        Outcome::Manifest(summary) => serde_json::json!({
            "status": "ok",
            "command": "manifest",
            "manifest": serde_json::to_value(summary)?,
        }),
        Outcome::Sealed { archive, seal } => serde_json::json!({
            "status": "ok",
            "command": "seal",
            "archive": archive.display().to_string(),
            "seal": serde_json::to_value(seal)?,
        }),
        Outcome::Packed {
            archive,
            info,
            seal,
        } => serde_json::json!({
            "status": "ok",
            "command": "pack",
            "archive": archive.display().to_string(),
            "contents": serde_json::to_value(info)?,
            "seal": serde_json::to_value(seal)?,
        }),
        Outcome::Checked {
            archive,
            verification,
        } => serde_json::json!({
            "status": "verified",
            "command": "check",
            "archive": archive.display().to_string(),
            "verification": serde_json::to_value(verification)?,
        }),
    };

    println!("{:#}", json);
    Ok(())
}

fn print_error(error: &HashError, format: &OutputFormat) {
    if *format == OutputFormat::Json {
        let json = serde_json::json!({
            "status": "failed",
            "error": error.to_string(),
            "exitCode": error.exit_code()
        });
        println!("{:#}", json);
        return;
    }

    eprintln!("Error: {}", error);
    match error {
        HashError::Traversal { .. } => {
            eprintln!("No manifest was written. Every file under the root must be");
            eprintln!("readable and no symbolic links may be present.");
        }
        HashError::SealMismatch => {
            eprintln!("The archive bytes do not match the digest recorded when it");
            eprintln!("was sealed. The archive cannot be trusted.");
        }
        HashError::SealMalformed { .. } => {
            eprintln!("The archive does not end with a trust seal.");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest_command() {
        let args = Args::try_parse_from([
            "treeseal", "manifest", "--root", "dist", "--directories", "-f", "json",
        ])
        .unwrap();
        assert_eq!(args.format, OutputFormat::Json);
        match args.command {
            Command::Manifest {
                root, directories, ..
            } => {
                assert_eq!(root, Some(PathBuf::from("dist")));
                assert!(directories);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_pack_defaults_to_current_directory() {
        let args = Args::try_parse_from(["treeseal", "pack", "app", "--name", "app.zip"]).unwrap();
        match args.command {
            Command::Pack { output, atomic, .. } => {
                assert_eq!(output, PathBuf::from("."));
                assert!(!atomic);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(Args::try_parse_from(["treeseal", "check", "a.zip", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_archive_target_requires_plain_name() {
        let dir = Path::new("out");
        assert_eq!(archive_target(dir, "app.zip").unwrap(), dir.join("app.zip"));
        assert!(archive_target(dir, "").is_err());
        assert!(archive_target(dir, "../app.zip").is_err());
        assert!(archive_target(dir, "sub/app.zip").is_err());
    }
}
