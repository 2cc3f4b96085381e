//! Command-line interface for tidy.
//!
//! This module handles:
//! - Flag parsing and default directories derived from `--root`
//! - Validation of everything that can fail before the first mutation
//! - Running the requested actions in order (dedupe, organize, encrypt, report)
//! - The closing summary

use crate::actions::{
    self, ActionContext, DedupeMode, EncryptOptions, OrganizeMode,
};
use crate::config::{ConfigError, FilterConfig};
use crate::fingerprint::Blake3Fingerprinter;
use crate::keystore::{KeyStoreError, select_key_store};
use crate::output::OutputFormatter;
use crate::relocator::RunMode;
use crate::report::{self, ReportError, ReportFormat};
use clap::Parser;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Safe file tidying utility (dry-run by default).
#[derive(Debug, Clone, Parser)]
#[command(name = "tidy", version, about)]
pub struct Cli {
    /// Root directory to operate on
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Include hidden files and directories
    #[arg(long)]
    pub include_hidden: bool,

    /// Glob pattern matched against the full path to exclude (repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub exclude_glob: Vec<String>,

    /// Filter configuration file (default: .tidyrc.toml, then ~/.config/tidy/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Apply changes (otherwise dry-run)
    #[arg(long)]
    pub apply: bool,

    /// Find duplicates and optionally move or delete them
    #[arg(long, value_enum, value_name = "MODE")]
    pub dedupe: Option<DedupeMode>,

    /// Where duplicates go with --dedupe move (default: <root>/_duplicates)
    #[arg(long, value_name = "DIR")]
    pub duplicates_dir: Option<PathBuf>,

    /// Organize files by extension or modified date
    #[arg(long, value_enum, value_name = "MODE")]
    pub organize: Option<OrganizeMode>,

    /// Target base directory for organized files (default: <root>/_organized)
    #[arg(long, value_name = "DIR")]
    pub organize_dir: Option<PathBuf>,

    /// Encrypt files into an output directory
    #[arg(long)]
    pub encrypt: bool,

    /// Where encrypted files are written (default: <root>/_encrypted)
    #[arg(long, value_name = "DIR")]
    pub encryption_output_dir: Option<PathBuf>,

    /// Path to the key file (default: <root>/_key.fernet)
    #[arg(long, value_name = "PATH")]
    pub key_file: Option<PathBuf>,

    /// Remove originals after successful encryption
    #[arg(long)]
    pub remove_originals: bool,

    /// Inventory report (counts, sizes, largest files)
    #[arg(long)]
    pub report: bool,

    /// Report output format
    #[arg(long, value_enum, value_name = "FORMAT", default_value_t = ReportFormat::Text)]
    pub report_format: ReportFormat,

    /// Write the report to this file instead of stdout
    #[arg(long, value_name = "PATH")]
    pub report_output: Option<PathBuf>,

    /// Number of largest files to include in the report
    #[arg(long, value_name = "N", default_value_t = 20)]
    pub report_top: usize,
}

impl Cli {
    fn has_action(&self) -> bool {
        self.dedupe.is_some() || self.organize.is_some() || self.encrypt || self.report
    }
}

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Root directory does not exist or is not a directory: {}", .0.display())]
    InvalidRoot(PathBuf),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(
        "Encryption requested but this build has no cipher. Rebuild with the 'fernet' feature."
    )]
    EncryptionUnavailable,
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

impl CliError {
    /// Process exit code for this error.
    ///
    /// Anything detected before the tree is touched (root, filters, key,
    /// missing cipher) is a configuration error and exits with 2.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidRoot(_)
            | Self::Config(_)
            | Self::EncryptionUnavailable
            | Self::KeyStore(_) => 2,
            Self::Report(_) => 1,
        }
    }
}

/// Directories every action needs, resolved against the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub root: PathBuf,
    pub duplicates_dir: PathBuf,
    pub organize_dir: PathBuf,
    pub encryption_output_dir: PathBuf,
    pub key_file: PathBuf,
}

impl ResolvedPaths {
    /// Canonicalises the root and fills in defaults below it.
    pub fn resolve(cli: &Cli) -> Result<Self, CliError> {
        if !cli.root.is_dir() {
            return Err(CliError::InvalidRoot(absolute(&cli.root)));
        }
        let root = cli
            .root
            .canonicalize()
            .map_err(|_| CliError::InvalidRoot(absolute(&cli.root)))?;

        let or_default = |given: &Option<PathBuf>, default: &str| {
            given
                .as_deref()
                .map(absolute)
                .unwrap_or_else(|| root.join(default))
        };

        Ok(Self {
            duplicates_dir: or_default(&cli.duplicates_dir, "_duplicates"),
            organize_dir: or_default(&cli.organize_dir, "_organized"),
            encryption_output_dir: or_default(&cli.encryption_output_dir, "_encrypted"),
            key_file: or_default(&cli.key_file, "_key.fernet"),
            root,
        })
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Runs every action requested on the command line.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use tidy::cli::{Cli, run_cli};
///
/// let cli = Cli::parse_from(["tidy", "--root", "/data", "--dedupe", "report"]);
/// if let Err(e) = run_cli(&cli) {
///     eprintln!("Error: {}", e);
///     std::process::exit(e.exit_code());
/// }
/// ```
pub fn run_cli(cli: &Cli) -> Result<(), CliError> {
    let paths = ResolvedPaths::resolve(cli)?;
    let filter = FilterConfig::load(cli.config.as_deref())?
        .merge_cli(cli.include_hidden, &cli.exclude_glob)
        .compile()?;

    let key_store = select_key_store();
    let key = if cli.encrypt {
        if !key_store.can_encrypt() {
            return Err(CliError::EncryptionUnavailable);
        }
        Some(key_store.load_or_create(&paths.key_file)?)
    } else {
        None
    };

    if !cli.has_action() {
        OutputFormatter::plain(
            "Nothing to do. Pass one or more of --dedupe, --organize, --encrypt, --report.",
        );
        return Ok(());
    }

    let mode = RunMode::from_apply_flag(cli.apply);
    let mut summary: Vec<(String, String)> = Vec::new();
    let mut failures = 0;

    if let Some(dedupe_mode) = cli.dedupe {
        OutputFormatter::header("DEDUPE");
        let ctx = ActionContext::new(&paths.root, &filter, mode)
            .with_progress(OutputFormatter::create_progress_bar(0));
        let outcome = actions::dedupe(&ctx, dedupe_mode, &paths.duplicates_dir, &Blake3Fingerprinter);
        let verb = match dedupe_mode {
            DedupeMode::Report => "not changed",
            DedupeMode::Move | DedupeMode::Delete => "moved/deleted",
        };
        summary.push((
            "Dedupe".to_string(),
            format!("{} groups; {} files {}", outcome.group_count(), outcome.operated, verb),
        ));
        failures += outcome.failures.len();
    }

    if let Some(organize_mode) = cli.organize {
        OutputFormatter::header("ORGANIZE");
        let ctx = ActionContext::new(&paths.root, &filter, mode);
        let outcome = actions::organize(&ctx, organize_mode, &paths.organize_dir);
        summary.push((
            "Organize".to_string(),
            format!("{} files moved", outcome.moved()),
        ));
        failures += outcome.failures.len();
    }

    if let Some(key) = &key {
        OutputFormatter::header("ENCRYPT");
        let ctx = ActionContext::new(&paths.root, &filter, mode);
        let options = EncryptOptions {
            output_dir: &paths.encryption_output_dir,
            key_file: &paths.key_file,
            remove_originals: cli.remove_originals,
        };
        let outcome = actions::encrypt_tree(&ctx, &options, key_store.as_ref(), key);
        summary.push((
            "Encrypt".to_string(),
            format!(
                "{} files written to {} ({} already encrypted)",
                outcome.processed(),
                paths.encryption_output_dir.display(),
                outcome.already_encrypted.len()
            ),
        ));
        failures += outcome.failures.len();
    }

    if cli.report {
        OutputFormatter::header("REPORT");
        let inventory = report::build_inventory(&paths.root, &filter, cli.report_top);
        report::emit_report(&inventory, cli.report_format, cli.report_output.as_deref())?;
        summary.push((
            "Report".to_string(),
            format!("{} files inventoried", inventory.total_files),
        ));
    }

    OutputFormatter::summary_table(&summary);
    if failures > 0 {
        OutputFormatter::warning(&format!(
            "{} files could not be processed. See errors above.",
            failures
        ));
    }

    if mode.is_dry_run() {
        OutputFormatter::dry_run_notice("Dry-run complete. Re-run with --apply to make changes.");
    } else {
        OutputFormatter::success("Done.");
    }
    Ok(())
}
