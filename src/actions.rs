//! The user-facing actions: dedupe, organize and encrypt.
//!
//! Each action walks the tree through the shared [`PathFilter`], decides what
//! to do per file, and routes every mutation through the [`RunMode`] gate.
//! Per-file failures are printed, logged and collected in the outcome; they
//! never abort the run. Work already applied is not rolled back.

use crate::config::PathFilter;
use crate::entry::FileEntry;
use crate::fingerprint::Fingerprinter;
use crate::grouper::{DuplicateGroup, SizeBuckets, group_candidates};
use crate::keystore::{KeyMaterial, KeyStore};
use crate::output::OutputFormatter;
use crate::relocator::{
    RelocationPlan, RunMode, SafeRelocator, ensure_directory, is_same_location,
};
use crate::walker::TreeWalker;
use chrono::{DateTime, Datelike, Local};
use clap::ValueEnum;
use indicatif::ProgressBar;
use log::{debug, info, warn};
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Directory name for files without an extension when organizing by type.
pub const NO_EXTENSION_BUCKET: &str = "noext";

/// Extension appended to every encrypted artifact.
pub const ENCRYPTED_EXTENSION: &str = "enc";

/// What dedupe does with every duplicate except the kept one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DedupeMode {
    /// List duplicates only. Never mutates, even with `--apply`.
    Report,
    /// Move duplicates into the duplicates directory.
    Move,
    /// Delete duplicates.
    Delete,
}

/// How organize picks a destination subdirectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OrganizeMode {
    /// By lower-cased file extension.
    Ext,
    /// By modification date, `YYYY/MM` in local time.
    Date,
}

/// Shared inputs of every action.
pub struct ActionContext<'a> {
    pub root: &'a Path,
    pub filter: &'a PathFilter,
    pub mode: RunMode,
    progress: ProgressBar,
}

impl<'a> ActionContext<'a> {
    pub fn new(root: &'a Path, filter: &'a PathFilter, mode: RunMode) -> Self {
        Self {
            root,
            filter,
            mode,
            progress: ProgressBar::hidden(),
        }
    }

    /// Reports hashing progress on `progress` instead of a hidden bar.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    fn walk(&self) -> TreeWalker<'a> {
        TreeWalker::new(self.root, self.filter)
    }

    /// Materialises the walk so files moved during the run are not re-visited.
    fn snapshot(&self) -> Vec<FileEntry> {
        self.walk().collect()
    }
}

/// A file that could not be processed and why.
pub type Failure = (PathBuf, String);

fn record_failure(failures: &mut Vec<Failure>, path: &Path, reason: impl ToString) {
    let reason = reason.to_string();
    warn!("{}: {}", path.display(), reason);
    OutputFormatter::error(&format!("Failed on {}: {}", path.display(), reason));
    failures.push((path.to_path_buf(), reason));
}

/// Result of a dedupe run.
#[derive(Debug, Default)]
pub struct DedupeOutcome {
    pub groups: Vec<DuplicateGroup>,
    /// Files moved or deleted (planned ones in dry-run mode).
    pub operated: usize,
    /// Moves, in `move` mode.
    pub moves: Vec<RelocationPlan>,
    /// Deleted paths, in `delete` mode.
    pub deleted: Vec<PathBuf>,
    pub failures: Vec<Failure>,
}

impl DedupeOutcome {
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

/// Finds duplicate sets and reports, moves or deletes all but one member each.
///
/// The kept member is the shortest path, ties broken lexicographically.
/// Moved duplicates land flat in `duplicates_dir` under their basename.
pub fn dedupe(
    ctx: &ActionContext<'_>,
    mode: DedupeMode,
    duplicates_dir: &Path,
    fingerprinter: &dyn Fingerprinter,
) -> DedupeOutcome {
    let buckets = SizeBuckets::build(ctx.walk());
    ctx.progress.set_length(buckets.candidate_count() as u64);
    ctx.progress.set_message("hashing");
    let groups = group_candidates(buckets, fingerprinter, |_| ctx.progress.inc(1));
    ctx.progress.finish_and_clear();

    let mut outcome = DedupeOutcome::default();
    if groups.is_empty() {
        OutputFormatter::plain("No duplicates found.");
        return outcome;
    }

    OutputFormatter::plain(&format!("Found {} duplicate groups.", groups.len()));
    let mut relocator = SafeRelocator::new(ctx.mode);

    for group in &groups {
        let hex = group.digest.to_hex();
        OutputFormatter::plain(&format!("Hash {}… keep: {}", &hex[..12], group.keeper().display()));

        for duplicate in group.duplicates() {
            match mode {
                DedupeMode::Report => {
                    OutputFormatter::action(
                        &format!("duplicate: {}", duplicate.display()),
                        RunMode::DryRun,
                    );
                }
                DedupeMode::Move => {
                    let Some(name) = duplicate.file_name() else {
                        continue;
                    };
                    let target = duplicates_dir.join(name);
                    if is_same_location(duplicate, &target) {
                        continue;
                    }
                    match relocator.relocate(duplicate, &target) {
                        Ok(plan) => {
                            outcome.operated += 1;
                            outcome.moves.push(plan);
                        }
                        Err(e) => record_failure(&mut outcome.failures, duplicate, e),
                    }
                }
                DedupeMode::Delete => {
                    OutputFormatter::action(&format!("delete {}", duplicate.display()), ctx.mode);
                    let result = match ctx.mode {
                        RunMode::DryRun => Ok(()),
                        RunMode::Apply => fs::remove_file(duplicate),
                    };
                    match result {
                        Ok(()) => {
                            outcome.operated += 1;
                            outcome.deleted.push(duplicate.clone());
                        }
                        Err(e) => record_failure(&mut outcome.failures, duplicate, e),
                    }
                }
            }
        }
    }

    info!(
        "Dedupe: {} groups, {} files operated on",
        groups.len(),
        outcome.operated
    );
    outcome.groups = groups;
    outcome
}

/// Result of an organize run.
#[derive(Debug, Default)]
pub struct OrganizeOutcome {
    pub moves: Vec<RelocationPlan>,
    /// Files already at their destination.
    pub already_in_place: usize,
    pub failures: Vec<Failure>,
}

impl OrganizeOutcome {
    pub fn moved(&self) -> usize {
        self.moves.len()
    }
}

/// Lower-cased extension without the dot, or [`NO_EXTENSION_BUCKET`].
pub fn extension_bucket(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| NO_EXTENSION_BUCKET.to_string())
}

/// `YYYY/MM` of `modified` in the local timezone.
pub fn date_bucket(modified: SystemTime) -> PathBuf {
    let local: DateTime<Local> = modified.into();
    PathBuf::from(format!("{:04}", local.year())).join(format!("{:02}", local.month()))
}

/// The subdirectory of the organize directory that `entry` belongs in.
pub fn classify(entry: &FileEntry, mode: OrganizeMode) -> io::Result<PathBuf> {
    match mode {
        OrganizeMode::Ext => Ok(PathBuf::from(extension_bucket(entry.path()))),
        OrganizeMode::Date => entry.modified().map(date_bucket),
    }
}

/// Moves every eligible file into `organize_dir/<bucket>/<basename>`.
///
/// A file already sitting at its destination is left alone, so running
/// organize twice makes no moves the second time.
pub fn organize(ctx: &ActionContext<'_>, mode: OrganizeMode, organize_dir: &Path) -> OrganizeOutcome {
    let mut outcome = OrganizeOutcome::default();
    let mut relocator = SafeRelocator::new(ctx.mode);

    for entry in ctx.snapshot() {
        let bucket = match classify(&entry, mode) {
            Ok(bucket) => bucket,
            Err(e) => {
                warn!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };
        let Some(name) = entry.path().file_name() else {
            continue;
        };

        let target = organize_dir.join(bucket).join(name);
        if is_same_location(entry.path(), &target) {
            outcome.already_in_place += 1;
            continue;
        }

        match relocator.relocate(entry.path(), &target) {
            Ok(plan) => outcome.moves.push(plan),
            Err(e) => record_failure(&mut outcome.failures, entry.path(), e),
        }
    }

    if outcome.moves.is_empty() {
        OutputFormatter::plain("No files to organize or already organized.");
    }
    info!("Organize: {} files moved", outcome.moved());
    outcome
}

/// Where and how encrypted copies are written.
#[derive(Debug, Clone)]
pub struct EncryptOptions<'a> {
    pub output_dir: &'a Path,
    pub key_file: &'a Path,
    pub remove_originals: bool,
}

/// Result of an encrypt run.
#[derive(Debug, Default)]
pub struct EncryptOutcome {
    /// `(source, encrypted artifact)` pairs, planned ones in dry-run mode.
    pub written: Vec<(PathBuf, PathBuf)>,
    /// Sources whose artifact already exists from an earlier run.
    pub already_encrypted: Vec<PathBuf>,
    /// Originals removed after their artifact was written.
    pub removed: Vec<PathBuf>,
    pub failures: Vec<Failure>,
}

impl EncryptOutcome {
    pub fn processed(&self) -> usize {
        self.written.len()
    }
}

/// True for files this tool produced itself.
pub fn is_encrypted_artifact(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == ENCRYPTED_EXTENSION)
}

/// `output_dir/<path relative to root>.enc`
pub fn encrypted_destination(root: &Path, output_dir: &Path, path: &Path) -> PathBuf {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut name = OsString::from(relative.as_os_str());
    name.push(".");
    name.push(ENCRYPTED_EXTENSION);
    output_dir.join(name)
}

/// Encrypts every eligible file into a mirror of the tree under the output
/// directory, using `key`.
///
/// A source whose mirrored artifact already exists is counted as done and
/// left alone, so re-running or resuming an encrypt writes nothing twice.
/// Failures are per file. An original is only removed after its artifact
/// has been written in full.
pub fn encrypt_tree(
    ctx: &ActionContext<'_>,
    options: &EncryptOptions<'_>,
    store: &dyn KeyStore,
    key: &KeyMaterial,
) -> EncryptOutcome {
    let mut outcome = EncryptOutcome::default();
    let mut relocator = SafeRelocator::new(ctx.mode);

    for entry in ctx.snapshot() {
        let source = entry.path();
        if is_encrypted_artifact(source) || is_same_location(source, options.key_file) {
            continue;
        }

        let requested = encrypted_destination(ctx.root, options.output_dir, source);
        if requested.is_file() {
            debug!("Already encrypted: {}", source.display());
            outcome.already_encrypted.push(source.to_path_buf());
            continue;
        }

        let destination = relocator.resolve(&requested);
        OutputFormatter::action(
            &format!("encrypt {} -> {}", source.display(), destination.display()),
            ctx.mode,
        );

        if ctx.mode == RunMode::Apply {
            let written = fs::read(source)
                .map_err(|e| e.to_string())
                .and_then(|plaintext| store.encrypt(&plaintext, key).map_err(|e| e.to_string()))
                .and_then(|ciphertext| {
                    write_new_file(&destination, &ciphertext).map_err(|e| e.to_string())
                });
            if let Err(reason) = written {
                record_failure(&mut outcome.failures, source, reason);
                continue;
            }
        }
        outcome.written.push((source.to_path_buf(), destination));

        if options.remove_originals {
            OutputFormatter::action(&format!("delete original {}", source.display()), ctx.mode);
            if ctx.mode == RunMode::Apply {
                match fs::remove_file(source) {
                    Ok(()) => outcome.removed.push(source.to_path_buf()),
                    Err(e) => record_failure(&mut outcome.failures, source, e),
                }
            }
        }
    }

    if outcome.written.is_empty() {
        OutputFormatter::plain("No files encrypted (nothing matched or already encrypted).");
    }
    info!(
        "Encrypt: {} files processed, {} already encrypted",
        outcome.processed(),
        outcome.already_encrypted.len()
    );
    outcome
}

/// Writes `data` to a file that must not exist yet.
fn write_new_file(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent).map_err(io::Error::other)?;
    }
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(data)?;
    file.sync_all()
}
