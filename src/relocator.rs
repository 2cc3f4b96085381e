/// Collision-safe file relocation.
///
/// Every mutating action moves files through [`SafeRelocator`]. A requested
/// destination that is already taken is never overwritten: a `__N` counter is
/// inserted before the extension until a free name is found. The same probing
/// runs in dry-run mode, so a preview names exactly the paths an applied run
/// would use.
///
/// The existence check and the move are two separate steps. Another process
/// changing the tree in between can still cause a collision; runs are assumed
/// to be single-threaded and sequential.
use crate::output::OutputFormatter;
use log::debug;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Whether an invocation may touch the filesystem.
///
/// Chosen once at startup and passed explicitly to every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Report what would happen without changing anything.
    DryRun,
    /// Perform the changes.
    Apply,
}

impl RunMode {
    pub fn from_apply_flag(apply: bool) -> Self {
        if apply { Self::Apply } else { Self::DryRun }
    }

    pub fn is_dry_run(self) -> bool {
        self == Self::DryRun
    }
}

/// A requested move resolved to a collision-free destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationPlan {
    pub source: PathBuf,
    pub requested: PathBuf,
    pub destination: PathBuf,
}

/// Errors that can occur while relocating a single file.
#[derive(Debug, Error)]
pub enum RelocateError {
    /// Failed to create a destination directory.
    #[error("Failed to create directory {}: {source}", path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Failed to move the file.
    #[error("Failed to move {} to {}: {source}", from.display(), to.display())]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for relocation operations.
pub type RelocateResult<T> = Result<T, RelocateError>;

/// Moves files without ever replacing an existing one.
///
/// Destinations handed out during a run are remembered, so two files asking
/// for the same name in a dry run get distinct previews, just as they would
/// once the first one had actually been moved.
#[derive(Debug)]
pub struct SafeRelocator {
    mode: RunMode,
    reserved: HashSet<PathBuf>,
}

impl SafeRelocator {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            reserved: HashSet::new(),
        }
    }

    /// Returns the first free candidate for `requested` and reserves it.
    ///
    /// `name.ext` is tried as-is, then `name__1.ext`, `name__2.ext`, ...
    pub fn resolve(&mut self, requested: &Path) -> PathBuf {
        let mut candidate = requested.to_path_buf();
        let mut counter: u64 = 1;
        while self.is_taken(&candidate) {
            candidate = disambiguated_name(requested, counter);
            counter += 1;
        }
        self.reserved.insert(candidate.clone());
        candidate
    }

    fn is_taken(&self, path: &Path) -> bool {
        // symlink_metadata so a dangling link still counts as occupied.
        self.reserved.contains(path) || fs::symlink_metadata(path).is_ok()
    }

    /// Moves `source` to `requested`, or to a disambiguated sibling of it.
    ///
    /// Missing parent directories are created. In dry-run mode only the
    /// resolution happens and the planned move is printed.
    pub fn relocate(&mut self, source: &Path, requested: &Path) -> RelocateResult<RelocationPlan> {
        let destination = self.resolve(requested);
        OutputFormatter::action(
            &format!("move {} -> {}", source.display(), destination.display()),
            self.mode,
        );

        let plan = RelocationPlan {
            source: source.to_path_buf(),
            requested: requested.to_path_buf(),
            destination,
        };

        if self.mode.is_dry_run() {
            return Ok(plan);
        }

        if let Some(parent) = plan.destination.parent() {
            ensure_directory(parent)?;
        }

        move_file(&plan.source, &plan.destination).map_err(|source| RelocateError::MoveFailed {
            from: plan.source.clone(),
            to: plan.destination.clone(),
            source,
        })?;
        debug!(
            "Moved {} -> {}",
            plan.source.display(),
            plan.destination.display()
        );

        Ok(plan)
    }
}

/// Creates `directory` and all of its missing ancestors.
pub fn ensure_directory(directory: &Path) -> RelocateResult<()> {
    fs::create_dir_all(directory).map_err(|source| RelocateError::DirectoryCreationFailed {
        path: directory.to_path_buf(),
        source,
    })
}

/// `dir/name.ext` with counter 2 becomes `dir/name__2.ext`.
///
/// Only the last extension is kept after the counter, so `a.tar.gz` becomes
/// `a.tar__2.gz`. Names without an extension just get the suffix.
pub fn disambiguated_name(path: &Path, counter: u64) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{}__{}.{}", stem, counter, ext.to_string_lossy()),
        None => format!("{}__{}", stem, counter),
    };
    path.with_file_name(file_name)
}

/// True if both paths name the same file, following symlinks and `..` when
/// both exist.
pub fn is_same_location(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Renames, falling back to copy and delete across filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        other => other,
    }
}
