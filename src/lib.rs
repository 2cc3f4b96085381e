//! tidy - safe file tidying
//!
//! This library scans a directory tree and finds duplicate files by content,
//! organizes files into subdirectories by extension or modification date, and
//! encrypts a tree into an output directory. Every mutating action supports a
//! dry-run mode that resolves exactly the paths a real run would use.

pub mod actions;
pub mod cli;
pub mod config;
pub mod entry;
pub mod fingerprint;
pub mod grouper;
pub mod keystore;
pub mod output;
pub mod relocator;
pub mod report;
pub mod walker;

pub use actions::{ActionContext, DedupeMode, OrganizeMode};
pub use config::{ConfigError, FilterConfig, PathFilter};
pub use entry::FileEntry;
pub use fingerprint::{Blake3Fingerprinter, Digest, Fingerprinter};
pub use grouper::{DuplicateGroup, SizeBuckets, find_duplicates};
pub use keystore::{KeyMaterial, KeyStore, select_key_store};
pub use relocator::{RelocationPlan, RunMode, SafeRelocator};
pub use walker::TreeWalker;

pub use cli::{Cli, run_cli};
