//! Size-then-fingerprint duplicate detection.
//!
//! Files are bucketed by exact byte size first. Only buckets with two or more
//! members are fingerprinted, so a file whose size is unique in the tree is
//! never read. Within a bucket, files are grouped by digest and groups with a
//! single member are dropped.

use crate::entry::FileEntry;
use crate::fingerprint::{Digest, Fingerprinter};
use log::{debug, warn};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Files keyed by their exact size in bytes.
#[derive(Debug, Default)]
pub struct SizeBuckets {
    buckets: BTreeMap<u64, Vec<FileEntry>>,
}

impl SizeBuckets {
    /// Buckets `entries` by size. Entries that fail to stat are skipped.
    pub fn build(entries: impl IntoIterator<Item = FileEntry>) -> Self {
        let mut buckets: BTreeMap<u64, Vec<FileEntry>> = BTreeMap::new();
        for entry in entries {
            match entry.size() {
                Ok(size) => buckets.entry(size).or_default().push(entry),
                Err(e) => warn!("Skipping {}: {}", entry.path().display(), e),
            }
        }
        Self { buckets }
    }

    /// Number of distinct sizes seen.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn get(&self, size: u64) -> Option<&[FileEntry]> {
        self.buckets.get(&size).map(Vec::as_slice)
    }

    /// Total number of files that share their size with at least one other.
    pub fn candidate_count(&self) -> usize {
        self.buckets
            .values()
            .filter(|entries| entries.len() > 1)
            .map(Vec::len)
            .sum()
    }

    /// Consumes the buckets, keeping only those with two or more files.
    pub fn into_candidates(self) -> impl Iterator<Item = (u64, Vec<FileEntry>)> {
        self.buckets
            .into_iter()
            .filter(|(_, entries)| entries.len() > 1)
    }
}

/// A set of two or more files with identical content.
///
/// Members are ordered by path length, then lexicographically; the first
/// member is the one to keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub digest: Digest,
    pub size: u64,
    members: Vec<PathBuf>,
}

impl DuplicateGroup {
    fn new(digest: Digest, size: u64, mut members: Vec<PathBuf>) -> Self {
        members.sort_by(|a, b| keep_order(a, b));
        Self {
            digest,
            size,
            members,
        }
    }

    /// The member to retain: shortest path, ties broken lexicographically.
    pub fn keeper(&self) -> &Path {
        &self.members[0]
    }

    /// Every member except the keeper.
    pub fn duplicates(&self) -> &[PathBuf] {
        &self.members[1..]
    }

    pub fn members(&self) -> &[PathBuf] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

fn keep_order(a: &Path, b: &Path) -> Ordering {
    a.as_os_str()
        .len()
        .cmp(&b.as_os_str().len())
        .then_with(|| a.cmp(b))
}

/// Finds every duplicate set among `entries`.
pub fn find_duplicates<F>(
    entries: impl IntoIterator<Item = FileEntry>,
    fingerprinter: &F,
) -> Vec<DuplicateGroup>
where
    F: Fingerprinter + ?Sized,
{
    group_candidates(SizeBuckets::build(entries), fingerprinter, |_| {})
}

/// Fingerprints every bucket of two or more files and returns the duplicate
/// sets, ordered by their keeper.
///
/// `on_hashed` is called after each file is fingerprinted, or fails to be;
/// it runs [`SizeBuckets::candidate_count`] times in total.
pub fn group_candidates<F>(
    buckets: SizeBuckets,
    fingerprinter: &F,
    mut on_hashed: impl FnMut(&Path),
) -> Vec<DuplicateGroup>
where
    F: Fingerprinter + ?Sized,
{
    debug!(
        "{} distinct sizes, {} files need hashing",
        buckets.len(),
        buckets.candidate_count()
    );

    let mut groups = Vec::new();
    for (size, entries) in buckets.into_candidates() {
        let mut by_digest: HashMap<Digest, Vec<PathBuf>> = HashMap::new();
        for entry in entries {
            let result = fingerprinter.fingerprint(entry.path());
            on_hashed(entry.path());
            match result {
                Ok(digest) => by_digest.entry(digest).or_default().push(entry.into_path()),
                Err(e) => warn!("Skipping {}: {}", entry.path().display(), e),
            }
        }

        groups.extend(
            by_digest
                .into_iter()
                .filter(|(_, members)| members.len() > 1)
                .map(|(digest, members)| DuplicateGroup::new(digest, size, members)),
        );
    }

    groups.sort_by(|a, b| keep_order(a.keeper(), b.keeper()));
    groups
}
