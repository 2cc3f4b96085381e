//! Lazy traversal of a directory tree.

use crate::config::{HIDDEN_MARKER, PathFilter};
use crate::entry::FileEntry;
use log::{debug, warn};
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

/// Yields the eligible regular files below a root, one at a time.
///
/// Directory entries are visited in file-name order so that two runs over the
/// same snapshot produce the same sequence. Symlinks are never followed and
/// never yielded. Entries that cannot be read or stat'ed are logged and
/// skipped.
pub struct TreeWalker<'a> {
    inner: Box<dyn Iterator<Item = FileEntry> + 'a>,
}

impl<'a> TreeWalker<'a> {
    pub fn new(root: &'a Path, filter: &'a PathFilter) -> Self {
        let include_hidden = filter.include_hidden();

        let inner = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            // Hidden directories are pruned before descent.
            .filter_entry(move |entry| include_hidden || !is_hidden_dir(entry))
            .filter_map(|result| match result {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(move |entry| filter.is_eligible_under(root, entry.path()))
            .filter_map(|entry| match entry.metadata() {
                Ok(metadata) => Some(FileEntry::with_metadata(entry.into_path(), metadata)),
                Err(e) => {
                    warn!("Skipping {}: {}", entry.path().display(), e);
                    None
                }
            })
            .inspect(|entry| debug!("Candidate: {}", entry.path().display()));

        Self {
            inner: Box::new(inner),
        }
    }
}

impl Iterator for TreeWalker<'_> {
    type Item = FileEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_string_lossy().starts_with(HIDDEN_MARKER)
}
