//! Cross-archive index of every archived version of every file.
//!
//! Maps an archive-internal path to its [`VersionHistory`]. The index is
//! loaded from the compressed side-file when possible and rebuilt from the
//! archives themselves otherwise (see [`IndexStore`]).

pub mod rebuild;
pub mod store;

pub use store::{IndexStore, Scope, INDEX_FILE_NAME};

use crate::fs::matcher::PatternSet;
use crate::utils::errors::Result;
use crate::utils::time::{whole_seconds, DISPLAY_FORMAT};
use chrono::{DateTime, Local, Utc};
use std::collections::{BTreeSet, HashMap};
use std::io::Write;

/// One archived version of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// File name of the archive holding this version
    pub archive: String,

    /// Modification time at archiving, whole seconds
    pub modified: DateTime<Utc>,
}

/// All known versions of a single path. Order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionHistory(Vec<IndexEntry>);

impl VersionHistory {
    /// Version with the greatest modification time (first seen on ties).
    pub fn latest(&self) -> Option<&IndexEntry> {
        self.0
            .iter()
            .reduce(|best, entry| if entry.modified > best.modified { entry } else { best })
    }

    /// Closest version strictly before `t`.
    pub fn as_of(&self, t: DateTime<Utc>) -> Option<&IndexEntry> {
        self.0
            .iter()
            .filter(|entry| entry.modified - t < chrono::Duration::zero())
            .reduce(|best, entry| {
                if entry.modified - t > best.modified - t {
                    entry
                } else {
                    best
                }
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Versions ordered by modification time, then archive name.
    pub fn sorted(&self) -> Vec<&IndexEntry> {
        let mut versions: Vec<&IndexEntry> = self.0.iter().collect();
        versions.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.archive.cmp(&b.archive)));
        versions
    }

    fn push(&mut self, entry: IndexEntry) {
        if !self.0.iter().any(|e| e.archive == entry.archive) {
            self.0.push(entry);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    files: HashMap<String, VersionHistory>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a version. A second entry for the same (path, archive) pair is
    /// ignored: an archive holds at most one version of a path.
    pub fn add(&mut self, path: impl Into<String>, archive: impl Into<String>, modified: DateTime<Utc>) {
        self.files.entry(path.into()).or_default().push(IndexEntry {
            archive: archive.into(),
            modified: whole_seconds(modified),
        });
    }

    pub fn get(&self, path: &str) -> Option<&VersionHistory> {
        self.files.get(path)
    }

    /// Number of distinct paths
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of versions across all paths
    pub fn version_count(&self) -> usize {
        self.files.values().map(VersionHistory::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VersionHistory)> {
        self.files.iter()
    }

    /// Paths in byte order.
    pub fn sorted_paths(&self) -> Vec<&String> {
        let mut paths: Vec<&String> = self.files.keys().collect();
        paths.sort();
        paths
    }

    /// Version of `path` in effect just before `t`.
    pub fn resolve(&self, path: &str, t: DateTime<Utc>) -> Option<&IndexEntry> {
        self.files.get(path).and_then(|history| history.as_of(t))
    }

    /// Names of every archive referenced by at least one entry.
    pub fn archives(&self) -> BTreeSet<&str> {
        self.files
            .values()
            .flat_map(VersionHistory::iter)
            .map(|entry| entry.archive.as_str())
            .collect()
    }

    /// Keep only versions stored in archives accepted by `keep`; paths left
    /// without versions disappear.
    pub fn retain_archives(&mut self, mut keep: impl FnMut(&str) -> bool) {
        for history in self.files.values_mut() {
            history.0.retain(|entry| keep(&entry.archive));
        }
        self.files.retain(|_, history| !history.is_empty());
    }

    /// Sub-index of paths matching `pattern`, compared case-insensitively.
    pub fn search(&self, pattern: &str) -> Result<Index> {
        let pattern = PatternSet::search(pattern)?;
        let files = self
            .files
            .iter()
            .filter(|(path, _)| pattern.is_match(path))
            .map(|(path, history)| (path.clone(), history.clone()))
            .collect();
        Ok(Index { files })
    }

    /// Every (path, archive, seconds) triple, sorted.
    pub fn triples(&self) -> Vec<(String, String, i64)> {
        let mut triples: Vec<_> = self
            .files
            .iter()
            .flat_map(|(path, history)| {
                history
                    .iter()
                    .map(move |e| (path.clone(), e.archive.clone(), e.modified.timestamp()))
            })
            .collect();
        triples.sort();
        triples
    }

    /// Human-readable listing: each path followed by its versions.
    pub fn render(&self, w: &mut impl Write) -> std::io::Result<()> {
        for path in self.sorted_paths() {
            writeln!(w, "{path}")?;
            for version in self.files[path].sorted() {
                writeln!(
                    w,
                    "\t{} {}",
                    version.modified.with_timezone(&Local).format(DISPLAY_FORMAT),
                    version.archive
                )?;
            }
        }
        Ok(())
    }
}
