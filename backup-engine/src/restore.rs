//! Point-in-time restore.
//!
//! Planning resolves every matching path to the version in effect at the
//! requested time and groups the results by archive, so execution opens and
//! decompresses each archive once.

use crate::archive::reader;
use crate::fs::metadata::sanitize;
use crate::index::Index;
use crate::transfer::progress::format_bytes;
use crate::utils::errors::{BackupError, IoResultExt, Result};
use crate::utils::time::from_unix_seconds;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Totals of an executed plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub files_restored: usize,
    pub bytes_restored: u64,
    /// Planned paths that were not found in their archive
    pub missing: Vec<String>,
}

/// Archive file name to the internal paths to take from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionPlan {
    archives: BTreeMap<String, BTreeSet<String>>,
}

impl ExtractionPlan {
    /// Plan the restore of every path matching `pattern` (case-insensitive)
    /// as it was just before `as_of`. Paths with no earlier version are left out.
    pub fn build(index: &Index, pattern: &str, as_of: DateTime<Utc>) -> Result<Self> {
        let mut plan = Self::default();

        for (path, history) in index.search(pattern)?.iter() {
            match history.as_of(as_of) {
                Some(version) => {
                    plan.archives
                        .entry(version.archive.clone())
                        .or_default()
                        .insert(path.clone());
                }
                None => debug!("No version of {} before {}", path, as_of),
            }
        }

        Ok(plan)
    }

    pub fn is_empty(&self) -> bool {
        self.archives.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.archives.values().map(BTreeSet::len).sum()
    }

    pub fn archives(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.archives.iter().map(|(archive, paths)| (archive.as_str(), paths))
    }

    /// Extract the planned files from the archives in `archive_dir` into
    /// `destination`. The first failure aborts; files already written stay.
    pub fn execute(&self, archive_dir: &Path, destination: &Path) -> Result<RestoreSummary> {
        let mut summary = RestoreSummary::default();

        info!(
            "Restoring {} files from {} archives to {}",
            self.file_count(),
            self.archives.len(),
            destination.display()
        );

        for (archive, paths) in &self.archives {
            let mut pending = paths.clone();
            extract_from(&archive_dir.join(archive), &mut pending, destination, &mut summary)?;

            for path in pending {
                warn!("{} not found in {}", path, archive);
                summary.missing.push(path);
            }
        }

        info!(
            "Restored {} files, {}",
            summary.files_restored,
            format_bytes(summary.bytes_restored)
        );

        Ok(summary)
    }
}

fn extract_from(
    archive_path: &Path,
    pending: &mut BTreeSet<String>,
    destination: &Path,
    summary: &mut RestoreSummary,
) -> Result<()> {
    debug!("Reading {}", archive_path.display());

    let mut archive = reader::open(archive_path)?;
    for entry in archive.entries().in_archive(archive_path)? {
        if pending.is_empty() {
            break;
        }

        let mut entry = entry.in_archive(archive_path)?;
        let internal = reader::entry_path(&entry);
        if !pending.remove(&internal) {
            continue;
        }

        let target = destination.join(sanitize(&internal));
        let failed = |source: io::Error| BackupError::Extraction {
            entry: internal.clone(),
            source,
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(failed)?;
        }

        let mut file = File::create(&target).map_err(failed)?;
        let bytes = io::copy(&mut entry, &mut file).map_err(failed)?;

        let mtime = entry.header().mtime().map_err(failed)?;
        if let Some(modified) = i64::try_from(mtime).ok().and_then(from_unix_seconds) {
            file.set_modified(SystemTime::from(modified)).map_err(failed)?;
        }

        debug!("Restored {}", target.display());
        summary.files_restored += 1;
        summary.bytes_restored += bytes;
    }

    Ok(())
}
