//! Archive files: naming, discovery and the generation chain.
//!
//! Every run writes `<name>_<YYYY-MM-DD_HH-MM-SS><f|i>.tar.zst`. The embedded
//! timestamp sorts lexicographically, so file name order is creation order.

pub mod reader;
pub mod writer;

use crate::utils::errors::{IoResultExt, Result};
use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Timelike};
use std::fmt;
use std::path::Path;

pub const ARCHIVE_EXTENSION: &str = ".tar.zst";

/// Timestamp embedded in archive file names (local time).
pub const FILE_NAME_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BackupKind {
    Full,
    Incremental,
}

impl BackupKind {
    pub fn suffix(self) -> char {
        match self {
            BackupKind::Full => 'f',
            BackupKind::Incremental => 'i',
        }
    }

    fn from_suffix(c: char) -> Option<Self> {
        match c {
            'f' => Some(BackupKind::Full),
            'i' => Some(BackupKind::Incremental),
            _ => None,
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupKind::Full => write!(f, "full"),
            BackupKind::Incremental => write!(f, "incremental"),
        }
    }
}

/// Parsed archive file name. Orders by file name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArchiveName {
    file_name: String,
    created: NaiveDateTime,
    kind: BackupKind,
}

impl ArchiveName {
    /// Name an archive created at local wall-clock time `created`.
    pub fn new(name: &str, created: NaiveDateTime, kind: BackupKind) -> Self {
        let created = created.with_nanosecond(0).unwrap_or(created);
        let file_name = format!(
            "{}_{}{}{}",
            name,
            created.format(FILE_NAME_TIME_FORMAT),
            kind.suffix(),
            ARCHIVE_EXTENSION
        );

        Self {
            file_name,
            created,
            kind,
        }
    }

    /// Parse `file_name` as an archive of backup `name`; `None` for anything else.
    pub fn parse(name: &str, file_name: &str) -> Option<Self> {
        let rest = file_name
            .strip_prefix(name)?
            .strip_prefix('_')?
            .strip_suffix(ARCHIVE_EXTENSION)?;

        let kind = BackupKind::from_suffix(rest.chars().last()?)?;
        let stamp = &rest[..rest.len() - 1];
        let created = NaiveDateTime::parse_from_str(stamp, FILE_NAME_TIME_FORMAT).ok()?;

        Some(Self {
            file_name: file_name.to_string(),
            created,
            kind,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn kind(&self) -> BackupKind {
        self.kind
    }

    /// Creation time, local.
    pub fn created(&self) -> Option<DateTime<Local>> {
        Local.from_local_datetime(&self.created).earliest()
    }
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name)
    }
}

/// Every archive of backup `name` in `dir`, sorted by file name.
pub fn list_archives(dir: &Path, name: &str) -> Result<Vec<ArchiveName>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut archives = Vec::new();
    for entry in std::fs::read_dir(dir).at(dir)? {
        let entry = entry.at(dir)?;
        if !entry.file_type().at(&entry.path())?.is_file() {
            continue;
        }
        if let Some(archive) = entry
            .file_name()
            .to_str()
            .and_then(|file_name| ArchiveName::parse(name, file_name))
        {
            archives.push(archive);
        }
    }

    archives.sort();
    Ok(archives)
}

/// The current generation chain: the most recent full archive and every
/// archive after it. Empty when no full archive exists.
pub fn current_chain(archives: &[ArchiveName]) -> &[ArchiveName] {
    match archives.iter().rposition(|a| a.kind == BackupKind::Full) {
        Some(start) => &archives[start..],
        None => &[],
    }
}

/// Wall-clock creation time for a new archive: `now`, or one second after the
/// newest existing name if that is not earlier.
///
/// Compared on the local time embedded in names rather than on instants, so
/// name order stays creation order within a second and across a DST fall-back.
pub fn next_creation_time(existing: &[ArchiveName], now: DateTime<Local>) -> NaiveDateTime {
    let now = now.naive_local();
    let now = now.with_nanosecond(0).unwrap_or(now);

    match existing.iter().map(|archive| archive.created).max() {
        Some(newest) if now <= newest => newest + Duration::seconds(1),
        _ => now,
    }
}
