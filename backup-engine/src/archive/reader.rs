//! Sequential access to archive contents.

use crate::utils::errors::{IoResultExt, Result};
use crate::utils::time::from_unix_seconds;
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub type ArchiveReader = tar::Archive<zstd::Decoder<'static, BufReader<File>>>;

/// Header fields of one archived file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedFile {
    pub path: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Open an archive for a single forward pass.
pub fn open(path: &Path) -> Result<ArchiveReader> {
    let file = File::open(path).in_archive(path)?;
    let decoder = zstd::Decoder::new(file).in_archive(path)?;
    Ok(tar::Archive::new(decoder))
}

/// Internal path of an entry, exactly as stored (long names included).
pub fn entry_path<R: std::io::Read>(entry: &tar::Entry<'_, R>) -> String {
    String::from_utf8_lossy(&entry.path_bytes()).into_owned()
}

/// Walk every file entry of the archive at `path`, decompressing the whole
/// stream. The first structural error (bad compression frame, broken tar
/// header) is returned.
pub fn for_each_file(path: &Path, mut f: impl FnMut(ArchivedFile)) -> Result<()> {
    let mut archive = open(path)?;

    for entry in archive.entries().in_archive(path)? {
        let entry = entry.in_archive(path)?;
        if entry.header().entry_type().is_dir() {
            continue;
        }

        let header = entry.header();
        let mtime = header.mtime().in_archive(path)?;
        let modified = i64::try_from(mtime)
            .ok()
            .and_then(from_unix_seconds)
            .unwrap_or_default();

        f(ArchivedFile {
            path: entry_path(&entry),
            size: header.size().in_archive(path)?,
            modified,
        });
    }

    Ok(())
}

/// Collect the file entries of an archive.
pub fn list_files(path: &Path) -> Result<Vec<ArchivedFile>> {
    let mut files = Vec::new();
    for_each_file(path, |file| files.push(file))?;
    Ok(files)
}
