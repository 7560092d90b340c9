//! File descriptors produced by discovery and consumed by the archive writer.

use crate::utils::time::from_system_time;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// A discovered file, alive for one pipeline traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Path on the local filesystem
    pub source_path: PathBuf,

    /// Forward-slash path used inside archives and as the index key
    pub archive_path: String,

    /// File size in bytes
    pub size: u64,

    /// Last modified time, whole seconds
    pub modified: DateTime<Utc>,
}

impl FileDescriptor {
    /// Stat `path` (following symlinks).
    ///
    /// Returns `None` for directories, so a symlink to a directory met during
    /// a walk is skipped like the directory itself.
    pub fn from_path(path: &Path) -> std::io::Result<Option<Self>> {
        let metadata = fs::metadata(path)?;
        if metadata.is_dir() {
            return Ok(None);
        }

        Ok(Some(Self {
            source_path: path.to_path_buf(),
            archive_path: archive_path(path),
            size: metadata.len(),
            modified: from_system_time(metadata.modified()?),
        }))
    }
}

/// Forward-slash form of a native path, as seen by path patterns.
pub fn to_slash(path: &Path) -> String {
    let s = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '\\' {
        s.replace('\\', "/")
    } else {
        s.into_owned()
    }
}

/// Archive-internal path for a source file.
///
/// Tar entries must be relative, so the root (and on Windows the drive
/// separator) is dropped: `/home/me/a.txt` becomes `home/me/a.txt`.
pub fn archive_path(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => {
                parts.push(prefix.as_os_str().to_string_lossy().replace(':', ""))
            }
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(name) => parts.push(name.to_string_lossy().into_owned()),
        }
    }
    parts.join("/")
}

/// Turn an archive-internal path into a relative path that stays below a
/// restore destination: drive separators and empty, `.` and `..` segments
/// are removed.
pub fn sanitize(internal: &str) -> PathBuf {
    internal
        .replace(':', "")
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .collect()
}
