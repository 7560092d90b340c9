//! Custom error types for the backup engine.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid pattern {pattern:?}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Discovery error at {}", path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive error in {}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Index file {} is corrupt: {message}", path.display())]
    IndexFile { path: PathBuf, message: String },

    #[error("Extraction of {entry} failed")]
    Extraction {
        entry: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unrecognized time {0:?} (expected DD.MM.YYYY[ HH:MM[:SS]] or YYYY-MM-DD[ HH:MM[:SS]])")]
    TimeFormat(String),

    #[error("Pipeline task failed")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, BackupError>;

/// Attaches the offending path to a raw I/O error.
pub(crate) trait IoResultExt<T> {
    fn at(self, path: &Path) -> Result<T>;
    fn in_archive(self, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|source| BackupError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn in_archive(self, path: &Path) -> Result<T> {
        self.map_err(|source| BackupError::Archive {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Render an error and all of its sources on one line.
pub fn display_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
