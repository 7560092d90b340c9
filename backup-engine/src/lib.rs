//! Backup Engine Library
//!
//! Local incremental backups into zstd-compressed tar archives, with a
//! cross-archive index for search and point-in-time restore.

pub mod archive;
pub mod config;
pub mod executor;
pub mod fs;
pub mod index;
pub mod restore;
pub mod transfer;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use archive::BackupKind;
pub use config::Config;
pub use executor::{BackupExecutor, BackupResult, VerifyReport};
pub use utils::errors::BackupError;
pub use utils::errors::Result;
