//! Utility modules for the backup engine.

pub mod errors;
pub mod logger;
pub mod time;

pub use errors::{BackupError, Result};
