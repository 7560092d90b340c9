//! File discovery: pattern matching, directory walking and file metadata.

pub mod matcher;
pub mod metadata;
pub mod walker;

pub use matcher::Matcher;
pub use metadata::FileDescriptor;
pub use walker::{ScanSummary, Scanner};
