//! Reconstruction of the index by reading the archives themselves.
//!
//! Cost is proportional to the total archived bytes, since every archive has
//! to be decompressed end to end. This is the fallback when the side-file is
//! missing or unreadable, and the integrity check behind `verify`.

use super::{Index, Scope};
use crate::archive::{self, reader, ArchiveName};
use crate::utils::errors::Result;
use std::path::Path;
use tracing::{debug, info};

/// Archives of `name` in `dir` that fall within `scope`.
pub fn archives_in_scope(dir: &Path, name: &str, scope: Scope) -> Result<Vec<ArchiveName>> {
    let archives = archive::list_archives(dir, name)?;
    Ok(match scope {
        Scope::Full => archives,
        Scope::Chain => archive::current_chain(&archives).to_vec(),
    })
}

/// Read every archive in scope and record one entry per archived file.
pub fn rebuild(dir: &Path, name: &str, scope: Scope) -> Result<Index> {
    info!("Rebuilding index from {}...", dir.display());

    let archives = archives_in_scope(dir, name, scope)?;
    if scope == Scope::Chain {
        match archives.first() {
            Some(first) => debug!("Diff will be calculated from {}", first),
            None => debug!("No full backup found, baseline is empty"),
        }
    }

    let mut index = Index::new();
    for (i, archive) in archives.iter().enumerate() {
        debug!(
            "[{:3}%] Reading {}...",
            100 * i / archives.len(),
            archive.file_name()
        );

        let path = dir.join(archive.file_name());
        reader::for_each_file(&path, |file| {
            index.add(file.path, archive.file_name(), file.modified);
        })?;
    }

    info!(
        "Index rebuilt: {} paths, {} versions from {} archives",
        index.len(),
        index.version_count(),
        archives.len()
    );

    Ok(index)
}
