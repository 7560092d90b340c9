//! Persistence of the index as a compressed side-file, and the load strategy
//! that falls back to rebuilding from archives.
//!
//! The side-file lives next to the archives as `index.csv.zst`: zstd
//! compressed, one `path;archive;mtime-seconds` record per version, paths
//! sorted.

use super::{rebuild, Index};
use crate::archive::{self, reader, ArchiveName};
use crate::config::Config;
use crate::utils::errors::{display_chain, BackupError, IoResultExt, Result};
use crate::utils::time::from_unix_seconds;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const INDEX_FILE_NAME: &str = "index.csv.zst";

const DELIMITER: u8 = b';';

/// Which archives an index covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every archive: search, restore and verify
    Full,
    /// The most recent full archive and the incrementals after it: the
    /// baseline for an incremental run
    Chain,
}

/// Location and settings of one backup's index.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
    name: String,
    compression_level: i32,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>, compression_level: i32) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
            compression_level,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.target_dir(), config.name.clone(), config.compression_level)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn side_file(&self) -> PathBuf {
        self.dir.join(INDEX_FILE_NAME)
    }

    pub fn archives(&self) -> Result<Vec<ArchiveName>> {
        archive::list_archives(&self.dir, &self.name)
    }

    /// Load the index for `scope`, preferring the side-file.
    ///
    /// Side-file entries pointing at archives no longer on disk are dropped,
    /// and archives the side-file does not know about yet are read and merged,
    /// so the result matches a rebuild from disk.
    pub fn load(&self, scope: Scope) -> Result<Index> {
        let path = self.side_file();
        let mut index = match read_side_file(&path) {
            Ok(index) => index,
            Err(BackupError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                debug!("No index file at {}", path.display());
                return self.rebuild(scope);
            }
            Err(e) => {
                warn!("Index file read error: {}", display_chain(&e));
                return self.rebuild(scope);
            }
        };

        debug!("Index file contains {} paths", index.len());

        let archives = self.archives()?;
        self.reconcile(&mut index, &archives)?;

        if scope == Scope::Chain {
            restrict_to_chain(&mut index, &archives);
        }

        Ok(index)
    }

    /// Rebuild from the archives on disk.
    pub fn rebuild(&self, scope: Scope) -> Result<Index> {
        rebuild::rebuild(&self.dir, &self.name, scope)
    }

    pub fn save(&self, index: &Index) -> Result<()> {
        write_side_file(index, &self.side_file(), self.compression_level)?;
        debug!(
            "Saved index ({} paths, {} versions) to {}",
            index.len(),
            index.version_count(),
            self.side_file().display()
        );
        Ok(())
    }

    fn reconcile(&self, index: &mut Index, archives: &[ArchiveName]) -> Result<()> {
        let on_disk: HashSet<&str> = archives.iter().map(ArchiveName::file_name).collect();

        let before = index.version_count();
        index.retain_archives(|archive| on_disk.contains(archive));
        let dropped = before - index.version_count();
        if dropped > 0 {
            warn!("Dropped {} index entries referencing missing archives", dropped);
        }

        let known: HashSet<String> = index.archives().into_iter().map(str::to_owned).collect();
        for archive in archives.iter().filter(|a| !known.contains(a.file_name())) {
            info!("Archive {} is not in the index file, reading it", archive);
            reader::for_each_file(&self.dir.join(archive.file_name()), |file| {
                index.add(file.path, archive.file_name(), file.modified);
            })?;
        }

        Ok(())
    }
}

/// Drop every version outside the current generation chain.
pub fn restrict_to_chain(index: &mut Index, archives: &[ArchiveName]) {
    let chain: HashSet<&str> = archive::current_chain(archives)
        .iter()
        .map(ArchiveName::file_name)
        .collect();
    index.retain_archives(|archive| chain.contains(archive));
}

/// Write `index` to `path` atomically (temporary file, then rename).
pub fn write_side_file(index: &Index, path: &Path, compression_level: i32) -> Result<()> {
    let tmp = path.with_extension("zst.tmp");

    if let Err(e) = write_records(index, &tmp, compression_level) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e).at(&tmp);
    }

    std::fs::rename(&tmp, path).at(path)
}

fn write_records(index: &Index, path: &Path, compression_level: i32) -> io::Result<()> {
    let file = File::create(path)?;
    let mut encoder = zstd::Encoder::new(BufWriter::new(file), compression_level)?;
    encoder.include_checksum(true)?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .from_writer(encoder);

    for path in index.sorted_paths() {
        let Some(history) = index.get(path) else {
            continue;
        };
        for version in history.sorted() {
            let seconds = version.modified.timestamp().to_string();
            writer.write_record([path.as_str(), version.archive.as_str(), seconds.as_str()])?;
        }
    }

    let encoder = writer.into_inner().map_err(|e| e.into_error())?;
    let mut buffered = encoder.finish()?;
    buffered.flush()?;
    let file = buffered.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

/// Read a side-file written by [`write_side_file`].
pub fn read_side_file(path: &Path) -> Result<Index> {
    let file = File::open(path).at(path)?;
    let decoder = zstd::Decoder::new(file).at(path)?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .from_reader(decoder);

    let corrupt = |message: String| BackupError::IndexFile {
        path: path.to_path_buf(),
        message,
    };

    let mut index = Index::new();
    for (n, record) in reader.records().enumerate() {
        let record = record.map_err(|e| corrupt(format!("record {}: {}", n + 1, e)))?;
        if record.len() != 3 {
            return Err(corrupt(format!(
                "record {}: expected 3 fields, found {}",
                n + 1,
                record.len()
            )));
        }

        let modified = record[2]
            .parse::<i64>()
            .ok()
            .and_then(from_unix_seconds)
            .ok_or_else(|| corrupt(format!("record {}: bad timestamp {:?}", n + 1, &record[2])))?;

        index.add(&record[0], &record[1], modified);
    }

    Ok(index)
}
