//! Streams changed files into a new compressed archive.
//!
//! The container is a GNU tar stream wrapped in a zstd encoder. A run either
//! finalizes a complete archive or deletes it; a zero-file run leaves nothing
//! behind.

use crate::fs::metadata::FileDescriptor;
use crate::fs::walker::DescriptorStream;
use crate::index::IndexEntry;
use crate::transfer::progress::{format_bytes, ProgressTracker};
use crate::utils::errors::{display_chain, BackupError, IoResultExt, Result};
use crate::utils::time::from_system_time;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

type Container = tar::Builder<zstd::Encoder<'static, BufWriter<File>>>;

/// Outcome of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// File name of the finalized archive, `None` when nothing was written
    pub archive: Option<String>,
    pub files_written: usize,
    pub bytes_written: u64,
    /// Files skipped because of an error
    pub errors: usize,
    /// One entry per written file, keyed by archive-internal path
    pub entries: Vec<(String, IndexEntry)>,
}

/// Why a single file could not be appended.
enum AppendError {
    /// Nothing reached the container yet; the file can be skipped.
    Source(BackupError),
    /// The container stream is damaged; the archive must be discarded.
    Container(BackupError),
}

pub struct ArchiveWriter {
    path: PathBuf,
    file_name: String,
    container: Option<Container>,
    stop_on_any_error: bool,
    seen: HashSet<String>,
    progress: ProgressTracker,
    errors: usize,
    entries: Vec<(String, IndexEntry)>,
}

impl ArchiveWriter {
    /// Create the archive file at `path`. Fails if the file already exists.
    pub fn create(path: &Path, compression_level: i32, stop_on_any_error: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).at(parent)?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .in_archive(path)?;

        let container = Self::container(file, compression_level);
        let container = match container {
            Ok(container) => container,
            Err(e) => {
                let _ = std::fs::remove_file(path);
                return Err(e).in_archive(path);
            }
        };

        info!("Creating archive {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            container: Some(container),
            stop_on_any_error,
            seen: HashSet::new(),
            progress: ProgressTracker::new(),
            errors: 0,
            entries: Vec::new(),
        })
    }

    fn container(file: File, compression_level: i32) -> io::Result<Container> {
        let mut encoder = zstd::Encoder::new(BufWriter::new(file), compression_level)?;
        encoder.include_checksum(true)?;
        Ok(tar::Builder::new(encoder))
    }

    /// Drain `stream` into the archive and finalize it.
    ///
    /// An `Err` item from upstream (a strict discovery failure) aborts the run.
    /// Blocking: call from the blocking pool.
    pub fn write_stream(mut self, mut stream: DescriptorStream) -> Result<WriteSummary> {
        while let Some(item) = stream.blocking_recv() {
            let descriptor = match item {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    self.abort();
                    return Err(e);
                }
            };

            match self.append(&descriptor) {
                Ok(()) => {}
                Err(AppendError::Source(e)) => {
                    self.errors += 1;
                    warn!(
                        "Failed to add {}: {}",
                        descriptor.source_path.display(),
                        display_chain(&e)
                    );
                    if self.stop_on_any_error {
                        self.abort();
                        return Err(e);
                    }
                }
                Err(AppendError::Container(e)) => {
                    self.abort();
                    return Err(e);
                }
            }
        }

        self.finish()
    }

    fn append(&mut self, descriptor: &FileDescriptor) -> std::result::Result<(), AppendError> {
        if !self.seen.insert(descriptor.archive_path.clone()) {
            debug!("Skipping duplicate {}", descriptor.archive_path);
            return Ok(());
        }

        debug!("Adding {}", descriptor.source_path.display());

        let source = &descriptor.source_path;
        let mut file = File::open(source).at(source).map_err(AppendError::Source)?;
        let metadata = file.metadata().at(source).map_err(AppendError::Source)?;
        let modified = metadata
            .modified()
            .map(from_system_time)
            .at(source)
            .map_err(AppendError::Source)?;
        let size = metadata.len();

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(size);
        header.set_mtime(modified.timestamp().max(0) as u64);
        header.set_mode(file_mode(&metadata));

        // The header fixes the size: a file changing under us must not
        // desync the container, so copy exactly `size` bytes.
        let data = (&mut file).take(size).chain(io::repeat(0)).take(size);

        let container = self
            .container
            .as_mut()
            .ok_or_else(|| AppendError::Container(closed(&self.path)))?;
        container
            .append_data(&mut header, &descriptor.archive_path, data)
            .in_archive(&self.path)
            .map_err(AppendError::Container)?;

        self.entries.push((
            descriptor.archive_path.clone(),
            IndexEntry {
                archive: self.file_name.clone(),
                modified,
            },
        ));

        if self.progress.record(size) {
            debug!(
                "Added {} files, {}...",
                self.progress.files(),
                format_bytes(self.progress.bytes())
            );
        }

        Ok(())
    }

    /// Close tar, then zstd, then the file; delete the archive if empty.
    fn finish(mut self) -> Result<WriteSummary> {
        let files_written = self.entries.len();
        let bytes_written = self.progress.bytes();

        if files_written == 0 {
            self.abort();
            info!("No new or modified files, archive discarded");
            return Ok(WriteSummary {
                archive: None,
                files_written: 0,
                bytes_written: 0,
                errors: self.errors,
                entries: Vec::new(),
            });
        }

        let Some(container) = self.container.take() else {
            return Err(closed(&self.path));
        };

        let finalized = container
            .into_inner()
            .and_then(|encoder| encoder.finish())
            .and_then(|writer| writer.into_inner().map_err(|e| e.into_error()))
            .and_then(|file| file.sync_all());

        if let Err(e) = finalized {
            self.abort();
            return Err(e).in_archive(&self.path);
        }

        info!(
            "Added {} files, {} in {}",
            files_written,
            format_bytes(bytes_written),
            crate::transfer::progress::format_duration(self.progress.elapsed().as_secs())
        );

        Ok(WriteSummary {
            archive: Some(self.file_name.clone()),
            files_written,
            bytes_written,
            errors: self.errors,
            entries: std::mem::take(&mut self.entries),
        })
    }

    /// Drop the container and delete the archive file.
    fn abort(&mut self) {
        drop(self.container.take());
        self.entries.clear();
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove archive {}: {}", self.path.display(), e);
            }
        }
    }
}

impl Drop for ArchiveWriter {
    fn drop(&mut self) {
        // An archive still open here was never finalized.
        if self.container.is_some() {
            self.abort();
        }
    }
}

/// Create the archive at `path` and drain `stream` into it.
pub fn write(
    stream: DescriptorStream,
    path: &Path,
    compression_level: i32,
    stop_on_any_error: bool,
) -> Result<WriteSummary> {
    ArchiveWriter::create(path, compression_level, stop_on_any_error)?.write_stream(stream)
}

fn closed(path: &Path) -> BackupError {
    BackupError::Archive {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::Other, "archive already closed"),
    }
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}
