//! Backup executor - orchestrates backup, search, restore and verify runs.
//!
//! A backup run is a three-stage pipeline:
//! - Scanner: walks the roots on the blocking pool
//! - Planner: drops files already in the incremental baseline
//! - Writer: streams the rest into a new archive on the blocking pool
//!
//! Stages are joined by bounded channels. Afterwards the new entries are
//! appended to the index and the side-file is rewritten.

pub mod planner;

use crate::archive::{self, writer, ArchiveName, BackupKind};
use crate::config::Config;
use crate::fs::Scanner;
use crate::index::store::{read_side_file, restrict_to_chain};
use crate::index::{Index, IndexStore, Scope};
use crate::restore::{ExtractionPlan, RestoreSummary};
use crate::transfer::progress::{format_bytes, format_duration};
use crate::utils::errors::{display_chain, Result};
use chrono::{DateTime, Local, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Backup execution result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupResult {
    /// Kind actually run; an incremental without a full archive runs full
    pub kind: BackupKind,
    /// Archive written, `None` when there was nothing to back up
    pub archive: Option<String>,
    pub files_found: usize,
    pub files_written: usize,
    pub bytes_written: u64,
    pub unchanged_files: usize,
    /// Discovery and per-file errors that were skipped
    pub errors: usize,
    pub duration_secs: u64,
}

/// Outcome of an integrity check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub archives: usize,
    pub paths: usize,
    pub versions: usize,
    /// Whether the side-file agrees with the archives; `None` if there is no
    /// readable side-file
    pub index_file_matches: Option<bool>,
}

/// Main backup executor
#[derive(Debug, Clone)]
pub struct BackupExecutor {
    config: Arc<Config>,
    store: IndexStore,
}

impl BackupExecutor {
    pub fn new(config: Config) -> Self {
        let store = IndexStore::from_config(&config);
        Self {
            config: Arc::new(config),
            store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn target_dir(&self) -> &Path {
        self.store.dir()
    }

    /// Run a backup of the requested kind.
    pub async fn execute(&self, requested: BackupKind) -> Result<BackupResult> {
        let start_time = Instant::now();
        info!("Starting {} backup of {:?}", requested, self.config.name);

        let scanner = Scanner::from_config(&self.config)?;

        let store = self.store.clone();
        let (archives, mut index) = tokio::task::spawn_blocking(move || -> Result<_> {
            Ok((store.archives()?, store.load(Scope::Full)?))
        })
        .await??;

        let kind = match requested {
            BackupKind::Incremental if archive::current_chain(&archives).is_empty() => {
                info!("No full backup found, running a full backup instead");
                BackupKind::Full
            }
            kind => kind,
        };

        let baseline = match kind {
            BackupKind::Full => None,
            BackupKind::Incremental => {
                let mut baseline = index.clone();
                restrict_to_chain(&mut baseline, &archives);
                info!("Incremental baseline holds {} paths", baseline.len());
                Some(Arc::new(baseline))
            }
        };

        let created = archive::next_creation_time(&archives, Local::now());
        let name = ArchiveName::new(&self.config.name, created, kind);
        let path = self.target_dir().join(name.file_name());

        let (scanned, scan_handle) = scanner.spawn();
        let (planned, plan_handle) = planner::spawn(scanned, baseline);
        let write_handle = {
            let path = path.clone();
            let level = self.config.compression_level;
            let stop_on_any_error = self.config.stop_on_any_error;
            tokio::task::spawn_blocking(move || writer::write(planned, &path, level, stop_on_any_error))
        };

        // The writer finishing (or failing) closes the pipeline upstream.
        let written = write_handle.await?;
        let plan = plan_handle.await?;
        let scan = scan_handle.await?;
        let written = written?;

        if written.archive.is_some() {
            for (internal, entry) in &written.entries {
                index.add(internal.as_str(), entry.archive.as_str(), entry.modified);
            }

            let store = self.store.clone();
            let saved = tokio::task::spawn_blocking(move || store.save(&index)).await?;
            if let Err(e) = saved {
                // The archive is complete; the next load merges it back in.
                warn!("Failed to save index: {}", display_chain(&e));
            }
        }

        let result = BackupResult {
            kind,
            archive: written.archive,
            files_found: scan.files_found,
            files_written: written.files_written,
            bytes_written: written.bytes_written,
            unchanged_files: plan.unchanged,
            errors: scan.errors + written.errors,
            duration_secs: start_time.elapsed().as_secs(),
        };

        match &result.archive {
            Some(archive) => info!(
                "Backup completed: {} ({} files, {}, {} unchanged) in {}",
                archive,
                result.files_written,
                format_bytes(result.bytes_written),
                result.unchanged_files,
                format_duration(result.duration_secs)
            ),
            None => info!(
                "Backup completed: nothing to archive ({} files unchanged)",
                result.unchanged_files
            ),
        }
        if result.errors > 0 {
            warn!("{} file(s) skipped because of errors", result.errors);
        }

        Ok(result)
    }

    /// Every archived path matching `pattern`, case-insensitively.
    pub async fn search(&self, pattern: &str) -> Result<Index> {
        let index = self.load_full().await?;
        let found = index.search(pattern)?;
        info!("{} of {} paths match {:?}", found.len(), index.len(), pattern);
        Ok(found)
    }

    /// Restore every path matching `pattern` as it was just before `as_of`
    /// into `destination`.
    pub async fn restore(
        &self,
        pattern: &str,
        as_of: DateTime<Local>,
        destination: &Path,
    ) -> Result<RestoreSummary> {
        let index = self.load_full().await?;
        let plan = ExtractionPlan::build(&index, pattern, as_of.with_timezone(&Utc))?;
        if plan.is_empty() {
            info!("Nothing to restore for {:?} before {}", pattern, as_of);
            return Ok(RestoreSummary::default());
        }

        let archive_dir = self.target_dir().to_path_buf();
        let destination: PathBuf = destination.to_path_buf();
        tokio::task::spawn_blocking(move || plan.execute(&archive_dir, &destination)).await?
    }

    /// Read every archive end to end and compare the result with the side-file.
    pub async fn verify(&self) -> Result<VerifyReport> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || {
            let archives = store.archives()?;
            let rebuilt = store.rebuild(Scope::Full)?;

            let index_file_matches = match read_side_file(&store.side_file()) {
                Ok(saved) => {
                    let matches = saved.triples() == rebuilt.triples();
                    if !matches {
                        warn!("Index file differs from archive contents");
                    }
                    Some(matches)
                }
                Err(e) => {
                    warn!("Index file not checked: {}", display_chain(&e));
                    None
                }
            };

            Ok(VerifyReport {
                archives: archives.len(),
                paths: rebuilt.len(),
                versions: rebuilt.version_count(),
                index_file_matches,
            })
        })
        .await?
    }

    async fn load_full(&self) -> Result<Index> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.load(Scope::Full)).await?
    }
}
