//! Directory traversal feeding the backup pipeline.
//!
//! The scanner walks every configured root, applies the root's [`Matcher`]
//! and streams matching files into a bounded channel. It runs on the blocking
//! pool and stops as soon as the receiving side goes away.

use super::matcher::Matcher;
use super::metadata::{to_slash, FileDescriptor};
use crate::config::Config;
use crate::utils::errors::{BackupError, Result};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Capacity of each pipeline channel.
pub const CHANNEL_CAPACITY: usize = 64;

/// Items flowing through the pipeline. An `Err` ends the stream.
pub type DescriptorStream = mpsc::Receiver<Result<FileDescriptor>>;

/// One configured location to walk
#[derive(Debug, Clone)]
pub struct ScanRoot {
    pub path: PathBuf,
    pub recursive: bool,
    pub matcher: Matcher,
}

/// Totals reported once the walk has ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub files_found: usize,
    pub bytes_found: u64,
    pub errors: usize,
    /// Set when the receiver hung up before the walk finished
    pub interrupted: bool,
}

#[derive(Debug, Clone)]
pub struct Scanner {
    roots: Vec<ScanRoot>,
    stop_on_any_error: bool,
}

impl Scanner {
    pub fn new(roots: Vec<ScanRoot>, stop_on_any_error: bool) -> Self {
        Self {
            roots,
            stop_on_any_error,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let roots = config
            .roots
            .iter()
            .map(|root| {
                Ok(ScanRoot {
                    path: root.path.clone(),
                    recursive: root.recursive,
                    matcher: Matcher::for_root(root, &config.exclude)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(roots, config.stop_on_any_error))
    }

    /// Start the walk on the blocking pool.
    pub fn spawn(self) -> (DescriptorStream, JoinHandle<ScanSummary>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let handle = tokio::task::spawn_blocking(move || self.scan_into(&tx));
        (rx, handle)
    }

    /// Walk every root, sending matches into `tx`. Blocking.
    pub fn scan_into(&self, tx: &mpsc::Sender<Result<FileDescriptor>>) -> ScanSummary {
        let mut summary = ScanSummary::default();

        for root in &self.roots {
            if self.scan_root(root, tx, &mut summary).is_break() {
                break;
            }
        }

        if summary.errors > 0 {
            warn!("File discovery finished with {} error(s)", summary.errors);
        }
        info!(
            "Discovered {} matching files ({} bytes)",
            summary.files_found, summary.bytes_found
        );

        summary
    }

    fn scan_root(
        &self,
        root: &ScanRoot,
        tx: &mpsc::Sender<Result<FileDescriptor>>,
        summary: &mut ScanSummary,
    ) -> ControlFlow<()> {
        // Canonical roots give stable archive paths and resolve `..`
        let base = match root.path.canonicalize() {
            Ok(base) => base,
            Err(e) => return self.fail(&root.path, e, tx, summary),
        };

        debug!("Scanning {} (recursive: {})", base.display(), root.recursive);

        let mut walker = WalkDir::new(&base).follow_links(false);
        if !root.recursive {
            walker = walker.max_depth(1);
        }

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| base.clone());
                    self.fail(&path, e.into(), tx, summary)?;
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                continue;
            }

            if !root.matcher.matches(&to_slash(entry.path())) {
                continue;
            }

            match FileDescriptor::from_path(entry.path()) {
                Ok(Some(descriptor)) => {
                    summary.files_found += 1;
                    summary.bytes_found += descriptor.size;
                    if tx.blocking_send(Ok(descriptor)).is_err() {
                        debug!("Scanner receiver closed, stopping walk");
                        summary.interrupted = true;
                        return ControlFlow::Break(());
                    }
                }
                Ok(None) => {}
                Err(e) => self.fail(entry.path(), e, tx, summary)?,
            }
        }

        ControlFlow::Continue(())
    }

    /// Count and log a discovery error; under `stop_on_any_error` hand it to
    /// the consumer and end the walk.
    fn fail(
        &self,
        path: &Path,
        source: std::io::Error,
        tx: &mpsc::Sender<Result<FileDescriptor>>,
        summary: &mut ScanSummary,
    ) -> ControlFlow<()> {
        summary.errors += 1;
        error!("Error while scanning {}: {}", path.display(), source);

        if !self.stop_on_any_error {
            return ControlFlow::Continue(());
        }

        let _ = tx.blocking_send(Err(BackupError::Discovery {
            path: path.to_path_buf(),
            source,
        }));
        ControlFlow::Break(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExcludeConfig, RootConfig};
    use std::fs;
    use tempfile::TempDir;

    fn scan_root(path: &Path, recursive: bool, names: &[&str]) -> ScanRoot {
        let root = RootConfig {
            path: path.to_path_buf(),
            name_patterns: names.iter().map(|s| s.to_string()).collect(),
            path_patterns: Vec::new(),
            recursive,
        };
        ScanRoot {
            path: path.to_path_buf(),
            recursive,
            matcher: Matcher::for_root(&root, &ExcludeConfig::default()).unwrap(),
        }
    }

    /// Drive the scanner to completion and collect what it sent.
    fn collect(scanner: &Scanner) -> (Vec<Result<FileDescriptor>>, ScanSummary) {
        let (tx, mut rx) = mpsc::channel(1024);
        let summary = scanner.scan_into(&tx);
        drop(tx);

        let mut items = Vec::new();
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        (items, summary)
    }

    fn names(items: &[Result<FileDescriptor>]) -> Vec<String> {
        let mut names: Vec<String> = items
            .iter()
            .filter_map(|item| item.as_ref().ok())
            .map(|d| d.source_path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let scanner = Scanner::new(vec![scan_root(temp_dir.path(), true, &[])], false);

        let (items, summary) = collect(&scanner);
        assert!(items.is_empty());
        assert_eq!(summary.files_found, 0);
        Ok(())
    }

    #[test]
    fn test_recursive_walk_with_patterns() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("file1.txt"), b"content1")?;
        fs::write(temp_dir.path().join("skip.log"), b"log")?;
        fs::write(temp_dir.path().join("subdir/file2.txt"), b"content2")?;

        let scanner = Scanner::new(vec![scan_root(temp_dir.path(), true, &["*.txt"])], false);
        let (items, summary) = collect(&scanner);

        assert_eq!(names(&items), vec!["file1.txt", "file2.txt"]);
        assert_eq!(summary.files_found, 2);
        assert_eq!(summary.bytes_found, 16);
        Ok(())
    }

    #[test]
    fn test_shallow_walk_skips_subdirectories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("top.txt"), b"top")?;
        fs::write(temp_dir.path().join("subdir/deep.txt"), b"deep")?;

        let scanner = Scanner::new(vec![scan_root(temp_dir.path(), false, &[])], false);
        let (items, _) = collect(&scanner);

        assert_eq!(names(&items), vec!["top.txt"]);
        Ok(())
    }

    #[test]
    fn test_global_exclude_applies() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("keep.txt"), b"keep")?;
        fs::write(temp_dir.path().join("scratch.tmp"), b"exclude")?;

        let mut config = Config::new("t", temp_dir.path()).with_root(RootConfig::new(temp_dir.path()));
        config.exclude.name_patterns.push("*.tmp".into());

        let scanner = Scanner::from_config(&config).unwrap();
        let (items, _) = collect(&scanner);

        assert_eq!(names(&items), vec!["keep.txt"]);
        Ok(())
    }

    #[test]
    fn test_missing_root_is_counted_and_skipped() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("a.txt"), b"a")?;

        let scanner = Scanner::new(
            vec![
                scan_root(&temp_dir.path().join("missing"), true, &[]),
                scan_root(temp_dir.path(), true, &[]),
            ],
            false,
        );
        let (items, summary) = collect(&scanner);

        assert_eq!(summary.errors, 1);
        assert_eq!(names(&items), vec!["a.txt"]);
        Ok(())
    }

    #[test]
    fn test_missing_root_aborts_when_strict() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("a.txt"), b"a")?;

        let scanner = Scanner::new(
            vec![
                scan_root(&temp_dir.path().join("missing"), true, &[]),
                scan_root(temp_dir.path(), true, &[]),
            ],
            true,
        );
        let (items, summary) = collect(&scanner);

        assert_eq!(summary.errors, 1);
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(BackupError::Discovery { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_scanner_stops_when_receiver_dropped() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        for i in 0..(CHANNEL_CAPACITY * 3) {
            fs::write(temp_dir.path().join(format!("f{i}.txt")), b"x")?;
        }

        let scanner = Scanner::new(vec![scan_root(temp_dir.path(), true, &[])], false);
        let (mut rx, handle) = scanner.spawn();
        assert!(rx.recv().await.is_some());
        drop(rx);

        let summary = handle.await.unwrap();
        assert!(summary.interrupted);
        assert!(summary.files_found < CHANNEL_CAPACITY * 3);
        Ok(())
    }
}
