//! Incremental diff: decides which discovered files go into the archive.
//!
//! A file is included when its path is not in the baseline index, or when its
//! modification time (whole seconds) is strictly newer than the latest recorded
//! version. A file whose mtime moved backward counts as unchanged. Without a
//! baseline every file passes.

use crate::fs::metadata::FileDescriptor;
use crate::fs::walker::{DescriptorStream, CHANNEL_CAPACITY};
use crate::index::Index;
use crate::utils::time::whole_seconds;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Counts reported once the input stream has ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    /// Files forwarded to the writer
    pub passed: usize,
    /// Files dropped because the baseline already holds them
    pub unchanged: usize,
}

/// Whether `file` has to be archived against `baseline`.
pub fn needs_backup(file: &FileDescriptor, baseline: Option<&Index>) -> bool {
    let Some(baseline) = baseline else {
        return true;
    };

    match baseline.get(&file.archive_path).and_then(|h| h.latest()) {
        Some(latest) => whole_seconds(file.modified) > latest.modified,
        None => true,
    }
}

/// Filter `input` against `baseline` on a separate task.
///
/// Errors from upstream are forwarded unchanged and end the stage. When the
/// downstream receiver goes away the input is dropped, which stops the scanner.
pub fn spawn(
    mut input: DescriptorStream,
    baseline: Option<Arc<Index>>,
) -> (DescriptorStream, JoinHandle<PlanSummary>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    let handle = tokio::spawn(async move {
        let mut summary = PlanSummary::default();

        while let Some(item) = input.recv().await {
            let file = match item {
                Ok(file) => file,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            };

            if !needs_backup(&file, baseline.as_deref()) {
                summary.unchanged += 1;
                continue;
            }

            debug!("Changed: {}", file.archive_path);
            if tx.send(Ok(file)).await.is_err() {
                debug!("Planner receiver closed");
                break;
            }
            summary.passed += 1;
        }

        if baseline.is_some() {
            info!(
                "Diff: {} new or modified, {} unchanged",
                summary.passed, summary.unchanged
            );
        }

        summary
    });

    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::BackupError;
    use chrono::{DateTime, Utc};
    use std::path::PathBuf;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn descriptor(path: &str, modified: DateTime<Utc>) -> FileDescriptor {
        FileDescriptor {
            source_path: PathBuf::from("/").join(path),
            archive_path: path.to_string(),
            size: 1,
            modified,
        }
    }

    fn baseline() -> Index {
        let mut index = Index::new();
        index.add("data/a.txt", "b_2024-01-01_00-00-00f.tar.zst", at(100));
        index.add("data/a.txt", "b_2024-01-02_00-00-00i.tar.zst", at(200));
        index
    }

    #[test]
    fn test_everything_passes_without_baseline() {
        assert!(needs_backup(&descriptor("data/a.txt", at(100)), None));
    }

    #[test]
    fn test_compares_against_latest_version() {
        let index = baseline();
        assert!(!needs_backup(&descriptor("data/a.txt", at(200)), Some(&index)));
        assert!(needs_backup(&descriptor("data/a.txt", at(201)), Some(&index)));
        // matches an older version only
        assert!(!needs_backup(&descriptor("data/a.txt", at(100)), Some(&index)));
        // mtime moved backward past everything recorded
        assert!(!needs_backup(&descriptor("data/a.txt", at(50)), Some(&index)));
        assert!(needs_backup(&descriptor("data/new.txt", at(200)), Some(&index)));
    }

    #[test]
    fn test_sub_second_difference_is_unchanged() {
        let index = baseline();
        let file = descriptor("data/a.txt", DateTime::from_timestamp(200, 900_000_000).unwrap());
        assert!(!needs_backup(&file, Some(&index)));
    }

    #[test]
    fn test_paths_compare_case_sensitively() {
        let index = baseline();
        assert!(needs_backup(&descriptor("data/A.txt", at(200)), Some(&index)));
    }

    #[tokio::test]
    async fn test_stage_filters_and_counts() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok(descriptor("data/a.txt", at(200)))).await.unwrap();
        tx.send(Ok(descriptor("data/b.txt", at(200)))).await.unwrap();
        drop(tx);

        let (mut out, handle) = spawn(rx, Some(Arc::new(baseline())));

        let mut passed = Vec::new();
        while let Some(item) = out.recv().await {
            passed.push(item.unwrap().archive_path);
        }

        assert_eq!(passed, vec!["data/b.txt"]);
        assert_eq!(handle.await.unwrap(), PlanSummary { passed: 1, unchanged: 1 });
    }

    #[tokio::test]
    async fn test_stage_forwards_errors_and_stops() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Err(BackupError::Config("boom".into()))).await.unwrap();
        tx.send(Ok(descriptor("data/b.txt", at(200)))).await.unwrap();
        drop(tx);

        let (mut out, handle) = spawn(rx, None);

        assert!(matches!(out.recv().await, Some(Err(BackupError::Config(_)))));
        assert!(out.recv().await.is_none());
        assert_eq!(handle.await.unwrap().passed, 0);
    }
}
