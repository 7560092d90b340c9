//! Fixtures shared by unit tests.

use crate::archive::writer::{ArchiveWriter, WriteSummary};
use crate::fs::metadata::FileDescriptor;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;

/// Write `contents` to `path` (creating parents) with mtime `secs`.
pub fn write_file(path: &Path, contents: &str, secs: u64) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
    set_mtime(path, secs);
    path.to_path_buf()
}

pub fn set_mtime(path: &Path, secs: u64) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

/// Archive `sources` into `dir/file_name`, outside any runtime.
pub fn archive_files<P: AsRef<Path>>(dir: &Path, file_name: &str, sources: &[P]) -> WriteSummary {
    let (tx, rx) = mpsc::channel(sources.len().max(1));
    for source in sources {
        let descriptor = FileDescriptor::from_path(source.as_ref()).unwrap().unwrap();
        tx.blocking_send(Ok(descriptor)).unwrap();
    }
    drop(tx);

    ArchiveWriter::create(&dir.join(file_name), 3, true)
        .unwrap()
        .write_stream(rx)
        .unwrap()
}
