//! End-to-end runs driven through a configuration file.

use backup_engine::utils::time::parse_time;
use backup_engine::{BackupExecutor, BackupKind, Config};
use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use walkdir::WalkDir;

fn write(path: &Path, contents: &str, secs: u64) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

fn load_config(temp_dir: &TempDir) -> Config {
    let source = temp_dir.path().join("home");
    let config_path = temp_dir.path().join("backup.toml");
    fs::write(
        &config_path,
        format!(
            r#"
name = "home"
target_dir = {target:?}
compression_level = 5

[log]
level = "debug"

[[roots]]
path = {source:?}
name_patterns = ["*.txt", "*.md"]

[exclude]
path_patterns = ["*/cache/*"]
"#,
            target = temp_dir.path().join("backups").to_string_lossy(),
            source = source.to_string_lossy(),
        ),
    )
    .unwrap();

    Config::from_file(&config_path).unwrap()
}

#[tokio::test]
async fn test_backup_search_restore_cycle() {
    let temp_dir = TempDir::new().unwrap();
    let home = temp_dir.path().join("home");
    write(&home.join("notes/todo.txt"), "buy milk", 1_600_000_000);
    write(&home.join("README.md"), "# home", 1_600_000_000);
    write(&home.join("photo.jpg"), "binary", 1_600_000_000);
    write(&home.join("cache/tmp.txt"), "scratch", 1_600_000_000);

    let executor = BackupExecutor::new(load_config(&temp_dir));

    let full = executor.execute(BackupKind::Full).await.unwrap();
    assert_eq!(full.files_written, 2);

    write(&home.join("notes/todo.txt"), "buy milk and eggs", 1_700_000_000);
    write(&home.join("notes/new.txt"), "fresh", 1_700_000_000);

    let incremental = executor.execute(BackupKind::Incremental).await.unwrap();
    assert_eq!(incremental.kind, BackupKind::Incremental);
    assert_eq!(incremental.files_written, 2);
    assert_eq!(incremental.unchanged_files, 1);

    let found = executor.search("*TODO*").await.unwrap();
    assert_eq!(found.len(), 1);
    let mut listing = Vec::new();
    found.render(&mut listing).unwrap();
    let listing = String::from_utf8(listing).unwrap();
    assert_eq!(listing.lines().count(), 3);

    // 2021-01-01 lies between the two versions of todo.txt
    let out = temp_dir.path().join("restore");
    let as_of = parse_time("01.01.2021").unwrap();
    let summary = executor.restore("*.txt", as_of, &out).await.unwrap();
    assert_eq!(summary.files_restored, 1);
    assert!(summary.missing.is_empty());

    let restored: Vec<_> = walk(&out);
    assert_eq!(restored.len(), 1);
    assert!(restored[0].ends_with("notes/todo.txt"));
    assert_eq!(fs::read_to_string(&restored[0]).unwrap(), "buy milk");

    let report = executor.verify().await.unwrap();
    assert_eq!(report.archives, 2);
    assert_eq!(report.paths, 3);
    assert_eq!(report.versions, 4);
    assert_eq!(report.index_file_matches, Some(true));
}

#[tokio::test]
async fn test_lost_index_file_is_rebuilt() {
    let temp_dir = TempDir::new().unwrap();
    let home = temp_dir.path().join("home");
    write(&home.join("a.txt"), "a", 1_600_000_000);

    let executor = BackupExecutor::new(load_config(&temp_dir));
    executor.execute(BackupKind::Full).await.unwrap();

    let side_file = executor.target_dir().join("index.csv.zst");
    fs::remove_file(&side_file).unwrap();

    let again = executor.execute(BackupKind::Incremental).await.unwrap();
    assert_eq!(again.archive, None);
    assert_eq!(again.unchanged_files, 1);

    write(&home.join("b.txt"), "b", 1_600_000_000);
    executor.execute(BackupKind::Incremental).await.unwrap();
    assert!(side_file.exists());
    assert_eq!(executor.search("*").await.unwrap().len(), 2);
}

fn walk(dir: &Path) -> Vec<std::path::PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}
