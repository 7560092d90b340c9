//! Backup Engine - Main entry point

use anyhow::{Context, Result};
use backup_engine::{utils, BackupExecutor, BackupKind, Config};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Archive every matching file and start a new generation chain
    FullBackup,

    /// Archive files changed since the last full backup
    IncrementalBackup,

    /// List archived versions of paths matching a pattern
    Search {
        /// Glob pattern, matched case-insensitively against archived paths
        pattern: String,
    },

    /// Restore matching files as they were just before a point in time
    Restore {
        /// Glob pattern, matched case-insensitively against archived paths
        pattern: String,

        /// Local time: DD.MM.YYYY[ HH:MM[:SS]] or YYYY-MM-DD[ HH:MM[:SS]]
        timestamp: String,

        /// Directory receiving the restored tree
        destination: PathBuf,
    },

    /// Read every archive and check it against the index
    Verify,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Failures before logging is up are printed by the returned error.
    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::debug!(
        "backup-engine v{} (backup: {}, target: {})",
        env!("CARGO_PKG_VERSION"),
        config.name,
        config.target_dir().display()
    );

    let executor = BackupExecutor::new(config);

    if let Err(e) = run(&executor, args.command).await {
        // Logged once here; returning it would print it a second time.
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(executor: &BackupExecutor, command: Command) -> Result<()> {
    match command {
        Command::FullBackup => {
            executor.execute(BackupKind::Full).await?;
        }
        Command::IncrementalBackup => {
            executor.execute(BackupKind::Incremental).await?;
        }
        Command::Search { pattern } => {
            let found = executor.search(&pattern).await?;
            let mut stdout = std::io::stdout().lock();
            found.render(&mut stdout)?;
            stdout.flush()?;
        }
        Command::Restore {
            pattern,
            timestamp,
            destination,
        } => {
            let as_of = utils::time::parse_time(&timestamp)?;
            let summary = executor.restore(&pattern, as_of, &destination).await?;
            if !summary.missing.is_empty() {
                anyhow::bail!("{} file(s) could not be found in their archives", summary.missing.len());
            }
        }
        Command::Verify => {
            let report = executor.verify().await?;
            println!(
                "{} archives, {} paths, {} versions",
                report.archives, report.paths, report.versions
            );
            if report.index_file_matches == Some(false) {
                println!("Warning: index file differs from archive contents.");
            }
            println!("No errors found.");
        }
    }

    Ok(())
}
