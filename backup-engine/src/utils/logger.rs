//! Logging configuration using tracing.
//!
//! The library only emits events; the binary decides where they go and at
//! which minimum severity by installing the subscriber built here.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Levels accepted by `[log] level` and `--log-level`.
pub const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Initialize logging with the specified minimum level.
///
/// `RUST_LOG` takes precedence so a single run can be debugged without
/// touching the configuration file.
pub fn init(level: &str) -> anyhow::Result<()> {
    if !LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        anyhow::bail!("unknown log level {level:?}, expected one of {}", LEVELS.join(", "));
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    Ok(())
}
