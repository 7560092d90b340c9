//! Progress accounting and human-readable sizes for backup runs.

use std::time::{Duration, Instant};

/// Minimum time between two progress reports.
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Counts files and bytes added to an archive and rate-limits progress lines.
#[derive(Debug)]
pub struct ProgressTracker {
    start_time: Instant,
    last_report: Instant,
    interval: Duration,
    files: usize,
    bytes: u64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::with_interval(REPORT_INTERVAL)
    }

    pub fn with_interval(interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            last_report: now,
            interval,
            files: 0,
            bytes: 0,
        }
    }

    /// Record one more file of `bytes`. Returns true when a progress line is due.
    pub fn record(&mut self, bytes: u64) -> bool {
        self.files += 1;
        self.bytes += bytes;

        let now = Instant::now();
        if now.duration_since(self.last_report) >= self.interval {
            self.last_report = now;
            true
        } else {
            false
        }
    }

    pub fn files(&self) -> usize {
        self.files
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Format bytes with binary units, e.g. `1.1 KiB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut size = bytes as f64 / 1024.0;
    let mut unit_index = 0;
    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, UNITS[unit_index])
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
