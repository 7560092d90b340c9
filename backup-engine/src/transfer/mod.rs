//! Progress reporting for archive runs.

pub mod progress;
