use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::HumanDuration;

/// Per-daemon runtime tuning. All fields have defaults so `[runtime]` may be
/// omitted from `orchd.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Periodic reconciliation tick. Retained consumer entries are retried
    /// on this cadence.
    pub tick_interval: HumanDuration,
    /// Capacity of each daemon's inbound source channel.
    pub channel_capacity: usize,
    /// Where derived rows are appended as JSON lines. Relative paths are
    /// resolved against the config file's parent directory.
    pub output: PathBuf,
    /// Service unit restarted/stopped when the global sampling toggle flips.
    pub sampling_service: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1).into(),
            channel_capacity: 1024,
            output: PathBuf::from("orchd-tables.jsonl"),
            sampling_service: "hsflowd".to_string(),
        }
    }
}
