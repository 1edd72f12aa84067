//! Scheduler daemon configuration.
//!
//! ```kdl
//! scheduler {
//!     interval "10s"
//!     max-concurrent-jobs 32
//!     noop #false
//! }
//! ```

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default time between scheduling ticks of a pipeline.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Default number of jobs that may be scheduled at once across all pipelines.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 32;

/// Configuration of the scheduling loops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Tick interval; also the TTL of per-job scheduling locks.
    pub interval: Duration,
    /// Capacity of the bounded job pool.
    pub max_concurrent_jobs: usize,
    /// Keep the loops alive but never schedule anything.
    pub noop: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            noop: false,
        }
    }
}

impl SchedulerConfig {
    /// Check values that would make the scheduler unable to start.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.interval.is_zero() {
            return Err(ConfigError::NotPositive("interval"));
        }

        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::NotPositive("max-concurrent-jobs"));
        }

        Ok(())
    }
}

/// Parse scheduler configuration from KDL text.
///
/// A document without a `scheduler` node yields the defaults.
pub fn parse_scheduler_config(kdl: &str) -> ConfigResult<SchedulerConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = SchedulerConfig::default();

    for node in doc.nodes() {
        if node.name().value() != "scheduler" {
            continue;
        }

        let Some(children) = node.children() else {
            continue;
        };

        for child in children.nodes() {
            match child.name().value() {
                "interval" => {
                    let raw = get_first_string_arg(child)
                        .ok_or(ConfigError::MissingValue("interval"))?;
                    config.interval =
                        parse_duration(&raw).ok_or_else(|| ConfigError::InvalidDuration {
                            node: "interval",
                            value: raw.clone(),
                        })?;
                }
                "max-concurrent-jobs" | "max_concurrent_jobs" => {
                    let value = get_first_integer_arg(child)
                        .ok_or(ConfigError::MissingValue("max-concurrent-jobs"))?;
                    config.max_concurrent_jobs =
                        usize::try_from(value).map_err(|_| ConfigError::OutOfRange {
                            node: "max-concurrent-jobs",
                            value,
                        })?;
                }
                "noop" => {
                    config.noop = get_first_bool_arg(child).unwrap_or(true);
                }
                _ => {} // Ignore unknown nodes
            }
        }
    }

    config.validate()?;
    Ok(config)
}

/// Read and parse a scheduler configuration file.
pub fn load_scheduler_config(path: impl AsRef<Path>) -> ConfigResult<SchedulerConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_scheduler_config(&text)
}

/// Parse durations like `500ms`, `10s`, `5m`, `1h`. A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits.parse().ok()?;

    match unit.trim() {
        "ms" => Some(Duration::from_millis(value)),
        "" | "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value.checked_mul(60)?)),
        "h" => Some(Duration::from_secs(value.checked_mul(3600)?)),
        _ => None,
    }
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_integer_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

fn get_first_bool_arg(node: &KdlNode) -> Option<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
}
