//! KDL configuration parsing for the Tempo scheduler.

pub mod error;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use system::{
    DEFAULT_INTERVAL, DEFAULT_MAX_CONCURRENT_JOBS, SchedulerConfig, load_scheduler_config,
    parse_duration, parse_scheduler_config,
};
