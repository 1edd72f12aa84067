//! Scheduler configuration errors.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KDL parse error: {0}")]
    Parse(#[from] kdl::KdlError),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A known node was given without an argument.
    #[error("`{0}` needs a value")]
    MissingValue(&'static str),

    #[error("`{node}`: invalid duration {value:?}")]
    InvalidDuration { node: &'static str, value: String },

    #[error("`{node}`: {value} is out of range")]
    OutOfRange { node: &'static str, value: i128 },

    #[error("`{0}` must be greater than zero")]
    NotPositive(&'static str),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
