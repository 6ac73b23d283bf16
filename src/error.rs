//! Typed errors for the supervisor core.
//!
//! Collaborators (server, lobby, statistics) report through `anyhow`; the
//! pieces whose failures drive exit codes get their own enums here.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// PID file creation failures. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum PidFileError {
    #[error("failed to create PID file {}: {source}", path.display())]
    Create { path: PathBuf, source: io::Error },

    #[error("failed to write to PID file {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("PID file path {} contains an interior NUL byte", path.display())]
    InvalidPath { path: PathBuf },
}

/// Rejected periodic worker configurations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerConfigError {
    #[error("worker '{name}': poll granularity must be non-zero")]
    ZeroGranularity { name: String },

    #[error("worker '{name}': nominal period must be non-zero")]
    ZeroPeriod { name: String },

    #[error(
        "worker '{name}': poll granularity {granularity:?} does not evenly divide nominal period {period:?}"
    )]
    UnevenGranularity {
        name: String,
        period: Duration,
        granularity: Duration,
    },

    #[error("worker '{name}': too many poll slices per period")]
    TooManyPolls { name: String },
}

/// Configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
