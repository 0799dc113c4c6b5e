//! Error taxonomy for the bridge. None of these are fatal to the sampling loop:
//! each one is recovered where it happens (field omitted, cache kept, reconnect).

use std::path::PathBuf;

/// A single metric query failed; the sampler omits that field.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("not available: {0}")]
    NotAvailable(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// A weather refresh failed; the cached reading (if any) stays in place.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("weather provider returned HTTP {0}")]
    Status(u16),

    #[error("malformed weather response: {0}")]
    Malformed(String),
}

/// Serial link failures, recovered by the reconnect cycle.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("open {device} failed: {source}")]
    Open {
        device: String,
        source: serialport::Error,
    },

    #[error("serial write failed: {0}")]
    Write(#[from] std::io::Error),

    #[error("no serial connection")]
    NotConnected,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}
