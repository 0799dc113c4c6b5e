//! Command surface and the optional config file.
//!
//! Precedence: command line, then environment (`SMARTMON_*`), then
//! `$XDG_CONFIG_HOME/smartmon/config.json`, then built-in defaults.

use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_BAUD: u32 = 115_200;
pub const DEFAULT_INTERVAL_SECS: f64 = 2.0;

/// Flags shared by the headless bridge and the tray front end.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct BridgeArgs {
    /// Serial device to use (autodetect when omitted), e.g. /dev/tty.usbmodem1101
    #[arg(short = 'p', long = "port", env = "SMARTMON_PORT", value_name = "DEVICE")]
    pub port: Option<String>,

    /// Baud rate [default: 115200]
    #[arg(short = 'b', long, env = "SMARTMON_BAUD")]
    pub baud: Option<u32>,

    /// Latitude for weather (needs --lon too)
    #[arg(long, env = "SMARTMON_LAT", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Longitude for weather (needs --lat too)
    #[arg(long, env = "SMARTMON_LON", allow_negative_numbers = true)]
    pub lon: Option<f64>,

    /// Seconds between samples [default: 2.0]
    #[arg(short = 'i', long, env = "SMARTMON_INTERVAL", value_name = "SECONDS")]
    pub interval: Option<f64>,

    /// Log connection changes and every transmitted record
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Write the effective settings to the config file
    #[arg(long)]
    pub save: bool,
}

/// On-disk config; every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baud: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub port: Option<String>,
    pub baud: u32,
    pub coordinates: Option<(f64, f64)>,
    pub interval: Duration,
    pub verbose: bool,
}

impl Settings {
    pub fn resolve(args: &BridgeArgs, file: &FileConfig) -> Self {
        let lat = args.lat.or(file.lat);
        let lon = args.lon.or(file.lon);
        let interval_secs = args
            .interval
            .or(file.interval)
            .unwrap_or(DEFAULT_INTERVAL_SECS);
        Self {
            port: args.port.clone().or_else(|| file.port.clone()),
            baud: args.baud.or(file.baud).unwrap_or(DEFAULT_BAUD),
            coordinates: lat.zip(lon),
            interval: Duration::try_from_secs_f64(interval_secs)
                .unwrap_or(Duration::from_secs_f64(DEFAULT_INTERVAL_SECS)),
            verbose: args.verbose || file.verbose.unwrap_or(false),
        }
    }
}

impl From<&Settings> for FileConfig {
    fn from(s: &Settings) -> Self {
        Self {
            port: s.port.clone(),
            baud: Some(s.baud),
            lat: s.coordinates.map(|c| c.0),
            lon: s.coordinates.map(|c| c.1),
            interval: Some(s.interval.as_secs_f64()),
            verbose: Some(s.verbose),
        }
    }
}

pub fn config_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("smartmon")
    } else {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("smartmon")
    }
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Loads the config file. Callers treat any error as an empty config, and
/// report it once logging is up.
pub fn load_config() -> Result<FileConfig, ConfigError> {
    load_from(&config_path())
}

pub fn load_from(path: &Path) -> Result<FileConfig, ConfigError> {
    let s = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&s).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_config(c: &FileConfig) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_to(&path, c)?;
    Ok(path)
}

pub fn save_to(path: &Path, c: &FileConfig) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let data = serde_json::to_vec_pretty(c).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    fs::write(path, data).map_err(write_err)
}
