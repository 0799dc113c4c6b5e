//! smartmon_bridge: samples host metrics and weather and streams them, one
//! JSON line per sample, to a microcontroller display over serial.
//!
//! The pieces, leaves first: [`ports`] picks a device, [`connection`] owns the
//! serial link and its reconnect cycle, [`sampler`] runs the loop. Front ends
//! only hold a [`state::StopSignal`] and read [`state::StatusBoard`] snapshots.

pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod ports;
pub mod sampler;
pub mod state;
pub mod types;
pub mod weather;

use tracing::{info, warn};

use crate::config::Settings;
use crate::connection::{ConnectionManager, SystemPorts};
use crate::logging::Verbosity;
use crate::metrics::SysinfoSource;
use crate::sampler::{Sampler, SamplerConfig};
use crate::state::{StatusBoard, StopSignal};
use crate::weather::{NoWeather, OpenMeteo, WeatherSource};

/// Builds the production sampler and runs it on the current thread until `stop`.
///
/// Blocking: call from a dedicated thread (`spawn_blocking`), never from async code.
pub fn run_bridge(settings: &Settings, status: StatusBoard, stop: &StopSignal) {
    let weather: Box<dyn WeatherSource> = match settings.coordinates {
        Some(_) => match OpenMeteo::new() {
            Ok(w) => Box::new(w),
            Err(e) => {
                warn!("weather disabled: {e}");
                Box::new(NoWeather)
            }
        },
        None => Box::new(NoWeather),
    };

    let link = ConnectionManager::new(SystemPorts, settings.baud)
        .with_fixed_device(settings.port.clone());
    let config = SamplerConfig {
        interval: settings.interval,
        coordinates: settings.coordinates,
    };

    Sampler::new(config, SysinfoSource::new(), weather, link)
        .with_status(status)
        .run(stop);
}

/// Headless mode: runs the bridge on a blocking thread until Ctrl+C, then
/// stops it and waits for the connection to close. On unix, SIGUSR1 flips
/// verbosity.
pub async fn run_until_interrupt(
    settings: Settings,
    verbosity: Option<Verbosity>,
) -> std::io::Result<()> {
    let stop = StopSignal::new();
    let bridge = {
        let stop = stop.clone();
        tokio::task::spawn_blocking(move || run_bridge(&settings, StatusBoard::new(), &stop))
    };

    let interrupted = wait_for_interrupt(verbosity.as_ref()).await;
    info!("shutting down");
    stop.request();

    if let Err(e) = bridge.await {
        warn!("sampler thread ended abnormally: {e}");
    }
    interrupted
}

#[cfg(unix)]
async fn wait_for_interrupt(verbosity: Option<&Verbosity>) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut usr1 = signal(SignalKind::user_defined1())?;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            res = &mut ctrl_c => return res,
            _ = usr1.recv() => {
                if let Some(v) = verbosity {
                    match v.toggle() {
                        Ok(on) => info!("verbose logging {}", if on { "on" } else { "off" }),
                        Err(e) => eprintln!("could not switch verbosity: {e}"),
                    }
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_interrupt(_verbosity: Option<&Verbosity>) -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
