//! tracing setup with a runtime verbosity switch.
//!
//! Quiet mode installs an `off` filter, so nothing is logged at all; verbose
//! mode uses `RUST_LOG` when set, otherwise info-level for the smartmon crates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{prelude::*, reload, EnvFilter, Registry};

const DEFAULT_DIRECTIVES: &str = "smartmon_bridge=info,smartmon_tray=info";

fn filter_for(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
    } else {
        EnvFilter::new("off")
    }
}

/// Handle for flipping verbosity while running.
#[derive(Clone)]
pub struct Verbosity {
    handle: reload::Handle<EnvFilter, Registry>,
    enabled: Arc<AtomicBool>,
}

impl Verbosity {
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set(&self, on: bool) -> Result<(), reload::Error> {
        self.handle.reload(filter_for(on))?;
        self.enabled.store(on, Ordering::Relaxed);
        Ok(())
    }

    /// Flips verbosity; returns the new state.
    pub fn toggle(&self) -> Result<bool, reload::Error> {
        let on = !self.is_enabled();
        self.set(on)?;
        Ok(on)
    }
}

/// Installs the global subscriber writing to `writer`.
pub fn init<W>(
    verbose: bool,
    writer: W,
    ansi: bool,
) -> Result<Verbosity, tracing_subscriber::util::TryInitError>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let (filter, handle) = reload::Layer::new(filter_for(verbose));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(false),
        )
        .try_init()?;
    Ok(Verbosity {
        handle,
        enabled: Arc::new(AtomicBool::new(verbose)),
    })
}
