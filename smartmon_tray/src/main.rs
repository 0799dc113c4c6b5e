//! Entry point for the smartmon status bar. Parses args, then runs the App
//! (or the headless loop when the terminal is unusable and fallback is on).

mod app;
mod history;
mod types;
mod ui;

use std::fs::{self, File};
use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use smartmon_bridge::config::{self, BridgeArgs, FileConfig, Settings};
use smartmon_bridge::logging::{self, Verbosity};
use smartmon_bridge::state::StatusBoard;
use tracing::debug;

use app::App;

/// Status bar could not start and no fallback was requested.
const EXIT_NO_FRONT_END: u8 = 3;

#[derive(Debug, Parser)]
#[command(
    name = "smartmon_tray",
    version,
    about = "Status bar for the smartmon serial telemetry bridge"
)]
struct Cli {
    #[command(flatten)]
    bridge: BridgeArgs,

    /// Run headless (logging to stderr) when the status bar cannot start
    #[arg(long)]
    headless_fallback: bool,
}

/// Logs go to a file so they never land on the UI.
fn init_file_logging(verbose: bool) -> Option<Verbosity> {
    let dir = config::config_dir();
    let file = fs::create_dir_all(&dir)
        .and_then(|_| {
            File::options()
                .create(true)
                .append(true)
                .open(dir.join("tray.log"))
        })
        .ok();
    match file {
        Some(f) => logging::init(verbose, Mutex::new(f), false).ok(),
        None => logging::init(verbose, io::sink, false).ok(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let loaded = config::load_config();
    let settings = Settings::resolve(
        &cli.bridge,
        loaded.as_ref().unwrap_or(&FileConfig::default()),
    );

    if cli.bridge.save {
        match config::save_config(&FileConfig::from(&settings)) {
            Ok(path) => eprintln!("Saved settings to {}", path.display()),
            Err(e) => eprintln!("Could not save settings: {e}"),
        }
    }

    let terminal = if io::stdout().is_terminal() {
        app::setup_terminal()
    } else {
        Err(io::Error::other("stdout is not a terminal"))
    };

    let mut terminal = match terminal {
        Ok(t) => t,
        Err(e) if cli.headless_fallback => {
            eprintln!("smartmon_tray: status bar unavailable ({e}), running headless");
            let verbosity = logging::init(settings.verbose, io::stderr, true).ok();
            if let Err(e) = &loaded {
                debug!("using defaults: {e}");
            }
            smartmon_bridge::run_until_interrupt(settings, verbosity).await?;
            return Ok(ExitCode::SUCCESS);
        }
        Err(e) => {
            eprintln!("smartmon_tray: status bar unavailable: {e}");
            return Ok(ExitCode::from(EXIT_NO_FRONT_END));
        }
    };

    let verbosity = init_file_logging(settings.verbose);
    if let Err(e) = &loaded {
        debug!("using defaults: {e}");
    }
    let mut app = App::new(StatusBoard::new(), verbosity);
    let res = app.run(&mut terminal, settings).await;

    app::restore_terminal(&mut terminal)?;
    res?;
    Ok(ExitCode::SUCCESS)
}
