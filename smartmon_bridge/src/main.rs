//! Headless smartmon bridge: samples until Ctrl+C.

use clap::Parser;
use tracing::debug;

use smartmon_bridge::config::{self, BridgeArgs, FileConfig, Settings};
use smartmon_bridge::ports;

#[derive(Debug, Parser)]
#[command(name = "smartmon_bridge", version, about = "Stream host metrics to a serial display")]
struct Cli {
    #[command(flatten)]
    bridge: BridgeArgs,

    /// Print detected serial ports with their scores and exit
    #[arg(long)]
    list_ports: bool,
}

fn print_ports() {
    let candidates = ports::list_candidates();
    if candidates.is_empty() {
        eprintln!("No serial ports found");
        return;
    }
    for c in &candidates {
        println!(
            "{}\t{}\t({})\tscore={}",
            c.device,
            c.description,
            c.hwid(),
            ports::score(c)
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.list_ports {
        print_ports();
        return Ok(());
    }

    let loaded = config::load_config();
    let settings = Settings::resolve(
        &cli.bridge,
        loaded.as_ref().unwrap_or(&FileConfig::default()),
    );
    let verbosity = smartmon_bridge::logging::init(settings.verbose, std::io::stderr, true).ok();
    if let Err(e) = &loaded {
        debug!("using defaults: {e}");
    }

    if cli.bridge.save {
        match config::save_config(&FileConfig::from(&settings)) {
            Ok(path) => eprintln!("Saved settings to {}", path.display()),
            Err(e) => eprintln!("Could not save settings: {e}"),
        }
    }

    smartmon_bridge::run_until_interrupt(settings, verbosity).await?;
    Ok(())
}
