//! Crash probe
//!
//! Installs the crash supervisor, opens one surface and panics. Used by
//! the integration tests to observe real exit codes and launches.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use crashguard_app::config::load_config_from;
use crashguard_app::install_supervisor;
use crashguard_core::ComponentId;

#[derive(Parser, Debug)]
#[command(name = "crashguard-crash-probe", hide = true)]
struct Cli {
    /// Config file for the supervisor
    #[arg(long = "config")]
    config: PathBuf,

    /// Stop the surface before crashing
    #[arg(long = "background")]
    background: bool,

    /// Crash during application bootstrap
    #[arg(long = "in-bootstrap")]
    in_bootstrap: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config_from(&cli.config).context("Failed to load probe config")?;
    let supervised = install_supervisor(&config, None).context("Failed to install supervisor")?;

    let host = supervised.host;
    let surface = host.open_surface(
        ComponentId::new("probe::main_window"),
        Box::new(|| log::info!("Probe window closed")),
    );
    host.surface_started(surface);
    if cli.background {
        host.surface_stopped(surface);
    }

    if cli.in_bootstrap {
        crashguard_core::bootstrap::run(|| explode("bootstrap failed"));
    }
    explode("probe crashed")
}

#[inline(never)]
fn explode(message: &str) -> ! {
    panic!("{}", message)
}
