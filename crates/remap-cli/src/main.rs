use clap::Parser;
use remap_cli::exit::{self, run_guarded};
use remap_cli::{load_config, Cli, RemapConfig};
use std::io;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::commands::util::configure_threads;
mod commands;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Config is read before logging starts so its level can apply.
    let config = load_config(cli.config.as_deref());
    let config_level = config.as_ref().ok().and_then(RemapConfig::log_level);
    let level = cli
        .log_level
        .or(config_level)
        .unwrap_or(tracing::Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("remap: could not install log subscriber: {e}");
    }

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(exit::FAILURE);
        }
    };
    if cli.log_level.is_none() && config_level.is_none() {
        warn!(
            "Ignoring unknown log level '{}' from config",
            config.logging.level
        );
    }

    if let Some(threads) = cli.threads {
        if let Err(e) = configure_threads(threads) {
            error!("{:#}", e);
            return ExitCode::from(exit::FAILURE);
        }
    }

    info!("remap v{}", env!("CARGO_PKG_VERSION"));

    ExitCode::from(run_guarded(|| commands::run(&cli.command, &config)))
}
