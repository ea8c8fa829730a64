use anyhow::Result;
use clap::Parser;
use tic_core::config::UnifiedConfig;
use tracing::info;

mod app;
mod cli;
mod logging;
mod output;

use crate::cli::Args;
use crate::output::print_error;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            let mut config = UnifiedConfig::load_from_file(path)?;
            config.apply_env_overrides();
            config
        }
        None => UnifiedConfig::load(),
    };

    let level = args
        .log_level
        .clone()
        .or_else(|| config.cli.log_level.clone())
        .unwrap_or_else(|| "warn".to_string());
    logging::init(&level);
    info!("Starting tic-sim");

    if let Err(e) = app::run(args, config).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}
