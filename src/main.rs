mod auth;
mod azdo;
mod cli;
mod collector;
mod config;
mod error;
mod exporter;
mod server;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    info!("Starting azdo-build-exporter {}", env!("CARGO_PKG_VERSION"));
    cli.execute().await?;

    Ok(())
}
