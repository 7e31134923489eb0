use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use crate::config::Config;
use crate::exporter::Exporter;
use crate::server;

#[derive(Parser)]
#[command(name = "azdo-build-exporter")]
#[command(author, version, about = "Prometheus exporter for Azure DevOps builds", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./azdo-exporter.{toml,json,yaml,yml})
    #[arg(short, long, global = true, env = "AZDO_EXPORTER_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve metrics over HTTP, running a scrape cycle per request
    Serve {
        /// Overrides exporter.port from the configuration
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run a single scrape cycle and print the metrics to stdout
    Scrape,
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;
        let exporter = Exporter::from_config(&config).context("Failed to set up API clients")?;

        match &self.command {
            Commands::Serve { port } => {
                let port = port.unwrap_or(config.exporter.port);
                server::serve(Arc::new(exporter), port, &config.exporter.endpoint).await
            }
            Commands::Scrape => {
                info!("Running a single scrape cycle");
                let text = exporter.scrape().await?;
                print!("{text}");
                Ok(())
            }
        }
    }
}
