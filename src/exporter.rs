use futures::future::join_all;
use log::{debug, info, warn};

use crate::azdo::{AzDoClient, BuildSource};
use crate::collector::{BuildMetrics, Collector};
use crate::config::Config;
use crate::error::{ExporterError, Result};

/// Collectors for every configured server, scraped together on each request.
pub struct Exporter<S = AzDoClient> {
    collectors: Vec<Collector<S>>,
}

impl Exporter<AzDoClient> {
    pub fn from_config(config: &Config) -> Result<Self> {
        let proxy = config.proxy.url.as_deref();
        let collectors = config
            .servers
            .iter()
            .map(|(name, settings)| {
                let client = AzDoClient::new(name, settings, proxy)?;
                Ok(Collector::new(client, config.exporter.cycle_timeout()))
            })
            .collect::<Result<Vec<_>>>()?;

        info!("Configured {} servers", collectors.len());
        Ok(Self::new(collectors))
    }
}

impl<S> Exporter<S>
where
    S: BuildSource,
{
    pub fn new(collectors: Vec<Collector<S>>) -> Self {
        Self { collectors }
    }

    /// Runs one cycle per server concurrently and renders the metrics of the
    /// servers whose cycle succeeded.
    ///
    /// Fails only when no server produced a complete cycle.
    pub async fn scrape(&self) -> Result<String> {
        let metrics = BuildMetrics::new()?;

        let results = join_all(self.collectors.iter().map(|c| c.collect(&metrics))).await;

        let mut failed = 0;
        for (collector, result) in self.collectors.iter().zip(&results) {
            match result {
                Ok(report) => debug!(
                    "[{}] Published {} observations from {} projects ({:?})",
                    collector.name(),
                    report.observations,
                    report.projects,
                    report.elapsed
                ),
                Err(e) => {
                    warn!("[{}] No metrics published this scrape: {e}", collector.name());
                    failed += 1;
                }
            }
        }

        if failed > 0 && failed == self.collectors.len() {
            return Err(ExporterError::AllServersFailed(failed));
        }

        metrics.encode()
    }
}
