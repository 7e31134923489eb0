use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{error, info};
use tokio::sync::{mpsc, Mutex};

use super::derive::{derive_all, Observation};
use super::publish::MetricsSink;
use super::snapshot::fetch_snapshots;
use crate::azdo::BuildSource;
use crate::error::{ExporterError, Result};

/// Start time of the last fully successful cycle.
///
/// `None` until the first cycle succeeds, which makes that cycle fetch every
/// finished build the server still knows about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermark(Option<DateTime<Utc>>);

impl Watermark {
    pub fn since(self) -> Option<DateTime<Utc>> {
        self.0
    }

    fn advance(&mut self, cycle_start: DateTime<Utc>) {
        self.0 = Some(cycle_start);
    }
}

/// Summary of a published cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub projects: usize,
    pub observations: usize,
    pub elapsed: Duration,
}

/// Runs scrape cycles against one server.
///
/// Cycles are serialized: the watermark lock is held for the whole cycle, so a
/// trigger arriving mid-cycle waits for the running one to finish.
pub struct Collector<S> {
    source: S,
    watermark: Mutex<Watermark>,
    cycle_timeout: Duration,
}

impl<S> Collector<S>
where
    S: BuildSource,
{
    pub fn new(source: S, cycle_timeout: Duration) -> Self {
        Self {
            source,
            watermark: Mutex::new(Watermark::default()),
            cycle_timeout,
        }
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    #[cfg(test)]
    pub async fn watermark(&self) -> Watermark {
        *self.watermark.lock().await
    }

    /// Runs one cycle and publishes its metrics to `sink`.
    ///
    /// Either everything is published and the watermark moves to this cycle's
    /// start, or nothing is published and the watermark stays where it was.
    /// The latter happens when listing projects fails, when any project fails,
    /// or when the cycle outlives its timeout.
    pub async fn collect(&self, sink: &dyn MetricsSink) -> Result<CycleReport> {
        let mut watermark = self.watermark.lock().await;
        let started_at = Utc::now();
        let timer = Instant::now();

        info!(
            "[{}] Starting scrape cycle (finished since {})",
            self.name(),
            watermark
                .since()
                .map_or_else(|| "the beginning".to_string(), |ts| ts.to_rfc3339())
        );

        let scraped = tokio::time::timeout(
            self.cycle_timeout,
            self.scrape(watermark.since(), started_at),
        )
        .await;

        let (projects, staged) = match scraped {
            Ok(Ok(scraped)) => scraped,
            Ok(Err(e)) => {
                error!("[{}] Abandoning scrape cycle: {e}", self.name());
                return Err(e);
            }
            Err(_) => {
                let e = ExporterError::CycleTimeout(self.cycle_timeout.as_secs());
                error!("[{}] Abandoning scrape cycle: {e}", self.name());
                return Err(e);
            }
        };

        let observations = staged.len();
        for observation in staged {
            sink.publish(observation);
        }

        let elapsed = timer.elapsed();
        sink.publish(Observation::ScrapeDuration {
            seconds: elapsed.as_secs_f64(),
        });
        watermark.advance(started_at);

        info!(
            "[{}] Scrape cycle finished: {projects} projects, {observations} observations in {:.2}s",
            self.name(),
            elapsed.as_secs_f64()
        );

        Ok(CycleReport {
            projects,
            observations,
            elapsed,
        })
    }

    /// Fetches and derives without publishing anything.
    ///
    /// In-flight builds are measured against `now`, the cycle's start.
    async fn scrape(
        &self,
        since: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(usize, Vec<Observation>)> {
        let projects = self.source.list_projects().await?;
        info!("[{}] Retrieved {} projects", self.name(), projects.len());

        let (sender, receiver) = mpsc::unbounded_channel();
        let (outcome, staged) = tokio::join!(
            fetch_snapshots(&self.source, &projects, since, sender),
            derive_all(receiver, now),
        );

        if !outcome.is_complete() {
            return Err(ExporterError::ProjectFetch {
                failed: outcome.failed.len(),
                total: outcome.total,
            });
        }

        Ok((projects.len(), staged))
    }
}
