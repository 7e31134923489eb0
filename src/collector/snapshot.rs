use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, warn};
use tokio::sync::mpsc::UnboundedSender;

use crate::azdo::{Build, BuildSource, Project, ProjectBuilds};

/// One project's builds for a single scrape cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub project: Project,
    /// Builds finished since the previous successful cycle, in API order.
    pub finished: Vec<Build>,
    /// Builds queued or running at scrape time.
    pub active: Vec<Build>,
}

impl Snapshot {
    pub fn new(project: Project, builds: ProjectBuilds) -> Self {
        Self {
            project,
            finished: builds.finished,
            active: builds.active,
        }
    }
}

/// Result of fetching every project of a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    pub total: usize,
    /// Names of projects whose builds could not be fetched.
    pub failed: Vec<String>,
}

impl FetchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fetches builds for all projects concurrently and sends a [`Snapshot`] per
/// project on `snapshots` as soon as it arrives.
///
/// A failing project does not stop the others; it is recorded in the returned
/// outcome instead. The sender is dropped only after every fetch has finished,
/// which closes the channel for the consumer.
pub async fn fetch_snapshots<S>(
    source: &S,
    projects: &[Project],
    since: Option<DateTime<Utc>>,
    snapshots: UnboundedSender<Snapshot>,
) -> FetchOutcome
where
    S: BuildSource + ?Sized,
{
    let mut pending: FuturesUnordered<_> = projects
        .iter()
        .map(|project| async move { (project, source.list_builds(project, since).await) })
        .collect();

    let mut outcome = FetchOutcome {
        total: projects.len(),
        failed: Vec::new(),
    };

    while let Some((project, result)) = pending.next().await {
        match result {
            Ok(builds) => {
                debug!(
                    "[{}] Fetched builds for {}: {} finished, {} active",
                    source.name(),
                    project.name,
                    builds.finished.len(),
                    builds.active.len()
                );
                // The consumer only goes away when the cycle itself was dropped.
                let _ = snapshots.send(Snapshot::new(project.clone(), builds));
            }
            Err(e) => {
                warn!(
                    "[{}] Failed to fetch builds for {}: {e}",
                    source.name(),
                    project.name
                );
                outcome.failed.push(project.name.clone());
            }
        }
    }

    outcome
}
