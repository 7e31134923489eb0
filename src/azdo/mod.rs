mod client;
mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

pub use client::AzDoClient;
pub use types::{Build, Definition, Project};

/// Builds of one project as returned by the two build-listing queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectBuilds {
    /// Completed builds, filtered server-side by the watermark.
    pub finished: Vec<Build>,
    /// Builds queued or running right now.
    pub active: Vec<Build>,
}

/// Source of project and build data for the scrape pipeline.
#[async_trait]
pub trait BuildSource: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &str;

    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// `since` bounds finished builds by finish time; `None` fetches all of them.
    async fn list_builds(
        &self,
        project: &Project,
        since: Option<DateTime<Utc>>,
    ) -> Result<ProjectBuilds>;
}
