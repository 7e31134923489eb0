use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;

use super::AzDoClient;
use crate::azdo::types::{Build, ResponseEnvelope};
use crate::azdo::{Project, ProjectBuilds};
use crate::error::Result;

const FINISHED_STATUS: &str = "completed";
const ACTIVE_STATUSES: &str = "inProgress,notStarted";

impl AzDoClient {
    /// Fetches finished and active builds of a project concurrently.
    ///
    /// Finished builds are limited to those that completed at or after `since`.
    /// Active builds are never time filtered since they have no finish time.
    pub async fn fetch_builds(
        &self,
        project: &Project,
        since: Option<DateTime<Utc>>,
    ) -> Result<ProjectBuilds> {
        let (finished, active) = tokio::try_join!(
            self.fetch_finished_builds(project, since),
            self.fetch_active_builds(project),
        )?;

        debug!(
            "[{}] {}: {} finished, {} active builds",
            self.name,
            project.name,
            finished.len(),
            active.len()
        );

        Ok(ProjectBuilds { finished, active })
    }

    async fn fetch_finished_builds(
        &self,
        project: &Project,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Build>> {
        let min_time = since.map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true));

        let mut query = vec![
            ("statusFilter", FINISHED_STATUS),
            ("queryOrder", "finishTimeAscending"),
        ];
        if let Some(min_time) = min_time.as_deref() {
            query.push(("minTime", min_time));
        }

        self.list_builds_with(project, &query).await
    }

    async fn fetch_active_builds(&self, project: &Project) -> Result<Vec<Build>> {
        self.list_builds_with(project, &[("statusFilter", ACTIVE_STATUSES)])
            .await
    }

    async fn list_builds_with(&self, project: &Project, query: &[(&str, &str)]) -> Result<Vec<Build>> {
        let url = self.api_url(&[project.name.as_str(), "_apis", "build", "builds"], query)?;
        let envelope: ResponseEnvelope<Build> = self.get_json(url).await?;
        Ok(envelope.value)
    }
}
