use log::info;

use super::AzDoClient;
use crate::azdo::types::{Project, ResponseEnvelope};
use crate::error::Result;

impl AzDoClient {
    /// Lists the projects to scrape.
    ///
    /// A static project list from the configuration is returned as-is and the
    /// server is never asked.
    pub async fn fetch_projects(&self) -> Result<Vec<Project>> {
        if !self.static_projects.is_empty() {
            info!(
                "[{}] Using {} configured projects",
                self.name,
                self.static_projects.len()
            );
            return Ok(self.static_projects.clone());
        }

        let url = self.api_url(&["_apis", "projects"], &[])?;
        let envelope: ResponseEnvelope<Project> = self.get_json(url).await?;

        info!("[{}] Discovered {} projects", self.name, envelope.value.len());
        Ok(envelope.value)
    }
}
