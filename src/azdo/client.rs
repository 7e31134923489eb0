mod builds;
mod projects;
mod retry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, trace, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::{AuthScheme, Token};
use crate::config::ServerConfig;
use crate::error::{ExporterError, Result};

use retry::RetryPolicy;

use super::types::Project;
use super::{BuildSource, ProjectBuilds};

const CONTINUATION_HEADER: &str = "x-ms-continuationtoken";

/// Body of a successful response plus the paging token, if the server sent one.
#[derive(Debug)]
struct ApiResponse {
    body: String,
    continuation_token: Option<String>,
}

/// HTTP client for one Azure DevOps server (or collection).
pub struct AzDoClient {
    client: Client,
    name: String,
    base_url: Url,
    api_version: String,
    token: Option<Token>,
    auth_scheme: AuthScheme,
    static_projects: Vec<Project>,
    retry: RetryPolicy,
}

impl AzDoClient {
    /// Builds a client from a server entry of the configuration file.
    ///
    /// `proxy` is only applied when the server opts in with `use-proxy`.
    pub fn new(name: &str, settings: &ServerConfig, proxy: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(concat!(
            "azdo-build-exporter/",
            env!("CARGO_PKG_VERSION")
        ));

        if settings.use_proxy {
            let proxy_url = proxy.ok_or_else(|| {
                ExporterError::Config(format!(
                    "Server '{name}' sets use-proxy but no proxy url is configured"
                ))
            })?;
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| ExporterError::Config(format!("Invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ExporterError::Config(format!("Failed to create HTTP client: {e}")))?;

        let mut base_url = Url::parse(&settings.address)
            .map_err(|e| ExporterError::Config(format!("Invalid server address: {e}")))?;

        if let Some(collection) = settings
            .default_collection
            .as_deref()
            .filter(|c| !c.is_empty())
        {
            base_url
                .path_segments_mut()
                .map_err(|()| ExporterError::Config("Server address cannot be a base URL".into()))?
                .pop_if_empty()
                .push(collection);
        }

        Ok(Self {
            client,
            name: name.to_owned(),
            base_url,
            api_version: settings.api_version.clone(),
            token: settings.access_token.as_deref().map(Token::from),
            auth_scheme: settings.auth_scheme,
            static_projects: settings.projects.iter().map(|p| Project::from_name(p)).collect(),
            retry: RetryPolicy::default(),
        })
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            self.auth_scheme.apply(request, token)
        } else {
            request
        }
    }

    /// Builds `{address}[/{collection}]/{segments..}?api-version=..&{query..}`.
    fn api_url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ExporterError::Config("Server address cannot be a base URL".into()))?
            .pop_if_empty()
            .extend(segments);

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("api-version", &self.api_version);
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// GET a list endpoint and decode its JSON body.
    ///
    /// Transport errors and non-2xx responses are retried according to the
    /// retry policy. A body that fails to decode is returned as an error right
    /// away.
    ///
    /// Only the first page is read; further pages are reported but not fetched.
    async fn get_json<T>(&self, url: Url) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self.get_with_retry(&url).await?;
        if response.continuation_token.is_some() {
            warn!(
                "[{}] {url} returned more results than fit on one page; the remaining pages are not fetched",
                self.name
            );
        }
        Ok(serde_json::from_str(&response.body)?)
    }

    async fn get_with_retry(&self, url: &Url) -> Result<ApiResponse> {
        let mut backoff = self.retry.start();
        let mut attempts = 0;

        loop {
            attempts += 1;

            let error = match self.get_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };

            let Some(delay) = backoff.next_delay() else {
                return Err(ExporterError::ApiErrorAfterRetries {
                    url: url.to_string(),
                    attempts,
                    last_error: error.to_string(),
                });
            };

            warn!(
                "[{}] Retrying HTTP request to {url} in {}ms (attempt {attempts}): {error}",
                self.name,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn get_once(&self, url: &Url) -> Result<ApiResponse> {
        debug!("[{}] GET {url}", self.name);

        let response = self
            .auth_request(self.client.get(url.clone()))
            .send()
            .await?;

        let status = response.status();
        trace!("[{}] {url} responded with {status}", self.name);

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(ExporterError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let continuation_token = response
            .headers()
            .get(CONTINUATION_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|token| !token.is_empty())
            .map(str::to_owned);

        Ok(ApiResponse {
            body: response.text().await?,
            continuation_token,
        })
    }
}

#[async_trait]
impl BuildSource for AzDoClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        self.fetch_projects().await
    }

    async fn list_builds(
        &self,
        project: &Project,
        since: Option<DateTime<Utc>>,
    ) -> Result<ProjectBuilds> {
        self.fetch_builds(project, since).await
    }
}
