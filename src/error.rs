use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("API request to {url} still failing after {attempts} attempts: {last_error}")]
    ApiErrorAfterRetries {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Failed to fetch builds for {failed} of {total} projects")]
    ProjectFetch { failed: usize, total: usize },

    #[error("Scrape failed for all {0} configured servers")]
    AllServersFailed(usize),

    #[error("Scrape cycle exceeded its deadline of {0} seconds")]
    CycleTimeout(u64),
}

pub type Result<T> = std::result::Result<T, ExporterError>;
