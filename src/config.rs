use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::AuthScheme;

/// Configuration file structure for the exporter.
///
/// Loaded from TOML, JSON or YAML. Keys are kebab-case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Azure DevOps servers to scrape, keyed by a name used in logs
    #[serde(default)]
    pub servers: BTreeMap<String, ServerConfig>,

    /// Outbound proxy for servers that set `use-proxy`
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// HTTP listener settings
    #[serde(default)]
    pub exporter: ExporterConfig,
}

/// Connection settings for one server or collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Base address, e.g. `https://dev.azure.com/my-org`
    pub address: String,

    /// Collection path segment for on-premises servers
    pub default_collection: Option<String>,

    /// REST API version sent as `api-version`
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Personal access token, or `env:NAME` to read it from the environment
    pub access_token: Option<String>,

    #[serde(default)]
    pub auth_scheme: AuthScheme,

    /// Static project list; skips project discovery when non-empty
    #[serde(default)]
    pub projects: Vec<String>,

    /// Route requests through `proxy.url`
    #[serde(default)]
    pub use_proxy: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProxyConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExporterConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path that serves the metrics
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Upper bound for one scrape cycle of a server
    #[serde(default = "default_cycle_timeout_secs")]
    pub cycle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            default_collection: None,
            api_version: default_api_version(),
            access_token: None,
            auth_scheme: AuthScheme::default(),
            projects: Vec::new(),
            use_proxy: false,
        }
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            endpoint: default_endpoint(),
            cycle_timeout_secs: default_cycle_timeout_secs(),
        }
    }
}

fn default_api_version() -> String {
    "6.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_endpoint() -> String {
    "/metrics".to_string()
}

fn default_cycle_timeout_secs() -> u64 {
    120
}

impl ExporterConfig {
    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./azdo-exporter.toml
    /// 3. ./azdo-exporter.json
    /// 4. ./azdo-exporter.yaml
    /// 5. ./azdo-exporter.yml
    ///
    /// Token references of the form `env:NAME` are resolved after parsing.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::load_from_candidates()?,
        };

        config.resolve_tokens()?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_candidates() -> Result<Self> {
        let candidates = [
            "azdo-exporter.toml",
            "azdo-exporter.json",
            "azdo-exporter.yaml",
            "azdo-exporter.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        bail!(
            "No configuration file found (looked for {})",
            candidates.join(", ")
        )
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => {
                // Try TOML first, then JSON, then YAML
                toml::from_str(&contents)
                    .or_else(|_| serde_json::from_str(&contents))
                    .or_else(|_| serde_yaml::from_str(&contents))
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))
            }
        }
    }

    fn resolve_tokens(&mut self) -> Result<()> {
        for (name, server) in &mut self.servers {
            if let Some(var) = server
                .access_token
                .as_deref()
                .and_then(|token| token.strip_prefix("env:"))
            {
                let token = std::env::var(var).with_context(|| {
                    format!("Access token for server '{name}' refers to unset variable {var}")
                })?;
                server.access_token = Some(token);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            bail!("Configuration does not define any servers");
        }

        for (name, server) in &self.servers {
            if server.address.is_empty() {
                bail!("Server '{name}' has no address");
            }
            if server.use_proxy && self.proxy.url.is_none() {
                bail!("Server '{name}' sets use-proxy but proxy.url is missing");
            }
        }

        if !self.exporter.endpoint.starts_with('/') {
            bail!(
                "Exporter endpoint must start with '/': {}",
                self.exporter.endpoint
            );
        }

        Ok(())
    }
}
