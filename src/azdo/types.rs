use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// `{count, value}` wrapper used by every Azure DevOps list endpoint.
#[derive(Debug, Deserialize)]
pub struct ResponseEnvelope<T> {
    #[allow(dead_code)]
    pub count: usize,
    pub value: Vec<T>,
}

/// A team project on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

impl Project {
    /// Project taken from static configuration, where only the name is known.
    pub fn from_name(name: &str) -> Self {
        Self {
            id: name.to_owned(),
            name: name.to_owned(),
        }
    }
}

/// Build definition (pipeline) a build was queued from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

/// A single build run.
///
/// Timestamps that the server has not filled in yet are `None`. A missing
/// `start_time` on an active build means the build is still queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub id: i64,
    #[serde(rename = "buildNumber", default)]
    pub number: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub result: String,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub queue_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub finish_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub receive_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub definition: Definition,
}

impl Build {
    /// An active build without a start time is waiting for an agent.
    pub fn is_queued(&self) -> bool {
        self.start_time.is_none()
    }
}

/// Accepts `null`, a missing field, or the `0001-01-01T00:00:00Z` placeholder
/// the server uses for phases that have not happened yet.
fn optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(value.filter(|ts| ts.year() > 1))
}
