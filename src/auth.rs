use serde::{Deserialize, Serialize};

/// Personal access token for the Azure DevOps REST API.
///
/// Kept opaque; `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Token(***)")
    }
}

/// How the token is presented in the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// Basic auth with an empty user name, as Azure DevOps expects for PATs.
    #[default]
    Basic,
    Bearer,
}

impl AuthScheme {
    pub fn apply(self, request: reqwest::RequestBuilder, token: &Token) -> reqwest::RequestBuilder {
        match self {
            Self::Basic => request.basic_auth("", Some(token.as_str())),
            Self::Bearer => request.bearer_auth(token.as_str()),
        }
    }
}
