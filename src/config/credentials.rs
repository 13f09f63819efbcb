//! Client credential files (client id / secret issued by each provider)

use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::ConfigError;

/// OAuth client registration as read from disk.
///
/// Accepts a flat `{client_id, client_secret}` object or Google's
/// downloaded format, where the same fields sit under `installed` or `web`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default, alias = "auth_uri")]
    pub authorize_url: Option<String>,
    #[serde(default, alias = "token_uri")]
    pub token_url: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Deserialize)]
struct GoogleEnvelope {
    installed: Option<ClientCredentials>,
    web: Option<ClientCredentials>,
}

impl ClientCredentials {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::Credentials {
            path: path.to_path_buf(),
            reason,
        };

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;

        let creds = if value.get("installed").is_some() || value.get("web").is_some() {
            let envelope: GoogleEnvelope =
                serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;
            envelope
                .installed
                .or(envelope.web)
                .ok_or_else(|| invalid("empty client section".to_string()))?
        } else {
            serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?
        };

        if creds.client_id.trim().is_empty() {
            return Err(invalid("client_id is empty".to_string()));
        }
        Ok(creds)
    }

    pub fn secret(&self) -> Option<String> {
        self.client_secret.clone().filter(|s| !s.is_empty())
    }
}
