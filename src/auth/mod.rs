//! Authentication module for OneDrive and Google Drive
//!
//! Implements the OAuth2 authorization-code flow with a cached, refreshable
//! credential record per provider. Both providers share one client and
//! session implementation and differ only in their `ProviderConfig`.

mod error;
pub mod login;
pub mod oauth;
pub mod session;
pub mod tokens;
pub mod transport;

pub use error::StoreError;
pub use login::{login, logout, status};
pub use oauth::OAuthClient;
pub use session::{ConsolePrompt, ProviderSession, SessionState};
pub use tokens::{JsonFileStore, TokenStore};
pub use transport::HttpTransport;

use crate::config::{ClientCredentials, Config, ConfigError};

const MS_AUTHORIZE_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
const MS_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const MS_SCOPES: &[&str] = &["files.readwrite", "offline_access"];

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_SCOPES: &[&str] = &["https://www.googleapis.com/auth/drive"];

const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/";

/// Cloud storage providers the tool uploads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Provider {
    #[value(name = "onedrive")]
    OneDrive,
    #[value(name = "google")]
    GoogleDrive,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::OneDrive, Provider::GoogleDrive];

    /// Short key used in file names
    pub fn key(self) -> &'static str {
        match self {
            Provider::OneDrive => "onedrive",
            Provider::GoogleDrive => "google",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Provider::OneDrive => "OneDrive",
            Provider::GoogleDrive => "Google Drive",
        }
    }
}

/// OAuth2 client configuration for one provider.
///
/// Immutable once a session is built from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Display name used in prompts and logs
    pub name: String,
    pub client_id: String,
    /// Confidential clients only
    pub client_secret: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// Appended to the authorization URL after the standard parameters
    pub extra_authorize_params: Vec<(String, String)>,
}

impl ProviderConfig {
    /// Microsoft identity platform, personal and work accounts.
    pub fn onedrive(creds: &ClientCredentials) -> Self {
        Self {
            name: Provider::OneDrive.label().to_string(),
            client_id: creds.client_id.clone(),
            client_secret: creds.secret(),
            authorize_url: creds
                .authorize_url
                .clone()
                .unwrap_or_else(|| MS_AUTHORIZE_URL.to_string()),
            token_url: creds
                .token_url
                .clone()
                .unwrap_or_else(|| MS_TOKEN_URL.to_string()),
            redirect_uri: redirect_uri(creds),
            scopes: MS_SCOPES.iter().map(|s| s.to_string()).collect(),
            extra_authorize_params: Vec::new(),
        }
    }

    /// Google OAuth; offline access with forced consent so a refresh token is issued.
    pub fn google_drive(creds: &ClientCredentials) -> Self {
        Self {
            name: Provider::GoogleDrive.label().to_string(),
            client_id: creds.client_id.clone(),
            client_secret: creds.secret(),
            authorize_url: creds
                .authorize_url
                .clone()
                .unwrap_or_else(|| GOOGLE_AUTHORIZE_URL.to_string()),
            token_url: creds
                .token_url
                .clone()
                .unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
            redirect_uri: redirect_uri(creds),
            scopes: GOOGLE_SCOPES.iter().map(|s| s.to_string()).collect(),
            extra_authorize_params: vec![
                ("access_type".to_string(), "offline".to_string()),
                ("prompt".to_string(), "consent".to_string()),
            ],
        }
    }

    pub fn for_provider(provider: Provider, creds: &ClientCredentials) -> Self {
        match provider {
            Provider::OneDrive => Self::onedrive(creds),
            Provider::GoogleDrive => Self::google_drive(creds),
        }
    }
}

fn redirect_uri(creds: &ClientCredentials) -> String {
    creds
        .redirect_uris
        .first()
        .cloned()
        .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string())
}

/// Session type used by the commands.
pub type Session = ProviderSession<JsonFileStore, HttpTransport>;

/// Build the session for `provider` from configuration.
///
/// Fails before any network traffic if the client credentials are missing
/// or malformed.
pub fn open_session(
    config: &Config,
    provider: Provider,
    transport: HttpTransport,
) -> Result<Session, ConfigError> {
    let creds = ClientCredentials::load(&config.client_file(provider))?;
    let provider_config = ProviderConfig::for_provider(provider, &creds);
    let client = OAuthClient::new(provider_config, transport)
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    let store = JsonFileStore::new(config.token_file(provider));

    Ok(ProviderSession::new(client, store, Box::new(ConsolePrompt)))
}
