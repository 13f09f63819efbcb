//! Per-provider session: turns the stored record into a usable bearer token
//!
//! The session walks `NoCredential` / `Expired` / `AwaitingUserAuthorization`
//! until it reaches `Valid` or fails. A failed authorization ends the run for
//! this provider; nothing is retried.

use std::io::{self, BufRead, Write};

use oauth2::AuthorizationCode;
use url::Url;

use super::error::AuthError;
use super::oauth::OAuthClient;
use super::tokens::{CredentialRecord, TokenStore};
use super::transport::TokenTransport;

/// Query parameter carrying the authorization code in the redirect URL.
const CODE_PARAM: &str = "code";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoCredential,
    Valid,
    Expired,
    AwaitingUserAuthorization,
}

/// Interactive step of the authorization-code flow.
pub trait Prompt {
    /// Show `url` to the user and return the redirect URL they paste back.
    fn authorize(&mut self, provider: &str, url: &Url) -> io::Result<String>;
}

/// Prompt on the controlling terminal.
pub struct ConsolePrompt;

impl Prompt for ConsolePrompt {
    fn authorize(&mut self, provider: &str, url: &Url) -> io::Result<String> {
        println!();
        println!("To authorize {}, open this link and sign in:", provider);
        println!();
        println!("{}", url);
        println!();
        print!("Paste the redirected URL here: ");
        io::stdout().flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

/// Pull the authorization code out of the redirect URL the user pasted.
pub fn extract_code(redirect: &str) -> Result<AuthorizationCode, AuthError> {
    let url = Url::parse(redirect.trim())
        .map_err(|e| AuthError::InvalidRedirect(format!("{} ({})", e, redirect.trim())))?;

    url.query_pairs()
        .find(|(key, _)| key == CODE_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|code| !code.is_empty())
        .map(AuthorizationCode::new)
        .ok_or(AuthError::MissingParameter(CODE_PARAM))
}

/// Yields a valid access token for one provider on demand.
///
/// The session is the only writer of its token store slot.
pub struct ProviderSession<S, T> {
    client: OAuthClient<T>,
    store: S,
    prompt: Box<dyn Prompt + Send>,
    state: SessionState,
    current: Option<CredentialRecord>,
}

impl<S: TokenStore, T: TokenTransport> ProviderSession<S, T> {
    pub fn new(client: OAuthClient<T>, store: S, prompt: Box<dyn Prompt + Send>) -> Self {
        Self {
            client,
            store,
            prompt,
            state: SessionState::NoCredential,
            current: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.client.config().name
    }

    #[cfg(test)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Classify the stored record without touching the network.
    pub fn inspect(&self) -> (SessionState, Option<CredentialRecord>) {
        match self.store.load() {
            None => (SessionState::NoCredential, None),
            Some(record) if record.is_valid() => (SessionState::Valid, Some(record)),
            Some(record) => (SessionState::Expired, Some(record)),
        }
    }

    /// Return a valid access token, refreshing or re-authorizing as needed.
    pub async fn acquire(&mut self) -> Result<String, AuthError> {
        if let Some(record) = self.current.as_ref().filter(|r| r.is_valid()) {
            return Ok(record.access_token.clone());
        }

        let (state, stored) = self.inspect();
        self.state = state;

        match (state, stored) {
            (SessionState::Valid, Some(record)) => {
                tracing::debug!("Using cached {} token", self.name());
                let token = record.access_token.clone();
                self.current = Some(record);
                return Ok(token);
            }
            (SessionState::Expired, Some(record)) => match record.refresh_token() {
                Some(refresh_token) => match self.client.refresh(refresh_token).await {
                    Ok(fresh) => return Ok(self.accept(fresh)),
                    Err(e) => {
                        tracing::warn!(
                            "{} token refresh failed, falling back to authorization: {}",
                            self.name(),
                            e
                        );
                    }
                },
                None => {
                    tracing::info!(
                        "{} token expired and no refresh token stored",
                        self.name()
                    );
                }
            },
            _ => {
                tracing::info!("No usable {} credential stored", self.name());
            }
        }

        self.authorize().await
    }

    /// Drop the cached record, in memory and on disk.
    pub fn reset(&mut self) -> Result<(), super::StoreError> {
        self.current = None;
        self.state = SessionState::NoCredential;
        self.store.clear()
    }

    async fn authorize(&mut self) -> Result<String, AuthError> {
        self.state = SessionState::AwaitingUserAuthorization;

        let provider = self.client.config().name.clone();
        let redirect = self
            .prompt
            .authorize(&provider, self.client.authorize_url())
            .map_err(AuthError::Prompt)?;
        let code = extract_code(&redirect)?;

        let fresh = self.client.exchange(&code).await?;
        Ok(self.accept(fresh))
    }

    /// Persist a freshly issued record and make it current. A failed write is
    /// reported but does not invalidate the token just obtained.
    fn accept(&mut self, record: CredentialRecord) -> String {
        if let Err(e) = self.store.save(&record) {
            tracing::warn!("Could not persist {} token: {}", self.name(), e);
            eprintln!(
                "Warning: {} token could not be saved; you will be asked to authorize again next run.",
                self.name()
            );
        }

        let token = record.access_token.clone();
        self.current = Some(record);
        self.state = SessionState::Valid;
        token
    }
}
