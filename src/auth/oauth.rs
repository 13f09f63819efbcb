//! Authorization-code and refresh-token grants against a provider's token endpoint

use std::time::Duration;

use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::{
    AccessToken, AuthType, AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret,
    RedirectUrl, RefreshToken, RequestTokenError, Scope, StandardRevocableToken, TokenResponse,
    TokenUrl,
};
use serde::{Deserialize, Serialize};
use url::Url;

use super::error::AuthError;
use super::tokens::CredentialRecord;
use super::transport::{TokenTransport, TransportError};
use super::ProviderConfig;

/// Token endpoint response.
///
/// Unlike the stock oauth2 response this tolerates a missing `token_type`;
/// only `access_token` is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantResponse {
    access_token: AccessToken,
    #[serde(default = "bearer")]
    token_type: BasicTokenType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<RefreshToken>,
}

fn bearer() -> BasicTokenType {
    BasicTokenType::Bearer
}

impl TokenResponse<BasicTokenType> for GrantResponse {
    fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    fn token_type(&self) -> &BasicTokenType {
        &self.token_type
    }

    fn expires_in(&self) -> Option<Duration> {
        self.expires_in.map(Duration::from_secs)
    }

    fn refresh_token(&self) -> Option<&RefreshToken> {
        self.refresh_token.as_ref()
    }

    fn scopes(&self) -> Option<&Vec<Scope>> {
        None
    }
}

type TokenClient = Client<
    BasicErrorResponse,
    GrantResponse,
    BasicTokenType,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
>;

type GrantError = RequestTokenError<TransportError, BasicErrorResponse>;

/// Token-endpoint client for one provider.
///
/// Holds no token state: every call is a single round trip through the
/// transport, with no retries.
pub struct OAuthClient<T> {
    config: ProviderConfig,
    client: TokenClient,
    authorize_url: Url,
    transport: T,
}

impl<T: TokenTransport> OAuthClient<T> {
    pub fn new(config: ProviderConfig, transport: T) -> Result<Self, AuthError> {
        let invalid = |what: &str, e: url::ParseError| AuthError::Config(format!("{}: {}", what, e));

        let auth_url =
            AuthUrl::new(config.authorize_url.clone()).map_err(|e| invalid("authorize_url", e))?;
        let token_url =
            TokenUrl::new(config.token_url.clone()).map_err(|e| invalid("token_url", e))?;
        let redirect_url =
            RedirectUrl::new(config.redirect_uri.clone()).map_err(|e| invalid("redirect_uri", e))?;

        // client_id and client_secret travel in the form body, not Basic auth
        let client = TokenClient::new(
            ClientId::new(config.client_id.clone()),
            config.client_secret.clone().map(ClientSecret::new),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::RequestBody)
        .set_redirect_uri(redirect_url);

        let authorize_url = build_authorize_url(&config).map_err(|e| invalid("authorize_url", e))?;

        Ok(Self {
            config,
            client,
            authorize_url,
            transport,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// URL the user opens to grant consent.
    pub fn authorize_url(&self) -> &Url {
        &self.authorize_url
    }

    /// Trade an authorization code for a credential record.
    pub async fn exchange(&self, code: &AuthorizationCode) -> Result<CredentialRecord, AuthError> {
        tracing::info!("Exchanging authorization code for {} tokens", self.config.name);

        let response = self
            .client
            .exchange_code(code.clone())
            .request_async(|request| self.transport.execute(request))
            .await
            .map_err(grant_error)?;

        record_from(response, None)
    }

    /// Renew the access token. A response without a new refresh token keeps
    /// the one passed in.
    pub async fn refresh(&self, refresh_token: &str) -> Result<CredentialRecord, AuthError> {
        tracing::info!("Refreshing {} access token", self.config.name);

        let rt = RefreshToken::new(refresh_token.to_string());
        let response = self
            .client
            .exchange_refresh_token(&rt)
            .add_scopes(self.config.scopes.iter().cloned().map(Scope::new))
            .request_async(|request| self.transport.execute(request))
            .await
            .map_err(grant_error)?;

        record_from(response, Some(refresh_token))
    }
}

fn record_from(
    response: GrantResponse,
    previous_refresh: Option<&str>,
) -> Result<CredentialRecord, AuthError> {
    let access_token = response.access_token().secret().to_string();
    if access_token.is_empty() {
        return Err(AuthError::InvalidResponse(
            "empty access_token in token response".to_string(),
        ));
    }

    let refresh_token = response
        .refresh_token()
        .map(|rt| rt.secret().to_string())
        .or_else(|| previous_refresh.map(String::from));

    Ok(CredentialRecord::issued(
        access_token,
        response.expires_in(),
        refresh_token,
    ))
}

fn grant_error(err: GrantError) -> AuthError {
    match err {
        RequestTokenError::ServerResponse(resp) => AuthError::Rejected(resp.to_string()),
        RequestTokenError::Request(e) => AuthError::Transport(e.to_string()),
        RequestTokenError::Parse(e, body) => AuthError::InvalidResponse(format!(
            "{} (body: {})",
            e,
            String::from_utf8_lossy(&body)
        )),
        RequestTokenError::Other(msg) => AuthError::Rejected(msg),
    }
}

/// `authorize_url?client_id=..&redirect_uri=..&scope=..&response_type=code`,
/// followed by any provider-specific extras.
fn build_authorize_url(config: &ProviderConfig) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&config.authorize_url)?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", &config.redirect_uri)
            .append_pair("scope", &config.scopes.join(" "))
            .append_pair("response_type", "code");
        for (key, value) in &config.extra_authorize_params {
            query.append_pair(key, value);
        }
    }
    Ok(url)
}


#[cfg(test)]
mod tests {
    use super::testing::FakeTransport;
    use super::*;
    use crate::auth::tokens::unix_now;
    use serde_json::json;

    fn config() -> ProviderConfig {
        ProviderConfig {
            name: "test".to_string(),
            client_id: "client-1".to_string(),
            client_secret: Some("s3cret".to_string()),
            authorize_url: "https://login.example.com/authorize".to_string(),
            token_url: "https://login.example.com/token".to_string(),
            redirect_uri: "http://localhost:8080/".to_string(),
            scopes: vec!["files.readwrite".to_string(), "offline_access".to_string()],
            extra_authorize_params: Vec::new(),
        }
    }

    #[test]
    fn test_authorize_url_carries_client_parameters() {
        let client = OAuthClient::new(config(), FakeTransport::new()).unwrap();
        let url = client.authorize_url();

        assert_eq!(url.host_str(), Some("login.example.com"));
        assert_eq!(url.path(), "/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("client_id".to_string(), "client-1".to_string()),
                ("redirect_uri".to_string(), "http://localhost:8080/".to_string()),
                ("scope".to_string(), "files.readwrite offline_access".to_string()),
                ("response_type".to_string(), "code".to_string()),
            ]
        );
        // Encoded, not raw
        assert!(url.as_str().contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2F"));
    }

    #[test]
    fn test_authorize_url_appends_extra_parameters() {
        let mut cfg = config();
        cfg.extra_authorize_params = vec![("access_type".to_string(), "offline".to_string())];
        let client = OAuthClient::new(cfg, FakeTransport::new()).unwrap();
        assert!(client.authorize_url().as_str().ends_with("&access_type=offline"));
    }

    #[test]
    fn test_invalid_token_url_is_config_error() {
        let mut cfg = config();
        cfg.token_url = "not a url".to_string();
        let err = OAuthClient::new(cfg, FakeTransport::new()).err().unwrap();
        assert!(matches!(err, AuthError::Config(_)));
    }

    #[tokio::test]
    async fn test_exchange_posts_code_grant() {
        let transport = FakeTransport::new().respond(
            200,
            json!({"access_token": "A1", "token_type": "Bearer", "expires_in": 120, "refresh_token": "R1"}),
        );
        let client = OAuthClient::new(config(), transport).unwrap();

        let before = unix_now();
        let record = client
            .exchange(&AuthorizationCode::new("XYZ".to_string()))
            .await
            .unwrap();

        assert_eq!(record.access_token, "A1");
        assert_eq!(record.refresh_token.as_deref(), Some("R1"));
        let exp = record.expires_at.unwrap();
        assert!(exp >= before + 120.0 && exp <= unix_now() + 120.0);

        let transport = &client.transport;
        assert_eq!(transport.calls(), 1);
        assert_eq!(transport.url(0), "https://login.example.com/token");
        let form = transport.form(0);
        assert_eq!(form["grant_type"], "authorization_code");
        assert_eq!(form["code"], "XYZ");
        assert_eq!(form["client_id"], "client-1");
        assert_eq!(form["client_secret"], "s3cret");
        assert_eq!(form["redirect_uri"], "http://localhost:8080/");
    }

    #[tokio::test]
    async fn test_exchange_without_secret_omits_it() {
        let mut cfg = config();
        cfg.client_secret = None;
        let transport = FakeTransport::new().respond(200, json!({"access_token": "A1"}));
        let client = OAuthClient::new(cfg, transport).unwrap();

        let record = client
            .exchange(&AuthorizationCode::new("c".to_string()))
            .await
            .unwrap();

        // Exchange carries whatever refresh token came back: here none
        assert_eq!(record.refresh_token, None);
        let form = client.transport.form(0);
        assert_eq!(form["client_id"], "client-1");
        assert!(!form.contains_key("client_secret"));
    }

    #[tokio::test]
    async fn test_exchange_defaults_expiry_to_an_hour() {
        let transport = FakeTransport::new().respond(200, json!({"access_token": "A1"}));
        let client = OAuthClient::new(config(), transport).unwrap();

        let before = unix_now();
        let record = client
            .exchange(&AuthorizationCode::new("c".to_string()))
            .await
            .unwrap();
        assert!(record.expires_at.unwrap() >= before + 3600.0);
    }

    #[tokio::test]
    async fn test_refresh_posts_refresh_grant_with_scope() {
        let transport = FakeTransport::new().respond(
            200,
            json!({"access_token": "B", "token_type": "Bearer", "expires_in": 3600}),
        );
        let client = OAuthClient::new(config(), transport).unwrap();

        let record = client.refresh("R").await.unwrap();
        assert_eq!(record.access_token, "B");
        // No rotation in the response: the old refresh token is kept
        assert_eq!(record.refresh_token.as_deref(), Some("R"));

        let form = client.transport.form(0);
        assert_eq!(form["grant_type"], "refresh_token");
        assert_eq!(form["refresh_token"], "R");
        assert_eq!(form["scope"], "files.readwrite offline_access");
        assert_eq!(form["client_secret"], "s3cret");
    }

    #[tokio::test]
    async fn test_refresh_takes_rotated_token() {
        let transport = FakeTransport::new().respond(
            200,
            json!({"access_token": "B", "expires_in": 3600, "refresh_token": "R2"}),
        );
        let client = OAuthClient::new(config(), transport).unwrap();

        let record = client.refresh("R").await.unwrap();
        assert_eq!(record.refresh_token.as_deref(), Some("R2"));
    }

    #[tokio::test]
    async fn test_missing_access_token_is_failure() {
        let transport = FakeTransport::new()
            .respond(200, json!({"token_type": "Bearer", "expires_in": 3600}))
            .respond(200, json!({"access_token": ""}));
        let client = OAuthClient::new(config(), transport).unwrap();

        let err = client.refresh("R").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidResponse(_)), "{:?}", err);

        let err = client
            .exchange(&AuthorizationCode::new("c".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidResponse(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_provider_error_is_rejected() {
        let transport = FakeTransport::new().respond(
            400,
            json!({"error": "invalid_grant", "error_description": "AADSTS70000: code expired"}),
        );
        let client = OAuthClient::new(config(), transport).unwrap();

        let err = client
            .exchange(&AuthorizationCode::new("stale".to_string()))
            .await
            .unwrap_err();
        match err {
            AuthError::Rejected(reason) => assert!(reason.contains("invalid_grant")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_network_failure_is_transport_error() {
        let transport = FakeTransport::new().fail("connection refused");
        let client = OAuthClient::new(config(), transport).unwrap();

        let err = client.refresh("R").await.unwrap_err();
        match err {
            AuthError::Transport(reason) => assert!(reason.contains("connection refused")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(client.transport.calls(), 1);
    }
}
