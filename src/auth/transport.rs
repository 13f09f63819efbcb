//! HTTP transport shared by the token endpoint and the drive APIs

use std::time::Duration;

use async_trait::async_trait;
use oauth2::{HttpRequest, HttpResponse};
use thiserror::Error;

/// Timeout applied to every request unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[cfg(test)]
    #[error("{0}")]
    Other(String),
}

/// Executes a single token-endpoint round trip.
#[async_trait]
pub trait TokenTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// reqwest-backed transport with a bounded per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("drive-backup/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Underlying client, for drive API calls.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl TokenTransport for HttpTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        tracing::debug!("{} {}", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method, request.url.as_str())
            .body(request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_bytes());
        }

        let response = self.client.execute(builder.build()?).await?;
        let status_code = response.status();
        let headers = response.headers().to_owned();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status_code,
            headers,
            body,
        })
    }
}
