//! Shared HTTP plumbing for the drive clients

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("{context} failed")]
    Request {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("401 Unauthorized for {0}. Token may be invalid -- run 'drive-backup login'.")]
    Unauthorized(String),

    #[error("HTTP {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("failed to parse response from {url}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{0} not found")]
    NotFound(String),
}

impl DriveError {
    pub fn request(context: impl Into<String>) -> impl FnOnce(reqwest::Error) -> Self {
        let context = context.into();
        move |source| DriveError::Request { context, source }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            DriveError::NotFound(_) => true,
            DriveError::Status { status, .. } => *status == 404,
            _ => false,
        }
    }
}

/// Check HTTP response status code and return a clear error on failure.
pub async fn check_response(
    resp: reqwest::Response,
    url: &str,
) -> Result<reqwest::Response, DriveError> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(DriveError::Unauthorized(url.to_string()));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(DriveError::Status {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        });
    }
    Ok(resp)
}

/// Decode a successful JSON response.
pub async fn json<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
    url: &str,
) -> Result<T, DriveError> {
    let resp = check_response(resp, url).await?;
    resp.json().await.map_err(|source| DriveError::Decode {
        url: url.to_string(),
        source,
    })
}

/// Read a successful response body.
pub async fn bytes(resp: reqwest::Response, url: &str) -> Result<Vec<u8>, DriveError> {
    let resp = check_response(resp, url).await?;
    resp.bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(DriveError::request(format!("reading {}", url)))
}
