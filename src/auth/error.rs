//! Error types for the token lifecycle

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to persist or remove a credential record.
///
/// Read failures never surface as this type: an unreadable record is
/// treated the same as a missing one.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create token directory {}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write token file {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove token file {}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize credential record")]
    Serialize(#[from] serde_json::Error),
}

/// Failure to obtain a usable access token for the current run.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid provider configuration: {0}")]
    Config(String),

    #[error("token endpoint rejected the request: {0}")]
    Rejected(String),

    #[error("token request failed: {0}")]
    Transport(String),

    #[error("unexpected token endpoint response: {0}")]
    InvalidResponse(String),

    #[error("redirect URL could not be parsed: {0}")]
    InvalidRedirect(String),

    #[error("redirect URL has no '{0}' query parameter")]
    MissingParameter(&'static str),

    #[error("authorization prompt failed")]
    Prompt(#[source] io::Error),
}
