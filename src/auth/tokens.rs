//! Credential records and their on-disk store

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::error::StoreError;

/// Lifetime assumed when the token endpoint does not send `expires_in`.
pub const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(3600);

/// Current wall-clock time as fractional Unix seconds.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Persisted token triple for one provider.
///
/// `expires_at` is fractional Unix seconds. A record without a refresh token
/// cannot be renewed silently; once the access token expires the user has to
/// authorize again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: String,
    #[serde(default)]
    pub expires_at: Option<f64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl CredentialRecord {
    /// Build a record for a freshly issued token, expiring `expires_in` from now.
    pub fn issued(
        access_token: String,
        expires_in: Option<Duration>,
        refresh_token: Option<String>,
    ) -> Self {
        let lifetime = expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        Self {
            access_token,
            expires_at: Some(unix_now() + lifetime.as_secs_f64()),
            refresh_token,
        }
    }

    /// Strictly later than `now`, no skew margin.
    pub fn is_valid_at(&self, now: f64) -> bool {
        !self.access_token.is_empty() && matches!(self.expires_at, Some(exp) if exp > now)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(unix_now())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|rt| !rt.is_empty())
    }
}

/// Storage slot holding at most one credential record.
pub trait TokenStore {
    /// Missing and unparsable records both come back as `None`.
    fn load(&self) -> Option<CredentialRecord>;

    /// Replace the stored record wholesale.
    fn save(&self, record: &CredentialRecord) -> Result<(), StoreError>;

    /// Forget the stored record. Clearing an empty slot is not an error.
    fn clear(&self) -> Result<(), StoreError>;
}

/// Token store backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl TokenStore for JsonFileStore {
    fn load(&self) -> Option<CredentialRecord> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No token file at {}", self.path.display());
                return None;
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable token file {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Ignoring malformed token file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn save(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| StoreError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let content = serde_json::to_string_pretty(record)?;

        // Write then rename so readers never see a half-written record
        let tmp = self.temp_path();
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        fs::write(&tmp, content).map_err(write_err)?;

        // Tokens are credentials; keep them private to the user
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600)).map_err(write_err)?;
        }

        fs::rename(&tmp, &self.path).map_err(write_err)?;
        tracing::debug!("Saved credential record to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
