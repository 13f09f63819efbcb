//! Configuration loading and per-host overrides

mod credentials;

pub use credentials::ClientCredentials;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::Provider;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,

    #[error("config file {} not found; create it or pass --config", .0.display())]
    Missing(PathBuf),

    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid client credentials in {}: {reason}", path.display())]
    Credentials { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// What to do when one provider fails during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Skip the failed provider and carry on with the next one
    #[default]
    Continue,
    /// Stop the whole run
    Abort,
}

/// Which local artifact a provider receives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadSource {
    #[default]
    Pdf,
    LastPage,
}

/// External command with `{input}`, `{output}` and `{outdir}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertConfig {
    #[serde(default = "default_converter")]
    pub converter: CommandSpec,
    #[serde(default = "default_extractor")]
    pub extractor: CommandSpec,
}

fn default_converter() -> CommandSpec {
    CommandSpec::new(
        "soffice",
        &["--headless", "--convert-to", "pdf", "--outdir", "{outdir}", "{input}"],
    )
}

fn default_extractor() -> CommandSpec {
    CommandSpec::new("qpdf", &["{input}", "--pages", ".", "r1", "--", "{output}"])
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            converter: default_converter(),
            extractor: default_extractor(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Document to convert
    pub source: PathBuf,
    /// Where the converted PDF is written
    pub pdf: PathBuf,
    /// Where the single-page extract is written, when any provider wants it
    #[serde(default)]
    pub last_page: Option<PathBuf>,
}

/// Upload target settings for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderTarget {
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Client credentials file, relative to `credentials_dir`
    #[serde(default)]
    pub client_file: Option<String>,
    /// Token cache file, relative to `credentials_dir`
    #[serde(default)]
    pub token_file: Option<String>,
    /// Remote folders to upload into; an empty name is the drive root
    #[serde(default = "root_folder")]
    pub folders: Vec<String>,
    #[serde(default)]
    pub upload: UploadSource,
    /// Remote file name; defaults to the local file name
    #[serde(default)]
    pub remote_name: Option<String>,
}

fn enabled() -> bool {
    true
}

fn root_folder() -> Vec<String> {
    vec![String::new()]
}

impl Default for ProviderTarget {
    fn default() -> Self {
        Self {
            enabled: true,
            client_file: None,
            token_file: None,
            folders: root_folder(),
            upload: UploadSource::Pdf,
            remote_name: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentOverride {
    pub source: Option<PathBuf>,
    pub pdf: Option<PathBuf>,
    pub last_page: Option<PathBuf>,
}

/// Settings that differ between machines sharing one config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostOverride {
    pub credentials_dir: Option<PathBuf>,
    #[serde(default)]
    pub document: DocumentOverride,
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding client credential files and cached tokens
    pub credentials_dir: PathBuf,
    pub document: DocumentConfig,
    #[serde(default)]
    pub convert: ConvertConfig,
    #[serde(default)]
    pub onedrive: ProviderTarget,
    #[serde(default)]
    pub google_drive: ProviderTarget,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default = "default_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default)]
    pub hosts: BTreeMap<String, HostOverride>,
}

fn default_timeout_secs() -> u64 {
    crate::auth::transport::DEFAULT_TIMEOUT.as_secs()
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf, ConfigError> {
        let proj_dirs = ProjectDirs::from("com", "drive-backup", "drive-backup")
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from `path`, or from the platform config directory.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        if !path.exists() {
            return Err(ConfigError::Missing(path));
        }

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply the `[hosts.<host>]` section, if there is one.
    pub fn for_host(mut self, host: &str) -> Self {
        let Some(over) = self.hosts.get(host).cloned() else {
            tracing::debug!("No host overrides for '{}'", host);
            return self;
        };

        tracing::debug!("Applying host overrides for '{}'", host);
        if let Some(dir) = over.credentials_dir {
            self.credentials_dir = dir;
        }
        if let Some(source) = over.document.source {
            self.document.source = source;
        }
        if let Some(pdf) = over.document.pdf {
            self.document.pdf = pdf;
        }
        if let Some(last_page) = over.document.last_page {
            self.document.last_page = Some(last_page);
        }
        self
    }

    pub fn target(&self, provider: Provider) -> &ProviderTarget {
        match provider {
            Provider::OneDrive => &self.onedrive,
            Provider::GoogleDrive => &self.google_drive,
        }
    }

    pub fn client_file(&self, provider: Provider) -> PathBuf {
        let name = self
            .target(provider)
            .client_file
            .clone()
            .unwrap_or_else(|| format!("{}_credentials.json", provider.key()));
        self.credentials_dir.join(name)
    }

    pub fn token_file(&self, provider: Provider) -> PathBuf {
        let name = self
            .target(provider)
            .token_file
            .clone()
            .unwrap_or_else(|| format!("{}_token.json", provider.key()));
        self.credentials_dir.join(name)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    /// Enabled providers in upload order.
    pub fn enabled_providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.target(*p).enabled)
            .collect()
    }

    /// Path of the single-page extract, if any enabled provider uploads it.
    pub fn last_page_path(&self) -> Result<Option<PathBuf>, ConfigError> {
        let wanted = self
            .enabled_providers()
            .into_iter()
            .any(|p| self.target(p).upload == UploadSource::LastPage);
        if !wanted {
            return Ok(None);
        }

        match &self.document.last_page {
            Some(path) => Ok(Some(path.clone())),
            None => Err(ConfigError::Invalid(
                "a provider uploads the last page but document.last_page is not set".to_string(),
            )),
        }
    }
}

/// Name of the machine, used to pick `[hosts.*]` overrides.
///
/// Resolution order: explicit value, `DRIVE_BACKUP_HOST`, `HOSTNAME`,
/// `COMPUTERNAME`, then `/etc/hostname`.
pub fn current_hostname(explicit: Option<&str>) -> Option<String> {
    if let Some(host) = explicit.filter(|h| !h.is_empty()) {
        return Some(host.to_string());
    }

    ["DRIVE_BACKUP_HOST", "HOSTNAME", "COMPUTERNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
        .or_else(|| {
            fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}
