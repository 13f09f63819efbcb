//! The `run` command: convert, extract, upload, clean up

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::api::{self, RemoteFileSync, RemoteStore};
use crate::auth::{open_session, HttpTransport, Provider};
use crate::config::{Config, ConfigError, FailurePolicy, UploadSource};
use crate::convert::{self, DocumentConverter, PageExtractor};

/// Hands out an authenticated remote store for a provider.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Validate the provider's local setup (client credentials) without any
    /// network traffic.
    fn check(&self, provider: Provider) -> Result<(), ConfigError>;

    async fn connect(&self, provider: Provider) -> Result<Box<dyn RemoteStore>>;
}

/// Connector that goes through the provider's OAuth session.
pub struct SessionConnector<'a> {
    config: &'a Config,
    transport: HttpTransport,
}

impl<'a> SessionConnector<'a> {
    pub fn new(config: &'a Config, transport: HttpTransport) -> Self {
        Self { config, transport }
    }
}

#[async_trait]
impl Connector for SessionConnector<'_> {
    fn check(&self, provider: Provider) -> Result<(), ConfigError> {
        open_session(self.config, provider, self.transport.clone()).map(drop)
    }

    async fn connect(&self, provider: Provider) -> Result<Box<dyn RemoteStore>> {
        let mut session = open_session(self.config, provider, self.transport.clone())?;
        let token = session
            .acquire()
            .await
            .with_context(|| format!("{} authentication failed", provider.label()))?;
        Ok(api::connect(provider, self.transport.client().clone(), token))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Upload the existing PDF instead of converting again
    pub skip_convert: bool,
    /// Leave generated files on disk
    pub keep_local: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Uploaded { name: String, folders: Vec<String> },
    Failed(String),
    /// Not attempted because an earlier provider aborted the run
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReport {
    pub provider: Provider,
    pub outcome: Outcome,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub providers: Vec<ProviderReport>,
    /// Local files removed at the end, with whether they existed
    pub cleaned: Vec<(PathBuf, bool)>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.providers
            .iter()
            .any(|r| !matches!(r.outcome, Outcome::Uploaded { .. }))
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in &self.providers {
            let label = format!("{}:", report.provider.label());
            match &report.outcome {
                Outcome::Uploaded { name, folders } => {
                    let folders: Vec<&str> = folders
                        .iter()
                        .map(|f| if f.is_empty() { "(root)" } else { f.as_str() })
                        .collect();
                    writeln!(f, "{:<14}uploaded {} to {}", label, name, folders.join(", "))?;
                }
                Outcome::Failed(reason) => writeln!(f, "{:<14}FAILED: {}", label, reason)?,
                Outcome::Skipped => writeln!(f, "{:<14}skipped", label)?,
            }
        }
        for (path, existed) in &self.cleaned {
            let what = if *existed { "deleted" } else { "not present" };
            writeln!(f, "Local file {}: {}", path.display(), what)?;
        }
        Ok(())
    }
}

/// Local artifacts produced for this run.
struct Artifacts {
    pdf: PathBuf,
    last_page: Option<PathBuf>,
}

impl Artifacts {
    fn for_upload(&self, source: UploadSource) -> Result<&Path> {
        match source {
            UploadSource::Pdf => Ok(&self.pdf),
            UploadSource::LastPage => self
                .last_page
                .as_deref()
                .context("document.last_page is not configured"),
        }
    }

    fn paths(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.pdf.as_path()).chain(self.last_page.as_deref())
    }
}

/// One backup run over every enabled provider.
pub struct Backup<'a> {
    config: &'a Config,
    converter: &'a dyn DocumentConverter,
    extractor: &'a dyn PageExtractor,
    connector: &'a dyn Connector,
}

impl<'a> Backup<'a> {
    pub fn new(
        config: &'a Config,
        converter: &'a dyn DocumentConverter,
        extractor: &'a dyn PageExtractor,
        connector: &'a dyn Connector,
    ) -> Self {
        Self {
            config,
            converter,
            extractor,
            connector,
        }
    }

    pub async fn run(&self, options: RunOptions) -> Result<RunReport> {
        // Configuration errors are fatal regardless of the failure policy
        for provider in self.config.enabled_providers() {
            self.connector
                .check(provider)
                .with_context(|| format!("{} is not configured", provider.label()))?;
        }

        let artifacts = self.prepare(options).await?;
        let mut report = RunReport::default();

        let mut aborted = false;
        for provider in self.config.enabled_providers() {
            if aborted {
                report.providers.push(ProviderReport {
                    provider,
                    outcome: Outcome::Skipped,
                });
                continue;
            }

            let outcome = match self.upload(provider, &artifacts).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!("{} upload failed: {:#}", provider.label(), e);
                    eprintln!("Error: {} upload failed: {:#}", provider.label(), e);
                    if self.config.failure_policy == FailurePolicy::Abort {
                        aborted = true;
                    }
                    Outcome::Failed(format!("{:#}", e))
                }
            };
            report.providers.push(ProviderReport { provider, outcome });
        }

        if !options.keep_local {
            for path in artifacts.paths() {
                match convert::cleanup(path) {
                    Ok(existed) => report.cleaned.push((path.to_path_buf(), existed)),
                    Err(e) => tracing::warn!("Could not delete {}: {}", path.display(), e),
                }
            }
        }

        Ok(report)
    }

    /// Convert the document and cut the last page when some provider wants it.
    async fn prepare(&self, options: RunOptions) -> Result<Artifacts> {
        let document = &self.config.document;
        let last_page = self.config.last_page_path()?;

        if options.skip_convert {
            if !document.pdf.exists() {
                bail!(
                    "{} does not exist; run without --skip-convert",
                    document.pdf.display()
                );
            }
        } else {
            tracing::info!(
                "Converting {} to {}",
                document.source.display(),
                document.pdf.display()
            );
            self.converter
                .convert(&document.source, &document.pdf)
                .await
                .context("document conversion failed")?;
            println!("Converted {}", document.source.display());
        }

        if let Some(path) = &last_page {
            tracing::info!("Extracting last page to {}", path.display());
            self.extractor
                .extract_last_page(&document.pdf, path)
                .await
                .context("last page extraction failed")?;
        }

        Ok(Artifacts {
            pdf: document.pdf.clone(),
            last_page,
        })
    }

    async fn upload(&self, provider: Provider, artifacts: &Artifacts) -> Result<Outcome> {
        let target = self.config.target(provider);
        let local = artifacts.for_upload(target.upload)?;
        let name = match &target.remote_name {
            Some(name) => name.clone(),
            None => local
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .with_context(|| format!("{} has no file name", local.display()))?,
        };

        let content = tokio::fs::read(local)
            .await
            .with_context(|| format!("failed to read {}", local.display()))?;

        let store = self.connector.connect(provider).await?;
        let sync = RemoteFileSync::new(store.as_ref());
        for folder in &target.folders {
            sync.replace(folder, &name, content.clone())
                .await
                .with_context(|| format!("uploading {} to '{}'", name, folder))?;
        }

        Ok(Outcome::Uploaded {
            name,
            folders: target.folders.clone(),
        })
    }
}

/// Entry point for the `run` command.
pub async fn run(config: &Config, options: RunOptions) -> Result<()> {
    let transport = HttpTransport::new(config.http_timeout())?;
    let converter = convert::CommandConverter::new(config.convert.converter.clone());
    let extractor = convert::CommandExtractor::new(config.convert.extractor.clone());
    let connector = SessionConnector::new(config, transport);

    let report = Backup::new(config, &converter, &extractor, &connector)
        .run(options)
        .await?;

    println!();
    print!("{}", report);
    if report.has_failures() {
        bail!("backup finished with failures");
    }
    Ok(())
}
