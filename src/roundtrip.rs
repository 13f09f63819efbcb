//! The `edit` command: download, edit locally, upload back

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::api::RemoteFileSync;
use crate::auth::{HttpTransport, Provider};
use crate::backup::{Connector, SessionConnector};
use crate::config::Config;
use crate::convert;

/// Yes/no question to the user.
pub trait Confirm {
    fn confirm(&mut self, question: &str) -> io::Result<bool>;
}

pub struct ConsoleConfirm;

impl Confirm for ConsoleConfirm {
    fn confirm(&mut self, question: &str) -> io::Result<bool> {
        print!("{} [y/N] ", question);
        io::stdout().flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}

#[derive(Debug, Clone)]
pub struct EditRequest {
    pub remote_name: String,
    /// Remote folder; empty is the drive root
    pub folder: String,
    pub local: PathBuf,
    /// Delete the remote file when the user declines to upload
    pub delete_remote: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Uploaded,
    RemoteDeleted,
    Unchanged,
}

/// Round trip one remote file through a local copy.
pub async fn edit_file(
    connector: &dyn Connector,
    confirm: &mut dyn Confirm,
    request: &EditRequest,
) -> Result<EditOutcome> {
    let store = connector.connect(Provider::OneDrive).await?;
    let sync = RemoteFileSync::new(store.as_ref());

    let (_, content) = sync
        .fetch(&request.folder, &request.remote_name)
        .await
        .with_context(|| format!("downloading {}", request.remote_name))?;
    write_local(&request.local, &content)?;
    println!(
        "Downloaded {} to {}. Edit it now.",
        request.remote_name,
        request.local.display()
    );

    let upload = confirm
        .confirm("Upload the edited file back?")
        .context("failed to read answer")?;

    let outcome = if upload {
        let edited = tokio::fs::read(&request.local)
            .await
            .with_context(|| format!("failed to read {}", request.local.display()))?;
        sync.replace(&request.folder, &request.remote_name, edited)
            .await
            .with_context(|| format!("uploading {}", request.remote_name))?;
        println!("Uploaded {}.", request.remote_name);
        EditOutcome::Uploaded
    } else if request.delete_remote {
        sync.remove(&request.folder, &request.remote_name)
            .await
            .with_context(|| format!("deleting remote {}", request.remote_name))?;
        println!("Deleted remote {}.", request.remote_name);
        EditOutcome::RemoteDeleted
    } else {
        println!("Remote {} left unchanged.", request.remote_name);
        EditOutcome::Unchanged
    };

    match convert::cleanup(&request.local) {
        Ok(true) => println!("Deleted local copy {}.", request.local.display()),
        Ok(false) => {}
        Err(e) => tracing::warn!("Could not delete {}: {}", request.local.display(), e),
    }

    Ok(outcome)
}

fn write_local(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

/// Entry point for the `edit` command.
pub async fn edit(config: &Config, request: EditRequest) -> Result<()> {
    let transport = HttpTransport::new(config.http_timeout())?;
    let connector = SessionConnector::new(config, transport);
    edit_file(&connector, &mut ConsoleConfirm, &request).await?;
    Ok(())
}
