//! Remote storage clients for OneDrive and Google Drive

pub mod client;
pub mod gdrive;
#[cfg(test)]
pub mod memory;
pub mod onedrive;
pub mod sync;

use async_trait::async_trait;

pub use client::DriveError;
pub use gdrive::GoogleDriveClient;
pub use onedrive::OneDriveClient;
pub use sync::RemoteFileSync;

use crate::auth::Provider;

/// A folder resolved on the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderRef {
    pub id: String,
    /// Display name; empty for the drive root
    pub name: String,
}

impl FolderRef {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "(root)"
        } else {
            &self.name
        }
    }
}

/// A file stored remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
}

/// Minimal remote storage surface the backup needs.
///
/// Folders and files are addressed by name; ids are whatever the provider
/// hands back.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    fn name(&self) -> &str;

    /// Find a folder by name, creating it if absent. An empty name is the root.
    async fn ensure_folder(&self, folder: &str) -> Result<FolderRef, DriveError>;

    /// Every file called `name` directly inside `folder`.
    async fn find_files(&self, folder: &FolderRef, name: &str)
        -> Result<Vec<RemoteFile>, DriveError>;

    async fn delete_file(&self, file: &RemoteFile) -> Result<(), DriveError>;

    async fn upload(
        &self,
        folder: &FolderRef,
        name: &str,
        content: Vec<u8>,
    ) -> Result<RemoteFile, DriveError>;

    async fn download(&self, file: &RemoteFile) -> Result<Vec<u8>, DriveError>;
}

/// Build the storage client for `provider` around a bearer token.
pub fn connect(provider: Provider, http: reqwest::Client, token: String) -> Box<dyn RemoteStore> {
    match provider {
        Provider::OneDrive => Box::new(OneDriveClient::new(http, token)),
        Provider::GoogleDrive => Box::new(GoogleDriveClient::new(http, token)),
    }
}
