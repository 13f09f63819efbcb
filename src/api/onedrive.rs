//! OneDrive through Microsoft Graph

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Deserialize;

use super::client::{self, DriveError};
use super::{FolderRef, RemoteFile, RemoteStore};

const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
const ROOT_ID: &str = "root";

/// Characters escaped inside a `:/name:` path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'/')
    .add(b':')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

#[derive(Debug, Deserialize)]
struct DriveItem {
    id: String,
    name: String,
    folder: Option<serde_json::Value>,
}

impl From<DriveItem> for RemoteFile {
    fn from(item: DriveItem) -> Self {
        RemoteFile {
            id: item.id,
            name: item.name,
        }
    }
}

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// Graph client bound to one access token.
pub struct OneDriveClient {
    http: reqwest::Client,
    token: String,
    base: String,
}

impl OneDriveClient {
    pub fn new(http: reqwest::Client, token: String) -> Self {
        Self::with_base(http, token, GRAPH_BASE)
    }

    pub fn with_base(http: reqwest::Client, token: String, base: &str) -> Self {
        Self {
            http,
            token,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Item at `name` inside the folder with id `parent`, if it exists.
    async fn child(&self, parent: &str, name: &str) -> Result<Option<DriveItem>, DriveError> {
        let url = format!("{}/me/drive/items/{}:/{}", self.base, parent, encode(name));
        tracing::debug!("Graph GET {}", url);

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(DriveError::request(format!("Graph GET {}", url)))?;

        match client::json(resp, &url).await {
            Ok(item) => Ok(Some(item)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_folder(&self, name: &str) -> Result<DriveItem, DriveError> {
        let url = format!("{}/me/drive/root/children", self.base);
        tracing::debug!("Graph POST {}", url);

        let body = serde_json::json!({
            "name": name,
            "folder": {},
            "@microsoft.graph.conflictBehavior": "fail"
        });
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(DriveError::request(format!("Graph POST {}", url)))?;

        client::json(resp, &url).await
    }
}

#[async_trait]
impl RemoteStore for OneDriveClient {
    fn name(&self) -> &str {
        "OneDrive"
    }

    async fn ensure_folder(&self, folder: &str) -> Result<FolderRef, DriveError> {
        if folder.is_empty() {
            return Ok(FolderRef {
                id: ROOT_ID.to_string(),
                name: String::new(),
            });
        }

        let item = match self.child(ROOT_ID, folder).await? {
            Some(item) if item.folder.is_some() => item,
            Some(_) => {
                return Err(DriveError::NotFound(format!(
                    "folder '{}' (a file has that name)",
                    folder
                )))
            }
            None => {
                tracing::info!("Creating OneDrive folder '{}'", folder);
                self.create_folder(folder).await?
            }
        };

        Ok(FolderRef {
            id: item.id,
            name: item.name,
        })
    }

    async fn find_files(
        &self,
        folder: &FolderRef,
        name: &str,
    ) -> Result<Vec<RemoteFile>, DriveError> {
        // OneDrive names are unique within a folder
        Ok(self
            .child(&folder.id, name)
            .await?
            .filter(|item| item.folder.is_none())
            .map(RemoteFile::from)
            .into_iter()
            .collect())
    }

    async fn delete_file(&self, file: &RemoteFile) -> Result<(), DriveError> {
        let url = format!("{}/me/drive/items/{}", self.base, file.id);
        tracing::debug!("Graph DELETE {}", url);

        let resp = self
            .http
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(DriveError::request(format!("Graph DELETE {}", url)))?;

        client::check_response(resp, &url).await?;
        Ok(())
    }

    async fn upload(
        &self,
        folder: &FolderRef,
        name: &str,
        content: Vec<u8>,
    ) -> Result<RemoteFile, DriveError> {
        let url = format!(
            "{}/me/drive/items/{}:/{}:/content",
            self.base,
            folder.id,
            encode(name)
        );
        tracing::debug!("Graph PUT {} ({} bytes)", url, content.len());

        let resp = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(content)
            .send()
            .await
            .map_err(DriveError::request(format!("Graph PUT {}", url)))?;

        let item: DriveItem = client::json(resp, &url).await?;
        Ok(item.into())
    }

    async fn download(&self, file: &RemoteFile) -> Result<Vec<u8>, DriveError> {
        let url = format!("{}/me/drive/items/{}/content", self.base, file.id);
        tracing::debug!("Graph GET {}", url);

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(DriveError::request(format!("Graph GET {}", url)))?;

        client::bytes(resp, &url).await
    }
}
