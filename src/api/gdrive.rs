//! Google Drive v3 client

use async_trait::async_trait;
use reqwest::header;
use serde::Deserialize;

use super::client::{self, DriveError};
use super::{FolderRef, RemoteFile, RemoteStore};

/// Google Drive API base URL.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Google Drive upload API base URL.
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const ROOT_ID: &str = "root";

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    name: String,
}

impl From<DriveFile> for RemoteFile {
    fn from(file: DriveFile) -> Self {
        RemoteFile {
            id: file.id,
            name: file.name,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Quote a value for a Drive search query.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Google Drive API client bound to one access token.
pub struct GoogleDriveClient {
    http: reqwest::Client,
    token: String,
    api_base: String,
    upload_base: String,
}

impl GoogleDriveClient {
    pub fn new(http: reqwest::Client, token: String) -> Self {
        Self::with_bases(http, token, DRIVE_API_BASE, DRIVE_UPLOAD_BASE)
    }

    pub fn with_bases(http: reqwest::Client, token: String, api: &str, upload: &str) -> Self {
        Self {
            http,
            token,
            api_base: api.trim_end_matches('/').to_string(),
            upload_base: upload.trim_end_matches('/').to_string(),
        }
    }

    /// Run a search query, following every result page.
    async fn search(&self, query: &str) -> Result<Vec<DriveFile>, DriveError> {
        let url = format!("{}/files", self.api_base);
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            tracing::debug!("Drive search: {}", query);
            let mut request = self.http.get(&url).bearer_auth(&self.token).query(&[
                ("q", query),
                ("spaces", "drive"),
                ("fields", "nextPageToken,files(id,name)"),
                ("pageSize", "100"),
            ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let resp = request
                .send()
                .await
                .map_err(DriveError::request(format!("Drive GET {}", url)))?;
            let page: FileListResponse = client::json(resp, &url).await?;
            all_files.extend(page.files);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(all_files)
    }

    async fn create_folder(&self, name: &str) -> Result<DriveFile, DriveError> {
        let url = format!("{}/files", self.api_base);
        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .query(&[("fields", "id,name")])
            .json(&metadata)
            .send()
            .await
            .map_err(DriveError::request(format!("Drive POST {}", url)))?;

        client::json(resp, &url).await
    }
}

#[async_trait]
impl RemoteStore for GoogleDriveClient {
    fn name(&self) -> &str {
        "Google Drive"
    }

    async fn ensure_folder(&self, folder: &str) -> Result<FolderRef, DriveError> {
        if folder.is_empty() {
            return Ok(FolderRef {
                id: ROOT_ID.to_string(),
                name: String::new(),
            });
        }

        let query = format!(
            "name = {} and mimeType = '{}' and trashed = false",
            quote(folder),
            FOLDER_MIME
        );
        let found = self.search(&query).await?.into_iter().next();

        let file = match found {
            Some(file) => file,
            None => {
                tracing::info!("Creating Google Drive folder '{}'", folder);
                self.create_folder(folder).await?
            }
        };

        Ok(FolderRef {
            id: file.id,
            name: file.name,
        })
    }

    async fn find_files(
        &self,
        folder: &FolderRef,
        name: &str,
    ) -> Result<Vec<RemoteFile>, DriveError> {
        // Drive allows duplicate names, so this can return several
        let query = format!(
            "name = {} and {} in parents and mimeType != '{}' and trashed = false",
            quote(name),
            quote(&folder.id),
            FOLDER_MIME
        );
        Ok(self
            .search(&query)
            .await?
            .into_iter()
            .map(RemoteFile::from)
            .collect())
    }

    async fn delete_file(&self, file: &RemoteFile) -> Result<(), DriveError> {
        let url = format!("{}/files/{}", self.api_base, file.id);
        tracing::debug!("Drive DELETE {}", url);

        let resp = self
            .http
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(DriveError::request(format!("Drive DELETE {}", url)))?;

        client::check_response(resp, &url).await?;
        Ok(())
    }

    async fn upload(
        &self,
        folder: &FolderRef,
        name: &str,
        content: Vec<u8>,
    ) -> Result<RemoteFile, DriveError> {
        let url = format!("{}/files", self.upload_base);
        tracing::debug!("Drive upload {} ({} bytes)", name, content.len());

        let metadata = serde_json::json!({
            "name": name,
            "parents": [folder.id]
        });

        // multipart/related: JSON metadata part, then the raw content part
        let boundary = format!("drive-backup-{}", uuid::Uuid::new_v4().simple());
        let mut body = Vec::with_capacity(content.len() + 512);
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.extend_from_slice(metadata.to_string().as_bytes());
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(&content);
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(format!("--{}--", boundary).as_bytes());

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .query(&[("uploadType", "multipart"), ("fields", "id,name")])
            .body(body)
            .send()
            .await
            .map_err(DriveError::request(format!("Drive POST {}", url)))?;

        let file: DriveFile = client::json(resp, &url).await?;
        Ok(file.into())
    }

    async fn download(&self, file: &RemoteFile) -> Result<Vec<u8>, DriveError> {
        let url = format!("{}/files/{}", self.api_base, file.id);
        tracing::debug!("Drive GET {}", url);

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(DriveError::request(format!("Drive GET {}", url)))?;

        client::bytes(resp, &url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn drive(server: &MockServer) -> GoogleDriveClient {
        let base = server.uri();
        GoogleDriveClient::with_bases(
            reqwest::Client::new(),
            "tok".to_string(),
            &base,
            &format!("{}/upload", base),
        )
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("PRogram1"), "'PRogram1'");
        assert_eq!(quote("Bob's"), "'Bob\\'s'");
    }

    #[tokio::test]
    async fn test_existing_folder_found_by_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .and(query_param(
                "q",
                "name = 'PRogram1' and mimeType = 'application/vnd.google-apps.folder' and trashed = false",
            ))
            .and(header("authorization", "Bearer tok"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"files": [{"id": "G1", "name": "PRogram1"}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let folder = drive(&server).ensure_folder("PRogram1").await.unwrap();
        assert_eq!(folder.id, "G1");
    }

    #[tokio::test]
    async fn test_missing_folder_is_created() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": []})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/files"))
            .and(body_partial_json(
                json!({"name": "10xEngineers", "mimeType": FOLDER_MIME}),
            ))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "G2", "name": "10xEngineers"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let folder = drive(&server).ensure_folder("10xEngineers").await.unwrap();
        assert_eq!(folder.id, "G2");
    }

    #[tokio::test]
    async fn test_find_files_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .and(query_param("pageToken", "p2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"files": [{"id": "B", "name": "doc.pdf"}]})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"files": [{"id": "A", "name": "doc.pdf"}], "nextPageToken": "p2"}),
            ))
            .mount(&server)
            .await;

        let folder = FolderRef {
            id: "G1".to_string(),
            name: "PRogram1".to_string(),
        };
        let files = drive(&server).find_files(&folder, "doc.pdf").await.unwrap();
        let ids: Vec<&str> = files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_upload_sends_multipart_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/files"))
            .and(query_param("uploadType", "multipart"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "U1", "name": "doc.pdf"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let folder = FolderRef {
            id: "G1".to_string(),
            name: "PRogram1".to_string(),
        };
        let file = drive(&server)
            .upload(&folder, "doc.pdf", b"%PDF-1.7 body".to_vec())
            .await
            .unwrap();
        assert_eq!(file.id, "U1");

        let requests: Vec<Request> = server.received_requests().await.unwrap();
        let content_type = requests[0].headers.get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.starts_with("multipart/related; boundary="));
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains(r#""parents":["G1"]"#));
        assert!(body.contains("%PDF-1.7 body"));
    }

    #[tokio::test]
    async fn test_delete_failure_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/files/X"))
            .respond_with(ResponseTemplate::new(403).set_body_string("insufficient permissions"))
            .mount(&server)
            .await;

        let file = RemoteFile {
            id: "X".to_string(),
            name: "doc.pdf".to_string(),
        };
        match drive(&server).delete_file(&file).await.unwrap_err() {
            DriveError::Status { status, body, .. } => {
                assert_eq!(status, 403);
                assert_eq!(body, "insufficient permissions");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
