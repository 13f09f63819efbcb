//! In-memory [`RemoteStore`] used by tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{DriveError, FolderRef, RemoteFile, RemoteStore};

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub id: String,
    pub folder: String,
    pub name: String,
    pub content: Vec<u8>,
}

#[derive(Default)]
struct State {
    next_id: u32,
    folders: Vec<FolderRef>,
    files: Vec<StoredFile>,
    fail_uploads: bool,
    fail_deletes: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_uploads() -> Self {
        let store = Self::default();
        store.state.lock().unwrap().fail_uploads = true;
        store
    }

    pub fn failing_deletes() -> Self {
        let store = Self::default();
        store.state.lock().unwrap().fail_deletes = true;
        store
    }

    /// Place a file directly, creating the folder if needed.
    pub fn seed(&self, folder: &str, name: &str, content: &[u8]) -> String {
        let mut state = self.state.lock().unwrap();
        let folder_id = folder_id(&mut state, folder);
        let id = next_id(&mut state);
        state.files.push(StoredFile {
            id: id.clone(),
            folder: folder_id,
            name: name.to_string(),
            content: content.to_vec(),
        });
        id
    }

    /// Files currently stored in the folder called `folder`.
    pub fn files_in(&self, folder: &str) -> Vec<StoredFile> {
        let state = self.state.lock().unwrap();
        let id = if folder.is_empty() {
            "root".to_string()
        } else {
            match state.folders.iter().find(|f| f.name == folder) {
                Some(f) => f.id.clone(),
                None => return Vec::new(),
            }
        };
        state
            .files
            .iter()
            .filter(|f| f.folder == id)
            .cloned()
            .collect()
    }

    pub fn folder_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.folders.iter().map(|f| f.name.clone()).collect()
    }
}

fn next_id(state: &mut State) -> String {
    state.next_id += 1;
    format!("id{}", state.next_id)
}

fn folder_id(state: &mut State, name: &str) -> String {
    if name.is_empty() {
        return "root".to_string();
    }
    if let Some(folder) = state.folders.iter().find(|f| f.name == name) {
        return folder.id.clone();
    }
    let id = next_id(state);
    state.folders.push(FolderRef {
        id: id.clone(),
        name: name.to_string(),
    });
    id
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn name(&self) -> &str {
        "Memory"
    }

    async fn ensure_folder(&self, folder: &str) -> Result<FolderRef, DriveError> {
        let mut state = self.state.lock().unwrap();
        let id = folder_id(&mut state, folder);
        Ok(FolderRef {
            id,
            name: folder.to_string(),
        })
    }

    async fn find_files(
        &self,
        folder: &FolderRef,
        name: &str,
    ) -> Result<Vec<RemoteFile>, DriveError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .iter()
            .filter(|f| f.folder == folder.id && f.name == name)
            .map(|f| RemoteFile {
                id: f.id.clone(),
                name: f.name.clone(),
            })
            .collect())
    }

    async fn delete_file(&self, file: &RemoteFile) -> Result<(), DriveError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_deletes {
            return Err(DriveError::Status {
                status: 500,
                url: format!("memory://{}", file.id),
                body: "delete refused".to_string(),
            });
        }
        let before = state.files.len();
        state.files.retain(|f| f.id != file.id);
        if state.files.len() == before {
            return Err(DriveError::NotFound(file.name.clone()));
        }
        Ok(())
    }

    async fn upload(
        &self,
        folder: &FolderRef,
        name: &str,
        content: Vec<u8>,
    ) -> Result<RemoteFile, DriveError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_uploads {
            return Err(DriveError::Status {
                status: 507,
                url: format!("memory://{}/{}", folder.id, name),
                body: "insufficient storage".to_string(),
            });
        }
        let id = next_id(&mut state);
        state.files.push(StoredFile {
            id: id.clone(),
            folder: folder.id.clone(),
            name: name.to_string(),
            content,
        });
        Ok(RemoteFile {
            id,
            name: name.to_string(),
        })
    }

    async fn download(&self, file: &RemoteFile) -> Result<Vec<u8>, DriveError> {
        let state = self.state.lock().unwrap();
        state
            .files
            .iter()
            .find(|f| f.id == file.id)
            .map(|f| f.content.clone())
            .ok_or_else(|| DriveError::NotFound(file.name.clone()))
    }
}

/// Boxed handle onto a store the test keeps inspecting.
pub struct SharedStore(pub Arc<MemoryStore>);

#[async_trait]
impl RemoteStore for SharedStore {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn ensure_folder(&self, folder: &str) -> Result<FolderRef, DriveError> {
        self.0.ensure_folder(folder).await
    }

    async fn find_files(
        &self,
        folder: &FolderRef,
        name: &str,
    ) -> Result<Vec<RemoteFile>, DriveError> {
        self.0.find_files(folder, name).await
    }

    async fn delete_file(&self, file: &RemoteFile) -> Result<(), DriveError> {
        self.0.delete_file(file).await
    }

    async fn upload(
        &self,
        folder: &FolderRef,
        name: &str,
        content: Vec<u8>,
    ) -> Result<RemoteFile, DriveError> {
        self.0.upload(folder, name, content).await
    }

    async fn download(&self, file: &RemoteFile) -> Result<Vec<u8>, DriveError> {
        self.0.download(file).await
    }
}
