//! Replace-by-name file sync on top of a [`RemoteStore`]

use super::{DriveError, FolderRef, RemoteFile, RemoteStore};

/// Name-addressed operations on one remote store.
pub struct RemoteFileSync<'a> {
    store: &'a dyn RemoteStore,
}

impl<'a> RemoteFileSync<'a> {
    pub fn new(store: &'a dyn RemoteStore) -> Self {
        Self { store }
    }

    /// Upload `content` as `folder/name`, removing any earlier copies first.
    ///
    /// Afterwards the folder holds exactly one file with that name.
    pub async fn replace(
        &self,
        folder: &str,
        name: &str,
        content: Vec<u8>,
    ) -> Result<RemoteFile, DriveError> {
        let target = self.store.ensure_folder(folder).await?;
        self.remove_existing(&target, name).await?;

        let file = self.store.upload(&target, name, content).await?;
        tracing::info!(
            "{}: uploaded '{}' to {}",
            self.store.name(),
            name,
            target.display_name()
        );
        Ok(file)
    }

    /// Download `folder/name`.
    pub async fn fetch(&self, folder: &str, name: &str) -> Result<(RemoteFile, Vec<u8>), DriveError> {
        let target = self.store.ensure_folder(folder).await?;
        let file = self
            .store
            .find_files(&target, name)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                DriveError::NotFound(format!("'{}' in {}", name, target.display_name()))
            })?;

        let content = self.store.download(&file).await?;
        tracing::info!(
            "{}: downloaded '{}' ({} bytes)",
            self.store.name(),
            name,
            content.len()
        );
        Ok((file, content))
    }

    /// Delete every file called `name` in `folder`. Returns how many went.
    pub async fn remove(&self, folder: &str, name: &str) -> Result<usize, DriveError> {
        let target = self.store.ensure_folder(folder).await?;
        self.remove_existing(&target, name).await
    }

    async fn remove_existing(&self, folder: &FolderRef, name: &str) -> Result<usize, DriveError> {
        let existing = self.store.find_files(folder, name).await?;
        for file in &existing {
            tracing::debug!("{}: deleting old copy {}", self.store.name(), file.id);
            self.store.delete_file(file).await?;
        }
        Ok(existing.len())
    }
}
