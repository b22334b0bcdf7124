// File-backed credential store.
//
// The credential is one JSON document on disk. Writes go to a temp file
// next to it and are renamed into place, so a crash mid-write leaves the
// previous credential intact. The file holds a refresh token and a client
// secret, so on Unix it is created owner-read/write only.

use crate::core::auth::{AuthError, Credential, CredentialStore};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

pub struct FileCredentialStore {
    path: PathBuf,
    cache: RwLock<Option<Credential>>,
}

impl FileCredentialStore {
    /// Opens the store at `path`, reading any credential already there.
    ///
    /// A file that exists but cannot be parsed is treated as empty and
    /// logged; the next save overwrites it.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let path = path.into();
        let cache = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Credential>(&bytes) {
                Ok(credential) => Some(credential),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Ignoring unreadable credential file: {}", e);
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(storage_error(&path, e)),
        };

        Ok(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, credential: &Credential) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error(parent, e))?;
        }

        let body = serde_json::to_vec_pretty(credential)
            .map_err(|e| AuthError::Storage(format!("failed to serialize credential: {}", e)))?;

        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, body)
            .await
            .map_err(|e| storage_error(&temp_path, e))?;
        restrict_permissions(&temp_path).await;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| storage_error(&self.path, e))?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Credential>, AuthError> {
        Ok(self.cache.read().await.clone())
    }

    async fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        let mut cache = self.cache.write().await;
        self.persist(credential).await?;
        *cache = Some(credential.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), AuthError> {
        let mut cache = self.cache.write().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(storage_error(&self.path, e)),
        }
        *cache = None;
        Ok(())
    }
}

fn storage_error(path: &Path, err: std::io::Error) -> AuthError {
    AuthError::Storage(format!("{}: {}", path.display(), err))
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o600);
    if let Err(e) = tokio::fs::set_permissions(path, perms).await {
        tracing::warn!(path = %path.display(), "Could not restrict credential file permissions: {}", e);
    }
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{expired_credential, fresh_credential};

    #[tokio::test]
    async fn test_saved_credential_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credential.json");

        let store = FileCredentialStore::open(&path).await.unwrap();
        assert!(store.load().await.unwrap().is_none());

        let credential = fresh_credential("tok-1");
        store.save(&credential).await.unwrap();

        let reopened = FileCredentialStore::open(&path).await.unwrap();
        assert_eq!(reopened.load().await.unwrap(), Some(credential));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_save_replaces_previous_credential() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credential.json");
        let store = FileCredentialStore::open(&path).await.unwrap();

        store.save(&expired_credential("old", Some("r"))).await.unwrap();
        store.save(&fresh_credential("new")).await.unwrap();

        let reopened = FileCredentialStore::open(&path).await.unwrap();
        let loaded = reopened.load().await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "new");
    }

    #[tokio::test]
    async fn test_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credential.json");
        let store = FileCredentialStore::open(&path).await.unwrap();

        store.save(&fresh_credential("tok")).await.unwrap();
        assert!(path.exists());

        store.clear().await.unwrap();
        assert!(!path.exists());
        assert!(store.load().await.unwrap().is_none());
        // Clearing an empty slot is fine.
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credential.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = FileCredentialStore::open(&path).await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credential.json");
        let store = FileCredentialStore::open(&path).await.unwrap();
        store.save(&fresh_credential("tok")).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
