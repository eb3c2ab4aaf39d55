use crate::domain_port::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Durable store kept as one JSON object on disk. Every write replaces the
/// whole file through a temp file and a rename.
pub struct FileCredentialStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileCredentialStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CredentialStoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| CredentialStoreError::Corrupt(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), keys = entries.len(), "credential file opened");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), CredentialStoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| CredentialStoreError::Store(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CredentialStoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CredentialStoreError> {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CredentialStoreError> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_model::*;

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session").join("credentials.json");

        let store = FileCredentialStore::open(&path).await.unwrap();
        store.set(ACCESS_TOKEN_KEY, "access-1").await.unwrap();
        store.set(REFRESH_TOKEN_KEY, "refresh-1").await.unwrap();
        store.remove(REFRESH_TOKEN_KEY).await.unwrap();
        drop(store);

        let reopened = FileCredentialStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.access_token().await.unwrap(),
            Some(AccessToken("access-1".to_string()))
        );
        assert_eq!(reopened.refresh_token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_matching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = FileCredentialStore::open(&path).await.unwrap();
        store.set(ACCESS_TOKEN_KEY, "access-1").await.unwrap();

        // A directory at the temp path makes the next write fail.
        tokio::fs::create_dir(path.with_extension("tmp")).await.unwrap();

        assert!(store.set(ACCESS_TOKEN_KEY, "access-2").await.is_err());
        assert!(store.remove(ACCESS_TOKEN_KEY).await.is_err());
        assert_eq!(
            store.access_token().await.unwrap(),
            Some(AccessToken("access-1".to_string()))
        );

        let reopened = FileCredentialStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.access_token().await.unwrap(),
            Some(AccessToken("access-1".to_string()))
        );
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let result = FileCredentialStore::open(&path).await;
        assert!(matches!(result, Err(CredentialStoreError::Corrupt(_))));
    }
}
