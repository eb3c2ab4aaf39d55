use crate::domain_port::*;
use dashmap::DashMap;

/// Process-wide store that forgets everything on exit.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: DashMap<String, String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CredentialStoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CredentialStoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CredentialStoreError> {
        self.entries.remove(key);
        Ok(())
    }
}
