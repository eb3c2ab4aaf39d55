use crate::domain_model::*;

#[derive(Debug, thiserror::Error)]
pub enum CredentialStoreError {
    #[error("store error: {0}")]
    Store(String),
    #[error("corrupt store data: {0}")]
    Corrupt(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable key-value storage for the session credential, shared by every
/// request of the process.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CredentialStoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), CredentialStoreError>;
    async fn remove(&self, key: &str) -> Result<(), CredentialStoreError>;

    async fn access_token(&self) -> Result<Option<AccessToken>, CredentialStoreError> {
        Ok(self.get(ACCESS_TOKEN_KEY).await?.map(AccessToken))
    }

    async fn refresh_token(&self) -> Result<Option<RefreshToken>, CredentialStoreError> {
        Ok(self.get(REFRESH_TOKEN_KEY).await?.map(RefreshToken))
    }

    async fn save_credential(&self, credential: &SessionCredential) -> Result<(), CredentialStoreError> {
        self.set(ACCESS_TOKEN_KEY, &credential.access.0).await?;
        if let Some(refresh) = &credential.refresh {
            self.set(REFRESH_TOKEN_KEY, &refresh.0).await?;
        }
        Ok(())
    }

    async fn clear_session(&self) -> Result<(), CredentialStoreError> {
        for key in SESSION_KEYS {
            self.remove(key).await?;
        }
        Ok(())
    }
}
