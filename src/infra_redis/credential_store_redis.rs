use crate::domain_port::*;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Credential store shared across processes of one device or kiosk, keyed
/// under a per-installation prefix.
pub struct RedisCredentialStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisCredentialStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        RedisCredentialStore {
            conn,
            prefix: prefix.into(),
        }
    }

    fn key(&self, key: &str) -> String {
        prefixed_key(&self.prefix, key)
    }
}

fn prefixed_key(prefix: &str, key: &str) -> String {
    format!("{}:{}", prefix, key)
}

#[async_trait::async_trait]
impl CredentialStore for RedisCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CredentialStoreError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        let value: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| CredentialStoreError::Store(e.to_string()))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CredentialStoreError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(&key, value)
            .await
            .map_err(|e| CredentialStoreError::Store(e.to_string()))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CredentialStoreError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(&key)
            .await
            .map_err(|e| CredentialStoreError::Store(e.to_string()))?;
        Ok(())
    }
}
