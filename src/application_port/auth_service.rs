use crate::application_port::GatewayError;
use crate::domain_model::*;
use crate::domain_port::*;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
    #[error("login response carried no access token")]
    MissingAccessToken,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] CredentialStoreError),
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterInput {
    pub full_name: String,
    pub phone_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub credential: SessionCredential,
    pub role: Option<String>,
    pub user: SessionUser,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    async fn request_otp(&self, phone_number: &str) -> Result<serde_json::Value, AuthError>;
    async fn verify_otp(&self, phone_number: &str, otp_code: &str) -> Result<LoginResult, AuthError>;
    async fn password_login(&self, identifier: &str, password: &str) -> Result<LoginResult, AuthError>;
    async fn register(&self, input: RegisterInput) -> Result<serde_json::Value, AuthError>;
    async fn fetch_profile(&self) -> Result<UserProfile, AuthError>;
    async fn logout(&self) -> Result<(), AuthError>;
}
