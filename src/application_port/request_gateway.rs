use crate::domain_model::*;
use crate::domain_port::*;
use reqwest::StatusCode;
use std::time::Duration;

/// Why a credential refresh did not produce a new access token. Cloned to
/// every request that was queued behind the refresh.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("no refresh token stored")]
    MissingRefreshToken,
    #[error("refresh rejected with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("refresh transport error: {0}")]
    Transport(String),
    #[error("refresh timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed refresh response: {0}")]
    MalformedResponse(String),
    #[error("credential store error: {0}")]
    Store(String),
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("request failed with status {status}")]
    Http { status: StatusCode, body: String },
    #[error("session refresh failed: {0}")]
    RefreshFailed(#[from] RefreshError),
    #[error("session refresh was abandoned before it settled")]
    RefreshInterrupted,
    #[error("credential store error: {0}")]
    Store(#[from] CredentialStoreError),
}

impl GatewayError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            GatewayError::Http { status, .. } => Some(*status),
            GatewayError::RefreshFailed(RefreshError::Rejected { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

/// The single way feature code talks to the backend.
#[async_trait::async_trait]
pub trait RequestGateway: Send + Sync {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, GatewayError>;

    fn session_state(&self) -> SessionState;

    /// Called by the login flow once fresh credentials are stored.
    fn session_started(&self);
}
