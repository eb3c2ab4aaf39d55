use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_REFRESH_PATH: &str = "/token/refresh/";

type RefreshOutcome = Result<AccessToken, RefreshError>;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub refresh_path: String,
    pub refresh_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            refresh_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    ended: Option<EndedSession>,
    pending: Vec<oneshot::Sender<RefreshOutcome>>,
}

/// The failure that logged the session out and the refresh token it failed with.
struct EndedSession {
    error: RefreshError,
    refresh: Option<RefreshToken>,
}

impl EndedSession {
    /// A stored refresh token other than the one that failed means a login
    /// wrote fresh credentials.
    fn superseded_by(&self, stored: Option<&RefreshToken>) -> bool {
        stored.is_some() && stored != self.refresh.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Original,
    Replay,
}

#[derive(Deserialize)]
struct RefreshGrant {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

/// Attaches the stored bearer token to every request and, when the backend
/// rejects it, runs one refresh exchange shared by every request that fails
/// while that exchange is in flight. Each request is replayed at most once.
pub struct AuthenticatedRequestGateway {
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn HttpTransport>,
    listener: Arc<dyn SessionListener>,
    config: GatewayConfig,
    state: Mutex<RefreshState>,
}

impl AuthenticatedRequestGateway {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn HttpTransport>,
        listener: Arc<dyn SessionListener>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            store,
            transport,
            listener,
            config,
            state: Mutex::new(RefreshState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn send_attempt(
        &self,
        request_id: Uuid,
        request: &ApiRequest,
        token: Option<&AccessToken>,
        attempt: Attempt,
    ) -> Result<ApiResponse, GatewayError> {
        let mut outbound = request.clone();
        if let Some(token) = token {
            outbound.set_header("Authorization", token.bearer());
        }
        debug!(
            %request_id,
            method = %request.method,
            path = %request.path,
            ?attempt,
            authenticated = token.is_some(),
            "sending request"
        );
        Ok(self.transport.send(&outbound).await?)
    }

    /// A token newer than the one the request went out with means another
    /// refresh (or a login) already replaced it.
    async fn rotated_token(
        &self,
        sent_with: Option<&AccessToken>,
    ) -> Result<Option<AccessToken>, GatewayError> {
        let current = self.store.access_token().await?;
        Ok(current.filter(|current| sent_with != Some(current)))
    }

    async fn refreshed_token(&self, request_id: Uuid) -> Result<AccessToken, GatewayError> {
        let stored_refresh = self.store.refresh_token().await?;
        let waiter = {
            let mut state = self.state();
            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                state.pending.push(tx);
                Some(rx)
            } else {
                if let Some(ended) = &state.ended {
                    if !ended.superseded_by(stored_refresh.as_ref()) {
                        debug!(%request_id, "session already ended, not refreshing");
                        return Err(ended.error.clone().into());
                    }
                    debug!(%request_id, "new credentials stored since logout");
                    state.ended = None;
                }
                state.in_flight = true;
                None
            }
        };

        match waiter {
            Some(rx) => {
                debug!(%request_id, "refresh in flight, request queued");
                match rx.await {
                    Ok(outcome) => Ok(outcome?),
                    Err(_) => Err(GatewayError::RefreshInterrupted),
                }
            }
            None => {
                let guard = RefreshGuard {
                    state: &self.state,
                    armed: true,
                };
                let (outcome, presented) = self.run_refresh(request_id).await;
                guard.settle(&outcome, presented);
                Ok(outcome?)
            }
        }
    }

    /// Returns the outcome together with the refresh token that was presented.
    async fn run_refresh(&self, request_id: Uuid) -> (RefreshOutcome, Option<RefreshToken>) {
        info!(%request_id, "access token rejected, refreshing session");
        let (outcome, presented) = match self.store.refresh_token().await {
            Ok(Some(refresh)) => (self.exchange(&refresh).await, Some(refresh)),
            Ok(None) => (Err(RefreshError::MissingRefreshToken), None),
            Err(e) => (Err(RefreshError::Store(e.to_string())), None),
        };

        match &outcome {
            Ok(_) => info!(%request_id, "session refreshed"),
            Err(error) => self.end_session(error).await,
        }
        (outcome, presented)
    }

    async fn exchange(&self, refresh: &RefreshToken) -> RefreshOutcome {
        let request = ApiRequest::post(self.config.refresh_path.as_str())
            .with_json(json!({ "refresh": refresh.0 }));

        let response = tokio::time::timeout(self.config.refresh_timeout, self.transport.send(&request))
            .await
            .map_err(|_| RefreshError::Timeout(self.config.refresh_timeout))?
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        if !response.is_success() {
            return Err(RefreshError::Rejected {
                status: response.status,
                body: response.text(),
            });
        }

        let grant: RefreshGrant = response
            .json()
            .map_err(|e| RefreshError::MalformedResponse(e.to_string()))?;
        let access = AccessToken(grant.access);

        // The new token still reaches every waiter if it cannot be persisted.
        if let Err(e) = self.store.set(ACCESS_TOKEN_KEY, &access.0).await {
            warn!(error = %e, "failed to persist refreshed access token");
        }
        if let Some(rotated) = grant.refresh {
            if let Err(e) = self.store.set(REFRESH_TOKEN_KEY, &rotated).await {
                warn!(error = %e, "failed to persist rotated refresh token");
            }
        }
        Ok(access)
    }

    async fn end_session(&self, error: &RefreshError) {
        warn!(%error, "session refresh failed, logging out");
        if let Err(e) = self.store.clear_session().await {
            warn!(error = %e, "failed to clear stored credentials");
        }
        self.listener.session_ended(error);
    }
}

fn finish(response: ApiResponse) -> Result<ApiResponse, GatewayError> {
    if response.is_success() || response.status.is_redirection() {
        Ok(response)
    } else {
        Err(GatewayError::Http {
            status: response.status,
            body: response.text(),
        })
    }
}

/// Owns the in-flight flag for the leader of a refresh. Settling drains the
/// queue and records a failure in one locked step, then completes the waiters.
/// A rejection arriving after that starts a new cycle, or fails fast while the
/// session has ended and no new refresh token has been stored. Dropping an unsettled guard releases the flag and drops
/// the queued senders.
struct RefreshGuard<'a> {
    state: &'a Mutex<RefreshState>,
    armed: bool,
}

impl RefreshGuard<'_> {
    fn drain(&self, ended: Option<EndedSession>) -> Vec<oneshot::Sender<RefreshOutcome>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight = false;
        if ended.is_some() {
            state.ended = ended;
        }
        std::mem::take(&mut state.pending)
    }

    fn settle(mut self, outcome: &RefreshOutcome, presented: Option<RefreshToken>) {
        self.armed = false;
        let ended = outcome.as_ref().err().map(|error| EndedSession {
            error: error.clone(),
            refresh: presented,
        });
        let pending = self.drain(ended);
        debug!(waiters = pending.len(), ok = outcome.is_ok(), "refresh settled");
        for waiter in pending {
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let pending = self.drain(None);
            warn!(waiters = pending.len(), "refresh abandoned before it settled");
        }
    }
}

#[async_trait::async_trait]
impl RequestGateway for AuthenticatedRequestGateway {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, GatewayError> {
        let request_id = Uuid::new_v4();
        let sent_with = self.store.access_token().await?;

        let response = self
            .send_attempt(request_id, &request, sent_with.as_ref(), Attempt::Original)
            .await?;
        if !response.is_auth_failure() {
            return finish(response);
        }

        let token = match self.rotated_token(sent_with.as_ref()).await? {
            Some(token) => {
                debug!(%request_id, "credential already replaced, replaying");
                token
            }
            None => self.refreshed_token(request_id).await?,
        };

        let replay = self
            .send_attempt(request_id, &request, Some(&token), Attempt::Replay)
            .await?;
        if replay.is_auth_failure() {
            warn!(%request_id, path = %request.path, "request rejected again after refresh");
        }
        finish(replay)
    }

    fn session_state(&self) -> SessionState {
        let state = self.state();
        if state.in_flight {
            SessionState::Refreshing
        } else if state.ended.is_some() {
            SessionState::LoggedOut
        } else {
            SessionState::Idle
        }
    }

    fn session_started(&self) {
        self.state().ended = None;
    }
}
