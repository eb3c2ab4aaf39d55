use crate::domain_model::*;
use crate::domain_port::*;
use reqwest::{Method, StatusCode};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
}

#[derive(Default)]
struct FakeState {
    valid_access: Option<String>,
    valid_refresh: Option<String>,
    issued: usize,
    reject_all: bool,
    rotate_refresh: bool,
    refresh_unreachable: bool,
    refresh_delay: Option<Duration>,
    hold_refresh_until: usize,
    routes: HashMap<(Method, String), ApiResponse>,
    calls: Vec<RecordedCall>,
}

/// In-process backend that behaves like the token-protected API: one access
/// token is valid at a time, the refresh endpoint swaps it for a new one.
// Minimal fake for tests and local runs. Routes registered with `with_route`
// answer without any credential check.
pub struct FakeHttpTransport {
    refresh_path: String,
    state: Mutex<FakeState>,
    refresh_calls: AtomicUsize,
    rejections: AtomicUsize,
    rejected: Notify,
}

impl FakeHttpTransport {
    pub fn new(refresh_path: impl Into<String>) -> Self {
        Self {
            refresh_path: refresh_path.into(),
            state: Mutex::new(FakeState::default()),
            refresh_calls: AtomicUsize::new(0),
            rejections: AtomicUsize::new(0),
            rejected: Notify::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_valid_access(self, token: &str) -> Self {
        self.state().valid_access = Some(token.to_string());
        self
    }

    pub fn with_valid_refresh(self, token: &str) -> Self {
        self.state().valid_refresh = Some(token.to_string());
        self
    }

    /// Every protected endpoint answers 401, whatever token is presented.
    pub fn rejecting_all(self) -> Self {
        self.state().reject_all = true;
        self
    }

    pub fn rotating_refresh(self) -> Self {
        self.state().rotate_refresh = true;
        self
    }

    pub fn with_unreachable_refresh(self) -> Self {
        self.state().refresh_unreachable = true;
        self
    }

    pub fn with_refresh_delay(self, delay: Duration) -> Self {
        self.state().refresh_delay = Some(delay);
        self
    }

    /// The refresh endpoint does not answer until this many protected calls
    /// have been rejected.
    pub fn holding_refresh_until_rejections(self, count: usize) -> Self {
        self.state().hold_refresh_until = count;
        self
    }

    pub fn with_route(
        self,
        method: Method,
        path: &str,
        status: StatusCode,
        body: serde_json::Value,
    ) -> Self {
        self.state().routes.insert(
            (method, path.to_string()),
            ApiResponse::json_body(status, &body),
        );
        self
    }

    pub fn expire_access(&self) {
        self.state().valid_access = None;
    }

    pub fn valid_access(&self) -> Option<String> {
        self.state().valid_access.clone()
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn rejections(&self) -> usize {
        self.rejections.load(Ordering::SeqCst)
    }

    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.path == path)
            .cloned()
            .collect()
    }

    async fn wait_for_rejections(&self, count: usize) {
        loop {
            let notified = self.rejected.notified();
            if self.rejections() >= count {
                return;
            }
            notified.await;
        }
    }

    async fn refresh(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let (hold_until, delay) = {
            let state = self.state();
            (state.hold_refresh_until, state.refresh_delay)
        };
        if hold_until > 0 {
            self.wait_for_rejections(hold_until).await;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let presented = request
            .body
            .as_ref()
            .and_then(|b| b.get("refresh"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let mut state = self.state();
        if state.refresh_unreachable {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        let accepted = presented.is_some() && state.valid_refresh == presented;
        if !accepted {
            return Ok(ApiResponse::json_body(
                StatusCode::UNAUTHORIZED,
                &json!({ "detail": "Token is invalid or expired", "code": "token_not_valid" }),
            ));
        }

        state.issued += 1;
        let access = format!("access-{}", state.issued);
        state.valid_access = Some(access.clone());
        let body = if state.rotate_refresh {
            let refresh = format!("refresh-{}", state.issued);
            state.valid_refresh = Some(refresh.clone());
            json!({ "access": access, "refresh": refresh })
        } else {
            json!({ "access": access })
        };
        Ok(ApiResponse::json_body(StatusCode::OK, &body))
    }
}

#[async_trait::async_trait]
impl HttpTransport for FakeHttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let route = {
            let mut state = self.state();
            state.calls.push(RecordedCall {
                method: request.method.clone(),
                path: request.path.clone(),
                authorization: request.header("authorization").map(str::to_string),
            });
            state
                .routes
                .get(&(request.method.clone(), request.path.clone()))
                .cloned()
        };

        if request.method == Method::POST && request.path == self.refresh_path {
            return self.refresh(request).await;
        }
        if let Some(response) = route {
            return Ok(response);
        }

        let authorized = {
            let state = self.state();
            let expected = state.valid_access.as_ref().map(|t| format!("Bearer {}", t));
            !state.reject_all
                && expected.is_some()
                && expected.as_deref() == request.header("authorization")
        };

        if authorized {
            Ok(ApiResponse::json_body(
                StatusCode::OK,
                &json!({ "method": request.method.as_str(), "path": request.path }),
            ))
        } else {
            self.rejections.fetch_add(1, Ordering::SeqCst);
            self.rejected.notify_waiters();
            Ok(ApiResponse::json_body(
                StatusCode::UNAUTHORIZED,
                &json!({ "detail": "Given token not valid for any token type", "code": "token_not_valid" }),
            ))
        }
    }
}
