#![allow(dead_code)]

use pandit_session::application_port::RefreshError;
use pandit_session::domain_port::SessionListener;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use warp::Filter;
use warp::http::{Method, StatusCode};
use warp::hyper::body::Bytes;
use warp::path::FullPath;

pub const PASSWORD: &str = "secret";
pub const OTP: &str = "123456";

/// Token-checking stand-in for the marketplace backend, mounted under `/api`.
#[derive(Default)]
pub struct MockState {
    valid_access: Mutex<Option<String>>,
    valid_refresh: Mutex<Option<String>>,
    issued: AtomicUsize,
    refresh_calls: AtomicUsize,
    refresh_delay: Mutex<Duration>,
    hits: Mutex<Vec<(String, Option<String>)>>,
}

impl MockState {
    fn issue(&self) -> (String, String) {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let access = format!("access-{}", n);
        let refresh = format!("refresh-{}", n);
        *self.valid_access.lock().unwrap() = Some(access.clone());
        *self.valid_refresh.lock().unwrap() = Some(refresh.clone());
        (access, refresh)
    }

    async fn refresh(&self, body: &Value) -> (StatusCode, Value) {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.refresh_delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        let presented = body.get("refresh").and_then(|v| v.as_str());
        let valid = self.valid_refresh.lock().unwrap().clone();
        if presented.is_none() || presented != valid.as_deref() {
            return (
                StatusCode::UNAUTHORIZED,
                json!({ "detail": "Token is invalid or expired", "code": "token_not_valid" }),
            );
        }

        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let access = format!("access-{}", n);
        *self.valid_access.lock().unwrap() = Some(access.clone());
        (StatusCode::OK, json!({ "access": access }))
    }

    fn login(&self, accepted: bool) -> (StatusCode, Value) {
        if !accepted {
            return (StatusCode::BAD_REQUEST, json!({ "detail": "Invalid credentials." }));
        }
        let (access, refresh) = self.issue();
        (
            StatusCode::OK,
            json!({
                "refresh": refresh,
                "access": access,
                "user_id": 7,
                "full_name": "Asha Sharma",
                "role": "user"
            }),
        )
    }

    fn register(&self, body: &Value) -> (StatusCode, Value) {
        if body.get("phone_number").and_then(|v| v.as_str()).is_none() {
            return (
                StatusCode::BAD_REQUEST,
                json!({ "phone_number": ["This field is required."] }),
            );
        }
        (StatusCode::CREATED, json!({ "id": 8, "full_name": body["full_name"] }))
    }

    fn protected(&self, path: &str, authorization: Option<&str>) -> (StatusCode, Value) {
        let expected = self
            .valid_access
            .lock()
            .unwrap()
            .as_ref()
            .map(|t| format!("Bearer {}", t));
        if expected.is_none() || expected.as_deref() != authorization {
            return (
                StatusCode::UNAUTHORIZED,
                json!({ "detail": "Given token not valid for any token type", "code": "token_not_valid" }),
            );
        }
        if path == "/api/users/profile/" {
            (
                StatusCode::OK,
                json!({
                    "id": 7,
                    "full_name": "Asha Sharma",
                    "phone_number": "9800000000",
                    "role": "user",
                    "city": "Kathmandu"
                }),
            )
        } else {
            (StatusCode::OK, json!({ "path": path }))
        }
    }
}

async fn handle(
    method: Method,
    path: FullPath,
    authorization: Option<String>,
    body: Bytes,
    state: Arc<MockState>,
) -> Result<warp::reply::WithStatus<warp::reply::Json>, Infallible> {
    let path = path.as_str().to_string();
    state
        .hits
        .lock()
        .unwrap()
        .push((path.clone(), authorization.clone()));
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    let (status, reply) = match (method.as_str(), path.as_str()) {
        ("POST", "/api/token/refresh/") => state.refresh(&body).await,
        ("POST", "/api/users/login-password/") => {
            state.login(body.get("password").and_then(|v| v.as_str()) == Some(PASSWORD))
        }
        ("POST", "/api/users/login/") => {
            state.login(body.get("otp_code").and_then(|v| v.as_str()) == Some(OTP))
        }
        ("POST", "/api/users/request-otp/") => (StatusCode::OK, json!({ "detail": "OTP sent." })),
        ("POST", "/api/users/register/") => state.register(&body),
        _ => state.protected(&path, authorization.as_deref()),
    };
    Ok(warp::reply::with_status(warp::reply::json(&reply), status))
}

pub struct MockBackend {
    pub base_url: String,
    pub state: Arc<MockState>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let with_state = {
            let state = state.clone();
            warp::any().map(move || state.clone())
        };

        let routes = warp::method()
            .and(warp::path::full())
            .and(warp::header::optional::<String>("authorization"))
            .and(warp::body::bytes())
            .and(with_state)
            .and_then(handle);

        let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        Self {
            // Trailing slash on purpose: the transport must normalize it.
            base_url: format!("http://{}/api/", addr),
            state,
        }
    }

    /// Issues a login-equivalent token pair directly.
    pub fn issue_session(&self) -> (String, String) {
        self.state.issue()
    }

    pub fn expire_access(&self) {
        *self.state.valid_access.lock().unwrap() = None;
    }

    pub fn revoke_refresh(&self) {
        *self.state.valid_refresh.lock().unwrap() = None;
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.state.refresh_delay.lock().unwrap() = delay;
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn hits_to(&self, path: &str) -> Vec<Option<String>> {
        self.state
            .hits
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, auth)| auth.clone())
            .collect()
    }
}

pub fn counting_listener() -> (Arc<dyn SessionListener>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let listener: Arc<dyn SessionListener> = Arc::new(move |_: &RefreshError| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (listener, count)
}
