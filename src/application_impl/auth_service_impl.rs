use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

const REQUEST_OTP_PATH: &str = "/users/request-otp/";
const OTP_LOGIN_PATH: &str = "/users/login/";
const PASSWORD_LOGIN_PATH: &str = "/users/login-password/";
const REGISTER_PATH: &str = "/users/register/";
const PROFILE_PATH: &str = "/users/profile/";

#[derive(Debug, Deserialize)]
struct TokenGrant {
    #[serde(default)]
    access: Option<String>,
    // Some login views answer with `token` instead of `access`.
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    refresh: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    user_id: Option<i64>,
    #[serde(default)]
    full_name: Option<String>,
}

/// Login, registration and profile calls against the marketplace backend.
/// Anonymous endpoints go straight to the transport; the profile goes
/// through the gateway so an expired token is refreshed.
pub struct RealAuthService {
    gateway: Arc<dyn RequestGateway>,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn CredentialStore>,
}

impl RealAuthService {
    pub fn new(
        gateway: Arc<dyn RequestGateway>,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            gateway,
            transport,
            store,
        }
    }

    async fn post_anonymous(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<ApiResponse, AuthError> {
        let response = self
            .transport
            .send(&ApiRequest::post(path).with_json(body))
            .await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(AuthError::Rejected {
                status: response.status,
                message: backend_message(&response),
            })
        }
    }

    async fn start_session(&self, response: ApiResponse) -> Result<LoginResult, AuthError> {
        let grant: TokenGrant = response
            .json()
            .map_err(|e| AuthError::Malformed(e.to_string()))?;
        let access = grant
            .access
            .or(grant.token)
            .ok_or(AuthError::MissingAccessToken)?;

        let result = LoginResult {
            credential: SessionCredential {
                access: AccessToken(access),
                refresh: grant.refresh.map(RefreshToken),
            },
            role: grant.role,
            user: SessionUser {
                user_id: grant.user_id,
                full_name: grant.full_name,
            },
        };

        self.store.clear_session().await?;
        self.store.save_credential(&result.credential).await?;
        if let Some(role) = &result.role {
            self.store.set(ROLE_KEY, role).await?;
        }
        if !result.user.is_empty() {
            let user =
                serde_json::to_string(&result.user).map_err(|e| AuthError::Malformed(e.to_string()))?;
            self.store.set(USER_KEY, &user).await?;
        }
        self.gateway.session_started();

        info!(user_id = ?result.user.user_id, role = ?result.role, "session started");
        Ok(result)
    }
}

/// Picks the human-readable error out of a backend error body: `detail`,
/// then `message`, then flattened field errors.
pub fn backend_message(response: &ApiResponse) -> String {
    let fallback = format!("request failed: {}", response.status);
    let Ok(body) = response.json::<serde_json::Value>() else {
        return fallback;
    };

    for key in ["detail", "message"] {
        if let Some(message) = body.get(key).and_then(|v| v.as_str()) {
            return message.to_string();
        }
    }

    let Some(fields) = body.as_object() else {
        return fallback;
    };
    let flattened = fields
        .iter()
        .map(|(field, errors)| {
            let errors = match errors {
                serde_json::Value::Array(list) => list
                    .iter()
                    .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()))
                    .collect::<Vec<_>>()
                    .join(", "),
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{}: {}", field, errors)
        })
        .collect::<Vec<_>>()
        .join("; ");

    if flattened.is_empty() { fallback } else { flattened }
}

#[async_trait::async_trait]
impl AuthService for RealAuthService {
    async fn request_otp(&self, phone_number: &str) -> Result<serde_json::Value, AuthError> {
        let response = self
            .post_anonymous(REQUEST_OTP_PATH, json!({ "phone_number": phone_number }))
            .await?;
        response.json().map_err(|e| AuthError::Malformed(e.to_string()))
    }

    async fn verify_otp(&self, phone_number: &str, otp_code: &str) -> Result<LoginResult, AuthError> {
        let response = self
            .post_anonymous(
                OTP_LOGIN_PATH,
                json!({ "phone_number": phone_number, "otp_code": otp_code }),
            )
            .await?;
        self.start_session(response).await
    }

    async fn password_login(&self, identifier: &str, password: &str) -> Result<LoginResult, AuthError> {
        let body = if identifier.contains('@') {
            json!({ "email": identifier, "password": password })
        } else {
            json!({ "phone_number": identifier, "password": password })
        };
        let response = self.post_anonymous(PASSWORD_LOGIN_PATH, body).await?;
        self.start_session(response).await
    }

    async fn register(&self, input: RegisterInput) -> Result<serde_json::Value, AuthError> {
        let body = serde_json::to_value(&input).map_err(|e| AuthError::Malformed(e.to_string()))?;
        let response = self.post_anonymous(REGISTER_PATH, body).await?;
        response.json().map_err(|e| AuthError::Malformed(e.to_string()))
    }

    async fn fetch_profile(&self) -> Result<UserProfile, AuthError> {
        let response = self.gateway.request(ApiRequest::get(PROFILE_PATH)).await?;
        let profile: UserProfile = response
            .json()
            .map_err(|e| AuthError::Malformed(e.to_string()))?;
        if let Some(role) = &profile.role {
            self.store.set(ROLE_KEY, role).await?;
        }
        Ok(profile)
    }

    async fn logout(&self) -> Result<(), AuthError> {
        self.store.clear_session().await?;
        info!("logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::{AuthenticatedRequestGateway, DEFAULT_REFRESH_PATH, GatewayConfig};
    use crate::infra::*;
    use reqwest::{Method, StatusCode};

    fn build(
        transport: FakeHttpTransport,
    ) -> (RealAuthService, Arc<MemoryCredentialStore>, Arc<dyn RequestGateway>) {
        let store = Arc::new(MemoryCredentialStore::new());
        let transport = Arc::new(transport);
        let gateway: Arc<dyn RequestGateway> = Arc::new(AuthenticatedRequestGateway::new(
            store.clone(),
            transport.clone(),
            Arc::new(|_: &RefreshError| {}),
            GatewayConfig::default(),
        ));
        (
            RealAuthService::new(gateway.clone(), transport, store.clone()),
            store,
            gateway,
        )
    }

    #[tokio::test]
    async fn password_login_stores_the_session() {
        let transport = FakeHttpTransport::new(DEFAULT_REFRESH_PATH).with_route(
            Method::POST,
            PASSWORD_LOGIN_PATH,
            StatusCode::OK,
            json!({
                "access": "a1",
                "refresh": "r1",
                "user_id": 7,
                "full_name": "Asha Sharma",
                "role": "pandit"
            }),
        );
        let (service, store, _) = build(transport);

        let result = service.password_login("9800000000", "secret").await.unwrap();

        assert_eq!(result.credential.access, AccessToken("a1".to_string()));
        assert_eq!(store.access_token().await.unwrap(), Some(AccessToken("a1".to_string())));
        assert_eq!(store.refresh_token().await.unwrap(), Some(RefreshToken("r1".to_string())));
        assert_eq!(store.get(ROLE_KEY).await.unwrap().as_deref(), Some("pandit"));
        let user: SessionUser =
            serde_json::from_str(&store.get(USER_KEY).await.unwrap().unwrap()).unwrap();
        assert_eq!(user.user_id, Some(7));
    }

    #[tokio::test]
    async fn login_accepts_token_field() {
        let transport = FakeHttpTransport::new(DEFAULT_REFRESH_PATH).with_route(
            Method::POST,
            OTP_LOGIN_PATH,
            StatusCode::OK,
            json!({ "token": "a2" }),
        );
        let (service, store, _) = build(transport);

        let result = service.verify_otp("9800000000", "123456").await.unwrap();

        assert_eq!(result.credential.refresh, None);
        assert_eq!(store.access_token().await.unwrap(), Some(AccessToken("a2".to_string())));
    }

    #[tokio::test]
    async fn rejected_login_surfaces_detail() {
        let transport = FakeHttpTransport::new(DEFAULT_REFRESH_PATH).with_route(
            Method::POST,
            PASSWORD_LOGIN_PATH,
            StatusCode::BAD_REQUEST,
            json!({ "detail": "Invalid credentials." }),
        );
        let (service, store, _) = build(transport);

        let error = service.password_login("a@b.com", "nope").await.unwrap_err();

        assert_eq!(error.to_string(), "Invalid credentials.");
        assert_eq!(store.access_token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn login_leaves_logged_out_state() {
        let transport = FakeHttpTransport::new(DEFAULT_REFRESH_PATH).with_route(
            Method::POST,
            PASSWORD_LOGIN_PATH,
            StatusCode::OK,
            json!({ "access": "a1", "refresh": "r1" }),
        );
        let (service, _, gateway) = build(transport);

        // No refresh token yet: the first protected call logs the session out.
        assert!(service.fetch_profile().await.is_err());
        assert_eq!(gateway.session_state(), SessionState::LoggedOut);

        service.password_login("9800000000", "secret").await.unwrap();
        assert_eq!(gateway.session_state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn logout_clears_every_session_key() {
        let (service, store, _) = build(FakeHttpTransport::new(DEFAULT_REFRESH_PATH));
        store.set(ACCESS_TOKEN_KEY, "a").await.unwrap();
        store.set(REFRESH_TOKEN_KEY, "r").await.unwrap();
        store.set(USER_KEY, "{}").await.unwrap();

        service.logout().await.unwrap();

        for key in SESSION_KEYS {
            assert_eq!(store.get(key).await.unwrap(), None);
        }
    }

    #[test]
    fn field_errors_are_flattened() {
        let response = ApiResponse::json_body(
            StatusCode::BAD_REQUEST,
            &json!({ "phone_number": ["This field is required."], "email": "Enter a valid email address." }),
        );
        let message = backend_message(&response);
        assert!(message.contains("phone_number: This field is required."));
        assert!(message.contains("email: Enter a valid email address."));
        assert!(message.contains("; "));
    }

    #[test]
    fn non_json_errors_fall_back_to_status() {
        let response = ApiResponse::new(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert_eq!(backend_message(&response), "request failed: 502 Bad Gateway");
    }
}
