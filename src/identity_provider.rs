//! Identity Provider Client
//!
//! Email/password sign-in against an external identity service speaking the
//! Identity Toolkit REST dialect:
//!
//! 1. `POST sign_in_url?key=…` with `{email, password, returnSecureToken}`
//!    returns `{idToken, refreshToken, localId, email, …}` or
//!    `{error: {message}}`.
//! 2. `POST lookup_url?key=…` with `{idToken}` returns `{users: [profile]}`.
//!
//! Only the resulting profile object matters to the rest of the shell; it
//! is merged into the session as `auth_entity`.

use crate::config::IdentityConfig;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Login form contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Successful sign-in.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderLogin {
    pub id_token: String,
    pub refresh_token: String,
    /// Profile document of the signed-in account
    pub info: Map<String, Value>,
}

impl ProviderLogin {
    /// Stable username used to key the user's private store.
    pub fn username(&self) -> Option<String> {
        ["email", "localId"]
            .iter()
            .find_map(|k| self.info.get(*k).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Human-readable name, falling back to the username.
    pub fn display_name(&self) -> Option<String> {
        self.info
            .get("displayName")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| self.username())
    }
}

/// Performs credential checks against an external service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, credentials: &Credentials) -> AppResult<ProviderLogin>;
}

/// Provider used when login is switched off.
#[derive(Debug, Default)]
pub struct DisabledProvider;

#[async_trait]
impl IdentityProvider for DisabledProvider {
    async fn sign_in(&self, _credentials: &Credentials) -> AppResult<ProviderLogin> {
        Err(AppError::IdentityProvider {
            message: "Login is not enabled on this server".to_string(),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    local_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<Map<String, Value>>,
}

/// Turn a provider error body into a user-facing message.
pub fn provider_error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("Identity provider returned HTTP {status}"))
}

/// HTTP implementation backed by `reqwest`.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    config: IdentityConfig,
}

impl HttpIdentityProvider {
    pub fn new(config: IdentityConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::IdentityProvider {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    async fn post(&self, url: &str, body: &Value) -> AppResult<Value> {
        let response = self
            .client
            .post(url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url, error = %e, "identity_provider_unreachable");
                AppError::IdentityProvider {
                    message: format!("Identity provider unreachable: {e}"),
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| AppError::IdentityProvider {
            message: format!("Identity provider response unreadable: {e}"),
        })?;

        if !status.is_success() {
            let message = provider_error_message(status.as_u16(), &text);
            tracing::info!(url, status = status.as_u16(), %message, "identity_provider_rejected");
            return Err(AppError::IdentityProvider { message });
        }

        serde_json::from_str(&text).map_err(|e| AppError::IdentityProvider {
            message: format!("Identity provider sent an invalid response: {e}"),
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn sign_in(&self, credentials: &Credentials) -> AppResult<ProviderLogin> {
        let body = serde_json::json!({
            "email": credentials.email,
            "password": credentials.password,
            "returnSecureToken": true,
        });
        let raw = self.post(&self.config.sign_in_url, &body).await?;
        let signed_in: SignInResponse =
            serde_json::from_value(raw).map_err(|e| AppError::IdentityProvider {
                message: format!("Identity provider sent an invalid sign-in response: {e}"),
            })?;

        let lookup = self
            .post(
                &self.config.lookup_url,
                &serde_json::json!({ "idToken": signed_in.id_token }),
            )
            .await?;
        let profile = serde_json::from_value::<LookupResponse>(lookup)
            .ok()
            .and_then(|r| r.users.into_iter().next());

        let info = profile.unwrap_or_else(|| {
            let mut fallback = Map::new();
            if let Some(id) = signed_in.local_id.clone() {
                fallback.insert("localId".to_string(), Value::String(id));
            }
            if let Some(email) = signed_in.email.clone() {
                fallback.insert("email".to_string(), Value::String(email));
            }
            fallback
        });

        tracing::info!(user = ?info.get("localId"), "identity_provider_signed_in");
        Ok(ProviderLogin {
            id_token: signed_in.id_token,
            refresh_token: signed_in.refresh_token,
            info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};

    fn login_with(info: Value) -> ProviderLogin {
        ProviderLogin {
            id_token: "id".to_string(),
            refresh_token: "refresh".to_string(),
            info: info.as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_username_prefers_email() {
        let login = login_with(serde_json::json!({"localId": "uid1", "email": "jane@example.org"}));
        assert_eq!(login.username().as_deref(), Some("jane@example.org"));
        assert_eq!(login.display_name().as_deref(), Some("jane@example.org"));
    }

    #[test]
    fn test_username_falls_back_to_local_id() {
        let login = login_with(serde_json::json!({"localId": "uid1", "displayName": "Jane"}));
        assert_eq!(login.username().as_deref(), Some("uid1"));
        assert_eq!(login.display_name().as_deref(), Some("Jane"));
    }

    #[test]
    fn test_provider_error_message_extracts_message() {
        let body = r#"{"error": {"code": 400, "message": "INVALID_PASSWORD"}}"#;
        assert_eq!(provider_error_message(400, body), "INVALID_PASSWORD");
    }

    #[test]
    fn test_provider_error_message_fallback() {
        assert_eq!(
            provider_error_message(503, "<html>down</html>"),
            "Identity provider returned HTTP 503"
        );
    }

    #[tokio::test]
    async fn test_disabled_provider_rejects() {
        let creds = Credentials {
            email: "a@b.c".to_string(),
            password: "x".to_string(),
        };
        let err = DisabledProvider.sign_in(&creds).await.unwrap_err();
        assert!(matches!(err, AppError::IdentityProvider { .. }));
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn config_for(base: &str) -> IdentityConfig {
        IdentityConfig {
            enabled: true,
            api_key: "test-key".to_string(),
            sign_in_url: format!("{base}/signIn"),
            lookup_url: format!("{base}/lookup"),
            timeout_ms: 5_000,
        }
    }

    #[tokio::test]
    async fn test_http_provider_sign_in_and_lookup() {
        let router = Router::new()
            .route(
                "/signIn",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["email"], "jane@example.org");
                    Json(serde_json::json!({
                        "idToken": "tok", "refreshToken": "ref", "localId": "uid1"
                    }))
                }),
            )
            .route(
                "/lookup",
                post(|| async {
                    Json(serde_json::json!({
                        "users": [{"localId": "uid1", "email": "jane@example.org", "emailVerified": true}]
                    }))
                }),
            );
        let base = serve(router).await;
        let provider = HttpIdentityProvider::new(config_for(&base)).unwrap();

        let login = provider
            .sign_in(&Credentials {
                email: "jane@example.org".to_string(),
                password: "secret".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(login.id_token, "tok");
        assert_eq!(login.refresh_token, "ref");
        assert_eq!(login.info["emailVerified"], true);
        assert_eq!(login.username().as_deref(), Some("jane@example.org"));
    }

    #[tokio::test]
    async fn test_http_provider_surfaces_error_message() {
        let router = Router::new().route(
            "/signIn",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": {"message": "EMAIL_NOT_FOUND"}})),
                )
            }),
        );
        let base = serve(router).await;
        let provider = HttpIdentityProvider::new(config_for(&base)).unwrap();

        let err = provider
            .sign_in(&Credentials {
                email: "nobody@example.org".to_string(),
                password: "x".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "EMAIL_NOT_FOUND");
    }
}
