//! REST API endpoint tests (tower test utilities, no server needed).

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::{json, Value};
use skgstat_uncertainty::config::HttpConfig;
use skgstat_uncertainty::identity_provider::DisabledProvider;
use skgstat_uncertainty::protocol::rest::create_router;
use skgstat_uncertainty::protocol::Handler;
use skgstat_uncertainty::session_info::user_db_name;
use skgstat_uncertainty::{
    AppError, AppResult, BaseDataCatalog, Chapter, ChapterDispatcher, Config, Credentials,
    IdentityProvider, PageContext, PageHandler, ProviderLogin, Render, SystemClock,
};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const CATALOG: &str = r#"{"plain": "Empty database - upload own data", "pancake": "Pancake image"}"#;

struct JaneProvider;

#[async_trait]
impl IdentityProvider for JaneProvider {
    async fn sign_in(&self, credentials: &Credentials) -> AppResult<ProviderLogin> {
        if credentials.password != "correct horse" {
            return Err(AppError::IdentityProvider {
                message: "INVALID_PASSWORD".to_string(),
            });
        }
        let info = json!({
            "localId": "uid-jane",
            "email": credentials.email,
            "displayName": "Jane Doe",
            "emailVerified": true
        });
        Ok(ProviderLogin {
            id_token: "id".to_string(),
            refresh_token: "refresh".to_string(),
            info: info.as_object().cloned().unwrap(),
        })
    }
}

struct BrokenVariogram;

impl PageHandler for BrokenVariogram {
    fn render(&self, _ctx: &PageContext<'_>) -> anyhow::Result<Render> {
        anyhow::bail!("no experimental variogram has been estimated yet")
    }
}

struct TestApp {
    app: axum::Router,
    handler: Arc<Handler>,
    tmp: TempDir,
}

impl TestApp {
    fn data_dir(&self) -> std::path::PathBuf {
        self.tmp.path().join("data")
    }
}

fn build(provider: Arc<dyn IdentityProvider>, require_login: bool) -> TestApp {
    let tmp = TempDir::new().unwrap();
    let data_dir = tmp.path().join("data");
    std::fs::create_dir_all(&data_dir).unwrap();
    std::fs::write(data_dir.join("pancake.db"), b"pancake seed").unwrap();

    let mut config = Config::default();
    config.storage.data_dir = data_dir;
    config.session.require_login = require_login;
    config.session.secret = "integration-secret".to_string();

    let mut dispatcher = ChapterDispatcher::with_builtin_pages();
    dispatcher.register(Chapter::Variogram, Arc::new(BrokenVariogram));

    let handler = Arc::new(Handler::new(
        config,
        BaseDataCatalog::from_json(CATALOG).unwrap(),
        provider,
        dispatcher,
        Arc::new(SystemClock),
    ));
    let app = create_router(handler.clone(), &HttpConfig::default());
    TestApp { app, handler, tmp }
}

fn test_app() -> TestApp {
    build(Arc::new(JaneProvider), false)
}

struct Reply {
    status: StatusCode,
    body: Value,
    set_cookie: Option<String>,
}

impl Reply {
    /// `Cookie` request header value carrying the issued token.
    fn cookie(&self) -> String {
        let set_cookie = self.set_cookie.as_deref().expect("response must set a cookie");
        set_cookie.split(';').next().unwrap().to_string()
    }
}

async fn send(app: &axum::Router, method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Reply {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let req = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let set_cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Reply {
        status,
        body,
        set_cookie,
    }
}

async fn accept(app: &axum::Router, base: &str) -> Reply {
    let reply = send(
        app,
        "POST",
        "/consent",
        None,
        Some(json!({"base_data": base, "accept": true})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    reply
}

async fn decline(app: &axum::Router) -> Reply {
    let reply = send(
        app,
        "POST",
        "/consent",
        None,
        Some(json!({"base_data": "plain", "decline": true})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    reply
}

// === Health ===

#[tokio::test]
async fn test_health_reports_version() {
    let t = test_app();
    let reply = send(&t.app, "GET", "/health", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["success"], true);
    assert_eq!(reply.body["data"]["status"], "healthy");
    assert_eq!(reply.body["data"]["sweep_started"], false);
}

// === Session resolution ===

#[tokio::test]
async fn test_no_cookie_awaits_consent() {
    let t = test_app();
    let reply = send(&t.app, "GET", "/session", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["state"], "AWAITING_CONSENT");
    assert!(reply.body["data"].get("session").is_none());
}

#[tokio::test]
async fn test_garbage_cookie_awaits_consent() {
    let t = test_app();
    let reply = send(&t.app, "GET", "/session", Some("skg_opts=not.a-token"), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["state"], "AWAITING_CONSENT");
}

#[tokio::test]
async fn test_consent_prompt_lists_catalog() {
    let t = test_app();
    let reply = send(&t.app, "GET", "/consent", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let data = &reply.body["data"];
    let user_id = data["user_id"].as_str().unwrap();
    assert_eq!(user_id.len(), 24);
    assert!(user_id.chars().all(|c| c.is_ascii_alphabetic()));
    assert!(data["text"].as_str().unwrap().contains(user_id));
    let keys: Vec<_> = data["options"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["key"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(keys, vec!["plain", "pancake"]);
    assert_eq!(data["default_base_data"], "plain");
}

// === Consent ===

#[tokio::test]
async fn test_accept_plain_issues_anonymous_session() {
    let t = test_app();
    let reply = accept(&t.app, "plain").await;

    let set_cookie = reply.set_cookie.clone().unwrap();
    assert!(set_cookie.starts_with("skg_opts="));
    assert!(set_cookie.contains("HttpOnly"));
    let session = &reply.body["data"]["session"];
    assert_eq!(reply.body["data"]["state"], "ACTIVE");
    assert_eq!(reply.body["data"]["db_class"], "anonymous");
    assert!(session["db_name"].as_str().unwrap().starts_with("a_"));
    assert_eq!(session["can_upload"], true);

    // The cookie resolves to the same session on the next request
    let again = send(&t.app, "GET", "/session", Some(&reply.cookie()), None).await;
    assert_eq!(again.body["data"]["state"], "ACTIVE");
    assert_eq!(again.body["data"]["session"], *session);
}

#[tokio::test]
async fn test_replayed_consent_id_gets_own_store() {
    let t = test_app();
    let prompt = send(&t.app, "GET", "/consent", None, None).await;
    let user_id = prompt.body["data"]["user_id"].as_str().unwrap().to_string();
    let body = json!({"base_data": "plain", "accept": true, "user_id": user_id});

    let first = send(&t.app, "POST", "/consent", None, Some(body.clone())).await;
    let second = send(&t.app, "POST", "/consent", None, Some(body)).await;
    assert_eq!(first.status, StatusCode::OK, "{}", first.body);
    assert_eq!(second.status, StatusCode::OK, "{}", second.body);

    let first_db = first.body["data"]["session"]["db_name"].as_str().unwrap();
    let second_db = second.body["data"]["session"]["db_name"].as_str().unwrap();
    assert_eq!(first_db, format!("a_{user_id}.db"));
    assert_ne!(first_db, second_db);
}

#[tokio::test]
async fn test_accept_with_base_dataset_seeds_store() {
    let t = test_app();
    let reply = accept(&t.app, "pancake").await;
    let db_name = reply.body["data"]["session"]["db_name"].as_str().unwrap();
    assert_eq!(reply.body["data"]["session"]["can_upload"], false);
    assert_eq!(
        std::fs::read(t.data_dir().join(db_name)).unwrap(),
        b"pancake seed"
    );
}

#[tokio::test]
async fn test_decline_uses_shared_store_and_expires_sooner() {
    let t = test_app();
    let declined = decline(&t.app).await;
    let accepted = accept(&t.app, "plain").await;

    assert_eq!(declined.body["data"]["session"]["db_name"], "shared.db");
    assert_eq!(declined.body["data"]["session"]["can_upload"], false);
    assert_eq!(declined.body["data"]["db_class"], "shared");

    let expiry = |r: &Reply| {
        chrono::DateTime::parse_from_rfc3339(r.body["data"]["expires_at"].as_str().unwrap()).unwrap()
    };
    assert!(expiry(&declined) < expiry(&accepted));
}

#[tokio::test]
async fn test_consent_without_decision_sets_no_cookie() {
    let t = test_app();
    let reply = send(&t.app, "POST", "/consent", None, Some(json!({"base_data": "plain"}))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.set_cookie.is_none());
    assert_eq!(reply.body["data"]["state"], "AWAITING_CONSENT");
}

#[tokio::test]
async fn test_consent_unknown_base_rejected() {
    let t = test_app();
    let reply = send(
        &t.app,
        "POST",
        "/consent",
        None,
        Some(json!({"base_data": "meuse", "accept": true})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["success"], false);
    assert!(reply.set_cookie.is_none());
}

#[tokio::test]
async fn test_consent_twice_is_conflict() {
    let t = test_app();
    let first = decline(&t.app).await;
    let reply = send(
        &t.app,
        "POST",
        "/consent",
        Some(&first.cookie()),
        Some(json!({"base_data": "plain", "accept": true})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
}

// === Pages ===

#[tokio::test]
async fn test_page_requires_consent() {
    let t = test_app();
    let reply = send(&t.app, "GET", "/pages/home", None, None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["error"]["code"], "CONSENT_REQUIRED");
}

#[tokio::test]
async fn test_home_page_renders_session() {
    let t = test_app();
    let cookie = decline(&t.app).await.cookie();
    let reply = send(&t.app, "GET", "/pages/home", Some(&cookie), None).await;

    assert_eq!(reply.status, StatusCode::OK);
    let data = &reply.body["data"];
    assert_eq!(data["outcome"], "rendered");
    assert_eq!(data["render"]["status"], "halted");
    let blocks = data["render"]["page"]["blocks"].as_array().unwrap();
    assert_eq!(blocks[0]["text"], "Index page");
    assert_eq!(blocks[2]["value"]["db_name"], "shared.db");
}

#[tokio::test]
async fn test_unknown_page_renders_nothing() {
    let t = test_app();
    let cookie = decline(&t.app).await.cookie();
    let reply = send(&t.app, "GET", "/pages/admin", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["outcome"], "nothing");
}

#[tokio::test]
async fn test_failing_chapter_renders_diagnostic() {
    let t = test_app();
    let cookie = decline(&t.app).await.cookie();
    let reply = send(&t.app, "GET", "/pages/variogram", Some(&cookie), None).await;

    assert_eq!(reply.status, StatusCode::OK);
    let data = &reply.body["data"];
    assert_eq!(data["outcome"], "diagnostic");
    let blocks = data["page"]["blocks"].as_array().unwrap();
    assert_eq!(blocks[0]["text"], "Unallowed action");
    assert_eq!(
        blocks[2]["message"],
        "no experimental variogram has been estimated yet"
    );

    // The process keeps serving
    let health = send(&t.app, "GET", "/health", None, None).await;
    assert_eq!(health.status, StatusCode::OK);
}

#[tokio::test]
async fn test_page_request_starts_sweep_once() {
    let t = test_app();
    assert!(!t.handler.sweeper().has_started());
    let cookie = decline(&t.app).await.cookie();
    send(&t.app, "GET", "/pages/home", Some(&cookie), None).await;
    assert!(t.handler.sweeper().has_started());
    assert!(t.handler.sweeper().spawn_once().is_none());
}

// === Navigation ===

#[tokio::test]
async fn test_navigation_follows_upload_permission() {
    let t = test_app();
    let keys = |r: &Reply| -> Vec<String> {
        r.body["data"]["chapters"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["key"].as_str().unwrap().to_string())
            .collect()
    };

    let upload = accept(&t.app, "plain").await.cookie();
    let reply = send(&t.app, "GET", "/navigation", Some(&upload), None).await;
    assert!(keys(&reply).contains(&"data".to_string()));
    assert!(!keys(&reply).contains(&"sample".to_string()));
    assert_eq!(reply.body["data"]["page_title"], "Uncertainty by hydrocode");
    assert_eq!(reply.body["data"]["layout"], "wide");

    let shared = decline(&t.app).await.cookie();
    let reply = send(&t.app, "GET", "/navigation", Some(&shared), None).await;
    assert!(!keys(&reply).contains(&"data".to_string()));
    assert!(keys(&reply).contains(&"sample".to_string()));
}

// === Logout and deletion ===

#[tokio::test]
async fn test_logout_clears_cookie() {
    let t = test_app();
    let cookie = decline(&t.app).await.cookie();
    let reply = send(&t.app, "POST", "/logout", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.set_cookie.unwrap().contains("Max-Age=0"));
    assert_eq!(reply.body["data"]["state"], "NO_SESSION");
}

#[tokio::test]
async fn test_delete_private_store() {
    let t = test_app();
    let consent = accept(&t.app, "pancake").await;
    let db_name = consent.body["data"]["session"]["db_name"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(t.data_dir().join(&db_name).exists());

    let reply = send(&t.app, "DELETE", "/session/data", Some(&consent.cookie()), None).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(reply.body["data"]["db_name"], db_name);
    assert_eq!(reply.body["data"]["existed"], true);
    assert!(reply.set_cookie.unwrap().contains("Max-Age=0"));
    assert!(!t.data_dir().join(&db_name).exists());
}

#[tokio::test]
async fn test_delete_store_already_gone() {
    let t = test_app();
    let consent = accept(&t.app, "plain").await;
    let db_name = consent.body["data"]["session"]["db_name"].as_str().unwrap();
    std::fs::remove_file(t.data_dir().join(db_name)).unwrap();

    let reply = send(&t.app, "DELETE", "/session/data", Some(&consent.cookie()), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["existed"], false);
}

#[tokio::test]
async fn test_delete_shared_store_is_unsupported_and_keeps_cookie() {
    let t = test_app();
    std::fs::write(t.data_dir().join("shared.db"), b"shared").unwrap();
    let cookie = decline(&t.app).await.cookie();

    let reply = send(&t.app, "DELETE", "/session/data", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.body["error"]["code"], "UNSUPPORTED_DELETION");
    assert!(reply.set_cookie.is_none());
    assert!(t.data_dir().join("shared.db").exists());
}

#[tokio::test]
async fn test_delete_without_session_is_conflict() {
    let t = test_app();
    let reply = send(&t.app, "DELETE", "/session/data", None, None).await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
}

// === Login ===

fn credentials(password: &str) -> Value {
    json!({"email": "jane@example.org", "password": password, "base_data": "pancake"})
}

#[tokio::test]
async fn test_login_from_consent_dialog() {
    let t = test_app();
    let reply = send(&t.app, "POST", "/login", None, Some(credentials("correct horse"))).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);

    let session = &reply.body["data"]["session"];
    assert_eq!(session["did_login"], true);
    assert_eq!(session["db_name"], user_db_name("jane@example.org"));
    assert_eq!(session["name"], "Jane Doe");
    assert_eq!(session["auth_entity"]["emailVerified"], true);
    assert_eq!(reply.body["data"]["db_class"], "user");
    assert!(t.data_dir().join(user_db_name("jane@example.org")).exists());

    let again = send(&t.app, "GET", "/session", Some(&reply.cookie()), None).await;
    assert_eq!(again.body["data"]["session"]["did_login"], true);
}

#[tokio::test]
async fn test_login_failure_surfaces_provider_message() {
    let t = test_app();
    let reply = send(&t.app, "POST", "/login", None, Some(credentials("wrong"))).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["error"]["message"], "INVALID_PASSWORD");
    assert!(reply.set_cookie.is_none());
}

#[tokio::test]
async fn test_login_disabled() {
    let t = build(Arc::new(DisabledProvider), false);
    let reply = send(&t.app, "POST", "/login", None, Some(credentials("correct horse"))).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_begin_and_cancel_login_restore_session() {
    let t = test_app();
    let cookie = decline(&t.app).await.cookie();

    let begun = send(&t.app, "POST", "/login/begin", Some(&cookie), None).await;
    assert_eq!(begun.body["data"]["state"], "AWAITING_LOGIN");

    let cancelled = send(&t.app, "POST", "/login/cancel", Some(&cookie), None).await;
    assert_eq!(cancelled.status, StatusCode::OK);
    assert_eq!(cancelled.body["data"]["state"], "ACTIVE");
    assert_eq!(cancelled.body["data"]["session"]["db_name"], "shared.db");
    assert!(cancelled.set_cookie.is_none());
}

#[tokio::test]
async fn test_required_login_blocks_pages() {
    let t = build(Arc::new(JaneProvider), true);
    let cookie = decline(&t.app).await.cookie();

    let session = send(&t.app, "GET", "/session", Some(&cookie), None).await;
    assert_eq!(session.body["data"]["state"], "AWAITING_LOGIN");

    let page = send(&t.app, "GET", "/pages/home", Some(&cookie), None).await;
    assert_eq!(page.status, StatusCode::UNAUTHORIZED);
    assert_eq!(page.body["error"]["code"], "LOGIN_REQUIRED");

    let login = send(&t.app, "POST", "/login", Some(&cookie), Some(credentials("correct horse"))).await;
    assert_eq!(login.status, StatusCode::OK);
    let page = send(&t.app, "GET", "/pages/home", Some(&login.cookie()), None).await;
    assert_eq!(page.status, StatusCode::OK);
}
