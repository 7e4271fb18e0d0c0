//! HTTP API Module
//!
//! Serves the session shell: health, the consent and login flows, deletion
//! of the private store, navigation and chapter pages. The session travels
//! in a signed cookie; no per-visitor state is kept on the server.

pub mod dto;
pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Extension, Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::HttpConfig;
use crate::protocol::Handler;

use self::handlers::{admin, pages, session};

/// Creates the Axum router
pub fn create_router(handler: Arc<Handler>, config: &HttpConfig) -> Router {
    // Build CORS layer
    let cors = if !config.cors_origins.is_empty() {
        // Explicit origins configured: restrict to those
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|s| {
                let parsed = s.parse();
                if parsed.is_err() {
                    tracing::warn!(origin = %s, "invalid_cors_origin_ignored");
                }
                parsed.ok()
            })
            .collect();
        Some(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else if config.cors_allow_all {
        // Explicit dev mode opt-in: allow all origins
        Some(CorsLayer::permissive())
    } else {
        // Default: same-origin only
        None
    };

    let mut app = Router::new()
        .route("/health", get(admin::health))
        .route("/session", get(session::get_session))
        .route("/session/data", delete(session::delete_data))
        .route(
            "/consent",
            get(session::consent_prompt).post(session::submit_consent),
        )
        .route("/login", post(session::login))
        .route("/login/begin", post(session::begin_login))
        .route("/login/cancel", post(session::cancel_login))
        .route("/logout", post(session::logout))
        .route("/navigation", get(session::navigation))
        .route("/pages/:name", get(pages::render_page))
        .layer(Extension(handler));

    if let Some(cors) = cors {
        app = app.layer(cors);
    }

    app
}

/// Starts the HTTP server with graceful shutdown support.
///
/// Launches the retention sweep before accepting connections and stops on
/// SIGINT (ctrl-c) or SIGTERM.
pub async fn start_http_server(
    handler: Arc<Handler>,
    config: &HttpConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(handler.clone(), config);
    handler.start_sweep();

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    println!("HTTP server listening on: http://{addr}");
    tracing::info!(%addr, "http_server_listening");

    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4()?
    } else {
        tokio::net::TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1024)?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(
        uptime_secs = handler.uptime_seconds(),
        pages = handler.total_pages(),
        "http_server_stopped"
    );
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => { eprintln!("\nReceived SIGINT, shutting down..."); }
                    _ = sigterm.recv() => { eprintln!("Received SIGTERM, shutting down..."); }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "sigterm_handler_unavailable");
                let _ = ctrl_c.await;
                eprintln!("\nReceived SIGINT, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = ctrl_c.await {
            tracing::warn!(error = %e, "ctrl_c_handler_unavailable");
            return;
        }
        eprintln!("\nReceived SIGINT, shutting down...");
    }
}
