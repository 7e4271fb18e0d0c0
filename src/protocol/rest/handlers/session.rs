//! Session Handlers
//!
//! Endpoints for the consent dialog, login, logout and deletion of the
//! private data store. Every endpoint resolves the visitor from its own
//! cookie; a changed session is sent back as a new cookie.

use std::sync::Arc;

use axum::{http::HeaderMap, Extension, Json};

use super::{cookie_header, CookieHeader};
use crate::protocol::rest::dto::{
    ApiResponse, ChapterDto, ConsentPromptDto, DeletionDto, NavigationDto, SessionDto,
};
use crate::protocol::rest::error::RestError;
use crate::protocol::Handler;
use crate::resolver::{ConsentDecision, LoginRequest, SessionContext, Transition};

fn session_dto(
    handler: &Handler,
    ctx: &SessionContext,
    transition: Option<&Transition>,
) -> SessionDto {
    let shared = &handler.config().storage.shared_db_name;
    SessionDto {
        state: ctx.state(),
        session: ctx.info().cloned(),
        db_class: ctx.info().map(|info| info.db_class(shared)),
        expires_at: transition.map(|t| t.token.expires_at),
    }
}

fn issue(handler: &Handler, transition: Option<&Transition>) -> CookieHeader {
    let store = handler.resolver().store();
    cookie_header(transition.map(|t| store.set_cookie(&t.token)))
}

/// Current resolver state and session
pub async fn get_session(
    Extension(handler): Extension<Arc<Handler>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<SessionDto>>, RestError> {
    let ctx = handler.resolve(&headers);
    Ok(Json(ApiResponse::success(session_dto(&handler, &ctx, None))))
}

/// Consent dialog: a previewed identifier, the text and the base datasets
pub async fn consent_prompt(
    Extension(handler): Extension<Arc<Handler>>,
) -> Result<Json<ApiResponse<ConsentPromptDto>>, RestError> {
    let user_id = handler.resolver().preview_user_id()?;
    Ok(Json(ApiResponse::success(ConsentPromptDto {
        text: handler.consent_text(&user_id),
        user_id,
        default_base_data: handler.catalog().default_key().map(str::to_string),
        options: handler.catalog().entries(),
    })))
}

/// Accept or decline the consent dialog
pub async fn submit_consent(
    Extension(handler): Extension<Arc<Handler>>,
    headers: HeaderMap,
    Json(decision): Json<ConsentDecision>,
) -> Result<(CookieHeader, Json<ApiResponse<SessionDto>>), RestError> {
    let (ctx, transition) = handler.consent(&headers, decision).await?;
    Ok((
        issue(&handler, transition.as_ref()),
        Json(ApiResponse::success(session_dto(&handler, &ctx, transition.as_ref()))),
    ))
}

/// Open the login form
pub async fn begin_login(
    Extension(handler): Extension<Arc<Handler>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<SessionDto>>, RestError> {
    let ctx = handler.begin_login(&headers)?;
    Ok(Json(ApiResponse::success(session_dto(&handler, &ctx, None))))
}

/// Submit credentials to the identity provider
pub async fn login(
    Extension(handler): Extension<Arc<Handler>>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieHeader, Json<ApiResponse<SessionDto>>), RestError> {
    let (ctx, transition) = handler.login(&headers, &request).await?;
    Ok((
        issue(&handler, Some(&transition)),
        Json(ApiResponse::success(session_dto(&handler, &ctx, Some(&transition)))),
    ))
}

/// Leave the login form
pub async fn cancel_login(
    Extension(handler): Extension<Arc<Handler>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<SessionDto>>, RestError> {
    let ctx = handler.cancel_login(&headers)?;
    Ok(Json(ApiResponse::success(session_dto(&handler, &ctx, None))))
}

/// Delete the session token
pub async fn logout(
    Extension(handler): Extension<Arc<Handler>>,
    headers: HeaderMap,
) -> Result<(CookieHeader, Json<ApiResponse<SessionDto>>), RestError> {
    let cookie = handler.logout(&headers);
    Ok((
        cookie_header(Some(cookie)),
        Json(ApiResponse::success(session_dto(&handler, &SessionContext::new(), None))),
    ))
}

/// Delete the private data store, then the token
pub async fn delete_data(
    Extension(handler): Extension<Arc<Handler>>,
    headers: HeaderMap,
) -> Result<(CookieHeader, Json<ApiResponse<DeletionDto>>), RestError> {
    let (deletion, cookie) = handler.delete_data(&headers).await?;
    let db_name = deletion
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((
        cookie_header(Some(cookie)),
        Json(ApiResponse::success(DeletionDto {
            db_name,
            existed: deletion.existed,
        })),
    ))
}

/// Page settings and the chapters offered to this session
pub async fn navigation(
    Extension(handler): Extension<Arc<Handler>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<NavigationDto>>, RestError> {
    let ctx = handler.resolve(&headers);
    let http = &handler.config().http;
    Ok(Json(ApiResponse::success(NavigationDto {
        page_title: http.page_title.clone(),
        layout: http.layout,
        chapters: handler.navigation(&ctx).into_iter().map(ChapterDto::from).collect(),
    })))
}
