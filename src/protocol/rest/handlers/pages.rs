//! Page Handlers
//!
//! Dispatches chapter pages for visitors with an active session.

use std::sync::Arc;

use axum::{extract::Path, http::HeaderMap, Extension, Json};

use crate::chapters::Dispatch;
use crate::protocol::rest::dto::ApiResponse;
use crate::protocol::rest::error::RestError;
use crate::protocol::Handler;
use crate::resolver::ResolverState;

/// Render a chapter page
pub async fn render_page(
    Extension(handler): Extension<Arc<Handler>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<Dispatch>>, RestError> {
    match handler.page(&headers, name).await? {
        Ok(dispatch) => Ok(Json(ApiResponse::success(dispatch))),
        Err(ResolverState::AwaitingLogin) => Err(RestError::unauthorized(
            "LOGIN_REQUIRED",
            "Please log in to continue",
        )),
        Err(_) => Err(RestError::unauthorized(
            "CONSENT_REQUIRED",
            "Please accept or decline the cookie consent first",
        )),
    }
}
