//! REST API Handlers
//!
//! Contains all HTTP endpoint handlers organized by domain.

pub mod admin;
pub mod pages;
pub mod session;

use axum::http::{header, HeaderName};
use axum::response::AppendHeaders;

/// `Set-Cookie` response header, when the request changed the token.
pub type CookieHeader = AppendHeaders<Option<(HeaderName, String)>>;

pub fn cookie_header(value: Option<String>) -> CookieHeader {
    AppendHeaders(value.map(|v| (header::SET_COOKIE, v)))
}
