//! Identity Store
//!
//! Persists a [`SessionInfo`] on the client as a signed, expiring cookie so
//! that any server process can recover the session without server-side
//! affinity.
//!
//! ## Token format
//!
//! ```text
//! base64url(json {"info": SessionInfo, "exp": unix-seconds}) "." base64url(HMAC-SHA256)
//! ```
//!
//! Reading is deliberately forgiving: a missing, expired, tampered or
//! garbled token reads as "no session" and sends the visitor back to the
//! consent page.

use crate::clock::SharedClock;
use crate::error::{AppError, AppResult};
use crate::session_info::SessionInfo;
use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Alphabet for generated anonymous identifiers.
const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generate a random printable identifier of `len` ASCII letters.
pub fn generate_user_id(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .filter_map(|_| ID_ALPHABET.choose(&mut rng).map(|b| char::from(*b)))
        .collect()
}

#[derive(Serialize, Deserialize)]
struct TokenPayload {
    info: SessionInfo,
    exp: i64,
}

/// A freshly signed session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs, reads and revokes session tokens.
pub struct IdentityStore {
    cookie_name: String,
    secret: Vec<u8>,
    secure: bool,
    clock: SharedClock,
}

impl IdentityStore {
    pub fn new(cookie_name: impl Into<String>, secret: &str, secure: bool, clock: SharedClock) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            secret: secret.as_bytes().to_vec(),
            secure,
            clock,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    fn mac(&self) -> AppResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::InvalidState(format!("token key rejected: {e}")))
    }

    /// Sign `info` into a token valid for `ttl`.
    pub fn create(&self, info: &SessionInfo, ttl: Duration) -> AppResult<IssuedToken> {
        let expires_at = self.clock.now() + ttl;
        let payload = TokenPayload {
            info: info.clone(),
            exp: expires_at.timestamp(),
        };
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload)?);

        let mut mac = self.mac()?;
        mac.update(body.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        tracing::debug!(db_name = %info.db_name, %expires_at, "session_token_issued");
        Ok(IssuedToken {
            value: format!("{body}.{signature}"),
            expires_at,
        })
    }

    /// Recover the session from request headers, if a valid token is present.
    pub fn read(&self, headers: &HeaderMap) -> Option<SessionInfo> {
        let value = self.cookie_value(headers)?;
        self.read_token(&value)
    }

    /// Verify and decode a raw token value.
    pub fn read_token(&self, token: &str) -> Option<SessionInfo> {
        let (body, signature) = token.split_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac().ok()?;
        mac.update(body.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            tracing::debug!("session_token_bad_signature");
            return None;
        }

        let raw = URL_SAFE_NO_PAD.decode(body).ok()?;
        let payload: TokenPayload = match serde_json::from_slice(&raw) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "session_token_malformed");
                return None;
            }
        };

        if payload.exp <= self.clock.now().timestamp() {
            tracing::debug!(exp = payload.exp, "session_token_expired");
            return None;
        }
        Some(payload.info)
    }

    fn cookie_value(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value.trim_matches('"').to_string())
    }

    /// `Set-Cookie` header value delivering `token` to the client.
    pub fn set_cookie(&self, token: &IssuedToken) -> String {
        let expires = token.expires_at.format("%a, %d %b %Y %H:%M:%S GMT");
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Expires={expires}",
            self.cookie_name, token.value
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` header value that makes the client drop its token.
    pub fn delete(&self) -> String {
        format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
            self.cookie_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use axum::http::HeaderValue;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn store_with_clock() -> (IdentityStore, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let store = IdentityStore::new("skg_opts", "test-secret", false, Arc::new(clock.clone()));
        (store, clock)
    }

    fn sample_info() -> SessionInfo {
        SessionInfo::anonymous(PathBuf::from("/srv/data"), "abcdef", false)
    }

    fn headers_with_cookie(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_generate_user_id_alphabet() {
        let id = generate_user_id(24);
        assert_eq!(id.len(), 24);
        assert!(id.chars().all(|c| c.is_ascii_alphabetic()));
    }

    #[test]
    fn test_generate_user_id_unique() {
        assert_ne!(generate_user_id(24), generate_user_id(24));
    }

    #[test]
    fn test_token_read_back() {
        let (store, _clock) = store_with_clock();
        let token = store.create(&sample_info(), Duration::days(14)).unwrap();
        assert_eq!(store.read_token(&token.value), Some(sample_info()));
    }

    #[test]
    fn test_read_from_cookie_header_among_others() {
        let (store, _clock) = store_with_clock();
        let token = store.create(&sample_info(), Duration::days(1)).unwrap();
        let headers = headers_with_cookie(&format!("theme=dark; skg_opts={}; lang=en", token.value));
        assert_eq!(store.read(&headers), Some(sample_info()));
    }

    #[test]
    fn test_missing_cookie_reads_as_absent() {
        let (store, _clock) = store_with_clock();
        assert!(store.read(&HeaderMap::new()).is_none());
        assert!(store.read(&headers_with_cookie("theme=dark")).is_none());
    }

    #[test]
    fn test_expired_token_reads_as_absent() {
        let (store, clock) = store_with_clock();
        let token = store.create(&sample_info(), Duration::days(1)).unwrap();
        clock.advance(Duration::days(1) + Duration::seconds(1));
        assert!(store.read_token(&token.value).is_none());
    }

    #[test]
    fn test_tampered_token_reads_as_absent() {
        let (store, _clock) = store_with_clock();
        let token = store.create(&sample_info(), Duration::days(1)).unwrap();

        let mut forged = sample_info();
        forged.db_name = "../../etc/passwd".to_string();
        let payload = TokenPayload {
            info: forged,
            exp: token.expires_at.timestamp(),
        };
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());
        let (_, signature) = token.value.split_once('.').unwrap();
        assert!(store.read_token(&format!("{body}.{signature}")).is_none());
    }

    #[test]
    fn test_foreign_secret_reads_as_absent() {
        let (store, _clock) = store_with_clock();
        let other = IdentityStore::new("skg_opts", "other-secret", false, Arc::new(ManualClock::new(Utc::now())));
        let token = other.create(&sample_info(), Duration::days(1)).unwrap();
        assert!(store.read_token(&token.value).is_none());
    }

    #[test]
    fn test_garbage_reads_as_absent() {
        let (store, _clock) = store_with_clock();
        for garbage in ["", ".", "abc", "abc.def", "%%%.%%%", "{\"db_name\":\"x\"}"] {
            assert!(store.read_token(garbage).is_none(), "accepted: {garbage}");
        }
    }

    #[test]
    fn test_set_cookie_attributes() {
        let (store, _clock) = store_with_clock();
        let token = store.create(&sample_info(), Duration::days(14)).unwrap();
        let cookie = store.set_cookie(&token);
        assert!(cookie.starts_with("skg_opts="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Expires="));
        assert!(cookie.ends_with("GMT"));
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn test_delete_cookie_expires_immediately() {
        let (store, _clock) = store_with_clock();
        let cookie = store.delete();
        assert!(cookie.starts_with("skg_opts=;"));
        assert!(cookie.contains("Max-Age=0"));
    }
}
