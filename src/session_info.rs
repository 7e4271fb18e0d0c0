//! Session Information
//!
//! The client-held description of who a browser is and which data store it
//! works against. Everything the shell knows about a visitor between
//! requests lives in a [`SessionInfo`], serialized into the signed session
//! token.
//!
//! ## Store naming
//!
//! ```text
//! shared.db            declined consent, shared by everyone, never deleted
//! a_<random id>.db     anonymous private copy, deleted after the retention window
//! u_<sha256(user)>.db  copy owned by a logged-in user, kept until explicitly deleted
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Filename prefix of anonymous private stores.
pub const ANONYMOUS_PREFIX: &str = "a_";

/// Filename prefix of user-owned private stores.
pub const USER_PREFIX: &str = "u_";

/// Extension shared by every data store.
pub const DB_EXTENSION: &str = ".db";

/// Provenance class of a data store, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbClass {
    /// The configured shared store
    Shared,
    /// Private store keyed by a generated identifier
    Anonymous,
    /// Private store keyed by an authenticated username
    User,
    /// Anything else
    Unknown,
}

impl DbClass {
    /// Classify `db_name` against the configured shared store name.
    pub fn of(db_name: &str, shared_db_name: &str) -> Self {
        if db_name == shared_db_name {
            DbClass::Shared
        } else if is_private_name(db_name, ANONYMOUS_PREFIX) {
            DbClass::Anonymous
        } else if is_private_name(db_name, USER_PREFIX) {
            DbClass::User
        } else {
            DbClass::Unknown
        }
    }

    /// Whether the retention sweeper may reclaim stores of this class.
    pub fn is_retained_temporarily(self) -> bool {
        self == DbClass::Anonymous
    }

    /// Whether a user may explicitly delete stores of this class.
    pub fn is_user_deletable(self) -> bool {
        matches!(self, DbClass::Anonymous | DbClass::User)
    }
}

impl fmt::Display for DbClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbClass::Shared => write!(f, "shared"),
            DbClass::Anonymous => write!(f, "anonymous"),
            DbClass::User => write!(f, "user"),
            DbClass::Unknown => write!(f, "unknown"),
        }
    }
}

fn is_private_name(db_name: &str, prefix: &str) -> bool {
    db_name
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(DB_EXTENSION))
        .is_some_and(|key| !key.is_empty())
}

/// Store name for an anonymous identifier.
pub fn anonymous_db_name(user_id: &str) -> String {
    format!("{ANONYMOUS_PREFIX}{user_id}{DB_EXTENSION}")
}

/// Store name for an authenticated username.
///
/// The stem is the SHA-256 digest of the username, so distinct accounts
/// never share a store and any provider-supplied name maps to a plain file
/// name.
pub fn user_db_name(username: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    format!("{USER_PREFIX}{:x}{DB_EXTENSION}", hasher.finalize())
}

/// Per-visitor session description carried in the session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Directory holding the store
    pub data_path: PathBuf,
    /// Store file name inside `data_path`
    pub db_name: String,
    /// Visitor agreed to a private, persisted store
    pub share: bool,
    /// Visitor may upload own datasets
    pub can_upload: bool,
    #[serde(default)]
    pub did_login: bool,
    /// Profile returned by the identity provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_entity: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl SessionInfo {
    /// Session bound to an anonymous private store.
    pub fn anonymous(data_path: PathBuf, user_id: &str, can_upload: bool) -> Self {
        Self {
            data_path,
            db_name: anonymous_db_name(user_id),
            share: true,
            can_upload,
            did_login: false,
            auth_entity: None,
            name: None,
        }
    }

    /// Session bound to the shared store; uploads are never allowed.
    pub fn shared(data_path: PathBuf, shared_db_name: &str) -> Self {
        Self {
            data_path,
            db_name: shared_db_name.to_string(),
            share: false,
            can_upload: false,
            did_login: false,
            auth_entity: None,
            name: None,
        }
    }

    pub fn db_class(&self, shared_db_name: &str) -> DbClass {
        DbClass::of(&self.db_name, shared_db_name)
    }
}
