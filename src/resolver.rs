//! Session Resolver
//!
//! Decides, per request, whether a visitor has an active session or still
//! has to pass the consent dialog or the login form.
//!
//! ## States
//!
//! ```text
//!                 token ok (+ login if required)
//! NO_SESSION ─────────────────────────────────────────────► ACTIVE
//!     │  no/invalid token          token ok, login missing     ▲  ▲
//!     ▼                                   │                    │  │
//! AWAITING_CONSENT ── accept / decline ───┼────────────────────┘  │
//!     │ begin_login                       ▼                       │
//!     └──────────────────────────► AWAITING_LOGIN ── success ─────┘
//!                                     │ cancel → prior state
//! ```
//!
//! All mutable per-visitor state lives in an explicit [`SessionContext`]
//! handed in by reference; the resolver itself is shared and immutable.

use crate::allocator::DatabaseAllocator;
use crate::base_data::{is_blank, BaseDataCatalog};
use crate::config::SessionConfig;
use crate::error::{AppError, AppResult};
use crate::identity_provider::{Credentials, IdentityProvider};
use crate::identity_store::{generate_user_id, IdentityStore, IssuedToken};
use crate::session_info::{anonymous_db_name, user_db_name, SessionInfo};
use axum::http::HeaderMap;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// How often a colliding anonymous identifier is regenerated.
const MAX_ID_ATTEMPTS: usize = 16;

/// Resolver state of one visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolverState {
    #[default]
    NoSession,
    AwaitingConsent,
    AwaitingLogin,
    Active,
}

/// Explicit per-visitor session context.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    state: ResolverState,
    info: Option<SessionInfo>,
    prior: Option<(ResolverState, Option<SessionInfo>)>,
    values: BTreeMap<String, Value>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ResolverState {
        self.state
    }

    pub fn info(&self) -> Option<&SessionInfo> {
        self.info.as_ref()
    }

    /// Session info, only once the visitor is ACTIVE.
    pub fn active_info(&self) -> Option<&SessionInfo> {
        match self.state {
            ResolverState::Active => self.info.as_ref(),
            _ => None,
        }
    }

    /// Page-scoped value stored for this visitor.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set_value(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn values_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.values
    }

    /// Drop every piece of session-scoped state.
    pub fn reset(&mut self) {
        self.values.clear();
        self.prior = None;
        self.info = None;
        self.state = ResolverState::NoSession;
    }

    fn activate(&mut self, info: SessionInfo) {
        self.reset();
        self.info = Some(info);
        self.state = ResolverState::Active;
    }
}

/// Consent dialog submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsentDecision {
    /// Base dataset key from the catalog
    pub base_data: String,
    /// Identifier shown in the consent dialog; replaced when unusable
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub accept: bool,
    #[serde(default)]
    pub decline: bool,
}

/// Login form submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(flatten)]
    pub credentials: Credentials,
    /// Base dataset to seed the user's store with, if it does not exist yet
    #[serde(default)]
    pub base_data: Option<String>,
}

/// A completed consent or login: the new session and the token to persist.
#[derive(Debug, Clone)]
pub struct Transition {
    pub info: SessionInfo,
    pub token: IssuedToken,
}

/// Shared, immutable session resolver.
pub struct SessionResolver {
    store: Arc<IdentityStore>,
    allocator: DatabaseAllocator,
    catalog: Arc<BaseDataCatalog>,
    provider: Arc<dyn IdentityProvider>,
    config: SessionConfig,
}

impl SessionResolver {
    pub fn new(
        store: Arc<IdentityStore>,
        allocator: DatabaseAllocator,
        catalog: Arc<BaseDataCatalog>,
        provider: Arc<dyn IdentityProvider>,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            allocator,
            catalog,
            provider,
            config,
        }
    }

    pub fn store(&self) -> &IdentityStore {
        &self.store
    }

    pub fn allocator(&self) -> &DatabaseAllocator {
        &self.allocator
    }

    pub fn catalog(&self) -> &BaseDataCatalog {
        &self.catalog
    }

    /// Resolve the visitor from request headers.
    pub fn resolve(&self, ctx: &mut SessionContext, headers: &HeaderMap) -> ResolverState {
        if ctx.state != ResolverState::NoSession {
            return ctx.state;
        }
        let token = self.store.read(headers);
        self.resolve_with(ctx, token)
    }

    /// Resolve from an already-read token.
    pub fn resolve_with(&self, ctx: &mut SessionContext, token: Option<SessionInfo>) -> ResolverState {
        if ctx.state != ResolverState::NoSession {
            return ctx.state;
        }
        match token {
            Some(info) if info.did_login || !self.config.require_login => {
                ctx.info = Some(info);
                ctx.state = ResolverState::Active;
            }
            Some(info) => {
                ctx.info = Some(info);
                ctx.state = ResolverState::AwaitingLogin;
            }
            None => ctx.state = ResolverState::AwaitingConsent,
        }
        ctx.state
    }

    /// Apply the consent dialog.
    ///
    /// Returns `Ok(None)` while neither button was pressed. When both are,
    /// accepting wins.
    pub fn consent(
        &self,
        ctx: &mut SessionContext,
        decision: &ConsentDecision,
    ) -> AppResult<Option<Transition>> {
        if ctx.state != ResolverState::AwaitingConsent {
            return Err(AppError::InvalidState(format!(
                "consent is not expected in state {:?}",
                ctx.state
            )));
        }
        if !decision.accept && !decision.decline {
            return Ok(None);
        }
        if !self.catalog.contains(&decision.base_data) {
            return Err(AppError::UnknownBaseData(decision.base_data.clone()));
        }

        let data_path = self.allocator.data_dir().to_path_buf();
        let (info, ttl) = if decision.accept {
            let info = self.claim_anonymous_store(data_path, decision)?;
            (info, Duration::days(self.config.consent_ttl_days))
        } else {
            let info = SessionInfo::shared(data_path, self.allocator.shared_db_name());
            (info, Duration::days(self.config.decline_ttl_days))
        };

        let token = self.store.create(&info, ttl)?;
        tracing::info!(
            accepted = decision.accept,
            base = %decision.base_data,
            db_name = %info.db_name,
            "consent_recorded"
        );
        ctx.activate(info.clone());
        Ok(Some(Transition { info, token }))
    }

    /// Identifier to offer in the consent dialog.
    ///
    /// Only a suggestion: the store is claimed when consent is given, and a
    /// suggestion someone else claimed first is replaced then.
    pub fn preview_user_id(&self) -> AppResult<String> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let user_id = generate_user_id(self.config.user_id_length);
            let path = self.allocator.path_for(&anonymous_db_name(&user_id))?;
            if !path.exists() {
                return Ok(user_id);
            }
        }
        Err(AppError::InvalidState(
            "could not generate an unused identifier".to_string(),
        ))
    }

    /// Create the private store for an accepted consent.
    ///
    /// The previewed identifier is tried first when well formed. Seeding
    /// creates the store with `create_new`, so a name another session has
    /// already claimed fails with `StoreExists` and a fresh identifier is
    /// drawn.
    fn claim_anonymous_store(
        &self,
        data_path: PathBuf,
        decision: &ConsentDecision,
    ) -> AppResult<SessionInfo> {
        let can_upload = is_blank(&decision.base_data);
        let mut candidate = decision
            .user_id
            .as_deref()
            .filter(|id| self.is_well_formed_id(id))
            .map(str::to_string);

        for _ in 0..MAX_ID_ATTEMPTS {
            let user_id = candidate
                .take()
                .unwrap_or_else(|| generate_user_id(self.config.user_id_length));
            let info = SessionInfo::anonymous(data_path.clone(), &user_id, can_upload);
            match self
                .allocator
                .seed(&self.catalog, &decision.base_data, &info.db_name)
            {
                Ok(_) => return Ok(info),
                Err(AppError::StoreExists(_)) => {
                    tracing::debug!(db_name = %info.db_name, "anonymous_store_taken");
                }
                Err(e) => return Err(e),
            }
        }
        Err(AppError::InvalidState(
            "could not claim an unused identifier".to_string(),
        ))
    }

    fn is_well_formed_id(&self, user_id: &str) -> bool {
        let ok = user_id.len() == self.config.user_id_length
            && user_id.bytes().all(|b| b.is_ascii_alphabetic());
        if !ok {
            tracing::debug!("consent_user_id_rejected");
        }
        ok
    }

    /// Enter the login form from the consent dialog or an active session.
    pub fn begin_login(&self, ctx: &mut SessionContext) -> AppResult<()> {
        match ctx.state {
            ResolverState::AwaitingConsent | ResolverState::Active => {
                ctx.prior = Some((ctx.state, ctx.info.clone()));
                ctx.state = ResolverState::AwaitingLogin;
                Ok(())
            }
            ResolverState::AwaitingLogin => Ok(()),
            ResolverState::NoSession => Err(AppError::InvalidState(
                "session must be resolved before login".to_string(),
            )),
        }
    }

    /// Abandon the login form without touching the identity store.
    ///
    /// Returns to the state login was entered from; a login demanded by the
    /// configuration (no recorded prior state) falls back to `NoSession`.
    pub fn cancel_login(&self, ctx: &mut SessionContext) -> AppResult<ResolverState> {
        if ctx.state != ResolverState::AwaitingLogin {
            return Err(AppError::InvalidState(format!(
                "no login in progress (state {:?})",
                ctx.state
            )));
        }
        match ctx.prior.take() {
            Some((state, info)) => {
                ctx.state = state;
                ctx.info = info;
            }
            None => {
                ctx.info = None;
                ctx.state = ResolverState::NoSession;
            }
        }
        Ok(ctx.state)
    }

    /// Submit credentials to the identity provider.
    ///
    /// On failure the provider's message is returned and the context stays
    /// in `AwaitingLogin`.
    pub async fn login(
        &self,
        ctx: &mut SessionContext,
        request: &LoginRequest,
    ) -> AppResult<Transition> {
        if ctx.state != ResolverState::AwaitingLogin {
            return Err(AppError::InvalidState(format!(
                "login is not expected in state {:?}",
                ctx.state
            )));
        }
        if let Some(base) = &request.base_data {
            if !self.catalog.contains(base) {
                return Err(AppError::UnknownBaseData(base.clone()));
            }
        }

        let login = self.provider.sign_in(&request.credentials).await?;
        let username = login.username().ok_or_else(|| AppError::IdentityProvider {
            message: "Identity provider returned no usable account name".to_string(),
        })?;

        let info = SessionInfo {
            data_path: self.allocator.data_dir().to_path_buf(),
            db_name: user_db_name(&username),
            share: true,
            can_upload: true,
            did_login: true,
            name: login.display_name(),
            auth_entity: Some(login.info),
        };

        if let Some(base) = request.base_data.clone() {
            let allocator = self.allocator.clone();
            let catalog = Arc::clone(&self.catalog);
            let db_name = info.db_name.clone();
            tokio::task::spawn_blocking(move || allocator.seed_if_absent(&catalog, &base, &db_name))
                .await
                .map_err(|e| AppError::Task(e.to_string()))??;
        }

        let token = self
            .store
            .create(&info, Duration::days(self.config.login_ttl_days))?;
        tracing::info!(db_name = %info.db_name, "login_succeeded");
        ctx.activate(info.clone());
        Ok(Transition { info, token })
    }

    /// Forget the session: returns the `Set-Cookie` value revoking the token.
    pub fn logout(&self, ctx: &mut SessionContext) -> String {
        ctx.reset();
        self.store.delete()
    }
}
