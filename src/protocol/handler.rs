//! Handler for the session shell
//!
//! Process-wide application state shared by all REST handlers: the identity
//! store, the resolver and allocator, the base data catalog, the retention
//! sweeper and the chapter dispatcher. Every per-visitor decision is made on a
//! fresh [`SessionContext`] resolved from the request's own cookie.

use crate::allocator::{DatabaseAllocator, Deletion};
use crate::base_data::BaseDataCatalog;
use crate::chapters::{Chapter, ChapterDispatcher, Dispatch, PageContext};
use crate::clock::{system_clock, SharedClock};
use crate::error::{AppError, AppResult};
use crate::identity_provider::{DisabledProvider, HttpIdentityProvider, IdentityProvider};
use crate::identity_store::IdentityStore;
use crate::resolver::{
    ConsentDecision, LoginRequest, ResolverState, SessionContext, SessionResolver, Transition,
};
use crate::sweeper::RetentionSweeper;
use crate::Config;
use axum::http::HeaderMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

const CONSENT_TEXT: &str = "This application stores a randomly generated string into your browser's \
cookies. This enables the application to identify your browser and load the correct data from the \
database. Without this cookie, the application does not work, and you need to leave this website.
The id generated for you is: `{user_id}`.

Furthermore, you can accept or decline the sharing of anonymous usage statistics and the storage of \
a personalized database connection. This is optional, but allows custom data upload. Otherwise, you \
can only use the shared database version, which will be reset frequently.
Personal database copies are persisted for {retention_days} days without login.";

/// Thread-safe application state for concurrent API calls.
pub struct Handler {
    config: Config,
    resolver: SessionResolver,
    sweeper: Arc<RetentionSweeper>,
    dispatcher: ChapterDispatcher,
    start_time: Instant,
    page_count: AtomicU64,
}

impl Handler {
    /// Assemble a handler from explicit collaborators.
    ///
    /// A relative data directory is made absolute against the working
    /// directory, so resolved stores and session tokens carry absolute paths.
    pub fn new(
        mut config: Config,
        catalog: BaseDataCatalog,
        provider: Arc<dyn IdentityProvider>,
        dispatcher: ChapterDispatcher,
        clock: SharedClock,
    ) -> Self {
        if config.storage.data_dir.is_relative() {
            match std::path::absolute(&config.storage.data_dir) {
                Ok(dir) => config.storage.data_dir = dir,
                Err(e) => tracing::warn!(
                    data_dir = %config.storage.data_dir.display(),
                    error = %e,
                    "data_dir_not_absolute"
                ),
            }
        }
        let storage = &config.storage;
        let session = &config.session;
        let store = Arc::new(IdentityStore::new(
            session.cookie_name.clone(),
            &session.secret,
            session.secure_cookie,
            Arc::clone(&clock),
        ));
        let allocator = DatabaseAllocator::new(&storage.data_dir, storage.shared_db_name.clone());
        let sweeper = Arc::new(RetentionSweeper::new(
            &storage.data_dir,
            storage.shared_db_name.clone(),
            session.retention_days,
            clock,
        ));
        let resolver = SessionResolver::new(
            store,
            allocator,
            Arc::new(catalog),
            provider,
            session.clone(),
        );

        Self {
            config,
            resolver,
            sweeper,
            dispatcher,
            start_time: Instant::now(),
            page_count: AtomicU64::new(0),
        }
    }

    /// Create a new handler from configuration.
    ///
    /// Creates the data directory, loads the base data catalog and checks
    /// that every seed file is in place.
    pub fn from_config(mut config: Config) -> AppResult<Self> {
        std::fs::create_dir_all(&config.storage.data_dir)?;
        config.storage.data_dir = std::fs::canonicalize(&config.storage.data_dir)?;
        let catalog = BaseDataCatalog::load(&config.storage.base_data_file)?;
        catalog.validate_seed_files(&config.storage.data_dir)?;

        let provider: Arc<dyn IdentityProvider> = if config.identity.enabled {
            Arc::new(HttpIdentityProvider::new(config.identity.clone())?)
        } else {
            Arc::new(DisabledProvider)
        };

        Ok(Self::new(
            config,
            catalog,
            provider,
            ChapterDispatcher::with_builtin_pages(),
            system_clock(),
        ))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &SessionResolver {
        &self.resolver
    }

    pub fn catalog(&self) -> &BaseDataCatalog {
        self.resolver.catalog()
    }

    pub fn sweeper(&self) -> &Arc<RetentionSweeper> {
        &self.sweeper
    }

    /// Get uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get total pages dispatched.
    pub fn total_pages(&self) -> u64 {
        self.page_count.load(Ordering::Relaxed)
    }

    /// Launch the once-per-process retention sweep, if not done yet.
    pub fn start_sweep(&self) {
        if self.sweeper.spawn_once().is_some() {
            tracing::info!(
                data_dir = %self.config.storage.data_dir.display(),
                "retention_sweep_started"
            );
        }
    }

    /// Resolve the visitor behind `headers`.
    pub fn resolve(&self, headers: &HeaderMap) -> SessionContext {
        let mut ctx = SessionContext::new();
        self.resolver.resolve(&mut ctx, headers);
        ctx
    }

    /// Consent dialog text for a previewed identifier.
    pub fn consent_text(&self, user_id: &str) -> String {
        CONSENT_TEXT
            .replace("{user_id}", user_id)
            .replace("{retention_days}", &self.config.session.retention_days.to_string())
    }

    /// Apply a consent decision. Store seeding runs on a blocking worker.
    pub async fn consent(
        self: &Arc<Self>,
        headers: &HeaderMap,
        decision: ConsentDecision,
    ) -> AppResult<(SessionContext, Option<Transition>)> {
        let mut ctx = self.resolve(headers);
        let handler = Arc::clone(self);
        tokio::task::spawn_blocking(move || -> AppResult<(SessionContext, Option<Transition>)> {
            let transition = handler.resolver.consent(&mut ctx, &decision)?;
            Ok((ctx, transition))
        })
        .await
        .map_err(|e| AppError::Task(e.to_string()))?
    }

    /// Enter the login form.
    pub fn begin_login(&self, headers: &HeaderMap) -> AppResult<SessionContext> {
        let mut ctx = self.resolve(headers);
        self.resolver.begin_login(&mut ctx)?;
        Ok(ctx)
    }

    /// Submit credentials.
    pub async fn login(
        &self,
        headers: &HeaderMap,
        request: &LoginRequest,
    ) -> AppResult<(SessionContext, Transition)> {
        let mut ctx = self.begin_login(headers)?;
        let transition = self.resolver.login(&mut ctx, request).await?;
        Ok((ctx, transition))
    }

    /// Leave the login form without changing the stored session.
    pub fn cancel_login(&self, headers: &HeaderMap) -> AppResult<SessionContext> {
        let mut ctx = self.begin_login(headers)?;
        self.resolver.cancel_login(&mut ctx)?;
        Ok(ctx)
    }

    /// Forget the session. Returns the revoking `Set-Cookie` value.
    pub fn logout(&self, headers: &HeaderMap) -> String {
        let mut ctx = self.resolve(headers);
        self.resolver.logout(&mut ctx)
    }

    /// Delete the visitor's private store.
    ///
    /// On success the revoking `Set-Cookie` value is returned as well; on
    /// failure the token stays so the user can retry.
    pub async fn delete_data(
        self: &Arc<Self>,
        headers: &HeaderMap,
    ) -> AppResult<(Deletion, String)> {
        let mut ctx = self.resolve(headers);
        let info = ctx
            .active_info()
            .cloned()
            .ok_or_else(|| AppError::InvalidState("no active session".to_string()))?;

        let handler = Arc::clone(self);
        let deletion =
            tokio::task::spawn_blocking(move || handler.resolver.allocator().delete_private(&info))
                .await
                .map_err(|e| AppError::Task(e.to_string()))??;

        Ok((deletion, self.resolver.logout(&mut ctx)))
    }

    /// Chapters offered to a session.
    pub fn navigation(&self, ctx: &SessionContext) -> Vec<Chapter> {
        let can_upload = ctx.active_info().is_some_and(|info| info.can_upload);
        Chapter::navigation(can_upload)
    }

    /// Dispatch page `name` for an ACTIVE session.
    ///
    /// Returns the resolver state instead when the visitor still has to
    /// consent or log in; no page code runs in that case.
    pub async fn page(
        self: &Arc<Self>,
        headers: &HeaderMap,
        name: String,
    ) -> AppResult<Result<Dispatch, ResolverState>> {
        self.start_sweep();
        let ctx = self.resolve(headers);
        let Some(info) = ctx.active_info().cloned() else {
            return Ok(Err(ctx.state()));
        };
        let store_path = self.resolver.allocator().resolve(&info)?;
        self.page_count.fetch_add(1, Ordering::Relaxed);

        let handler = Arc::clone(self);
        let dispatch = tokio::task::spawn_blocking(move || {
            let page_ctx = PageContext {
                session: &info,
                store_path: &store_path,
                catalog: handler.catalog(),
                layout: handler.config.http.layout,
            };
            handler.dispatcher.dispatch(&name, &page_ctx)
        })
        .await
        .map_err(|e| AppError::Task(e.to_string()))?;
        Ok(Ok(dispatch))
    }
}
