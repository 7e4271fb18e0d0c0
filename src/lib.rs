//! # Uncertainty Session Shell
//!
//! HTTP shell of the variogram uncertainty application: page routing,
//! cookie-backed sessions, the consent and login flows, and the lifecycle of
//! the per-visitor database files the scientific chapters work against.
//!
//! ## Request Flow
//!
//! ```text
//! Browser cookie
//!     ↓
//! [IdentityStore]        → SessionInfo | none
//!     ↓
//! [SessionResolver]      → ACTIVE | AWAITING_CONSENT | AWAITING_LOGIN
//!     ↓ (ACTIVE only)
//! [DatabaseAllocator]    → absolute path of the private store
//!     ↓
//! [ChapterDispatcher]    → Render | diagnostic panel
//! ```
//!
//! ## Data Directory
//! ```text
//! data/
//!     ├── shared.db          shared store for visitors who declined
//!     ├── <key>.db           seed file per base dataset
//!     ├── a_<id>.db          anonymous private store, swept after 14 days
//!     └── u_<sha256>.db      store of a logged-in user, kept
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use skgstat_uncertainty::{protocol::{rest, Handler}, Config};
//!
//! let config = Config::load()?;
//! let http = config.http.clone();
//! let handler = std::sync::Arc::new(Handler::from_config(config)?);
//! rest::start_http_server(handler, &http).await?;
//! ```

// Configuration and errors
pub mod config;
pub mod error;

// Session and identity
pub mod clock;
pub mod identity_provider;
pub mod identity_store;
pub mod resolver;
pub mod session_info;

// Data stores
pub mod allocator;
pub mod base_data;
pub mod sweeper;

// Pages
pub mod chapters;

// HTTP surface
pub mod protocol;

pub use allocator::{validate_db_name, DatabaseAllocator, Deletion};
pub use base_data::{BaseDataCatalog, BaseDataEntry, BLANK_KEY};
pub use chapters::{
    Block, Chapter, ChapterDispatcher, Dispatch, HomePage, Page, PageContext, PageHandler, Render,
};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use identity_provider::{Credentials, IdentityProvider, ProviderLogin};
pub use identity_store::{generate_user_id, IdentityStore, IssuedToken};
pub use resolver::{
    ConsentDecision, LoginRequest, ResolverState, SessionContext, SessionResolver, Transition,
};
pub use session_info::{DbClass, SessionInfo};
pub use sweeper::{RetentionSweeper, SweepReport};
