//! Chapter Dispatcher
//!
//! The application is a fixed sequence of chapters. Each chapter is served by
//! a [`PageHandler`] that receives the resolved session and its store path and
//! returns a [`Render`]. The scientific chapters live outside this crate and
//! are registered at startup; only the index page is built in.
//!
//! Dispatch is the single failure boundary for page code: handler errors and
//! panics become a diagnostic panel instead of taking the request down.

use crate::base_data::BaseDataCatalog;
use crate::config::Layout;
use crate::session_info::SessionInfo;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

/// Title of the panel shown when a chapter fails.
pub const DIAGNOSTIC_TITLE: &str = "Unallowed action";

const DIAGNOSTIC_TEXT: &str = "There was an error occurring. This might happen due to running \
chapters without finishing the previous ones. You can inspect the error below.";

/// Welcome text of the index page.
pub const WELCOME: &str = "This application is built on top of SciKit-GStat and GSTools. You can \
use prepared data-samples or upload your own data to propagate uncertainties into variogram \
estimations and then fit various models to the confidence interval of the uncertain experimental \
variogram. The last chapter gives you the opportunity to evaluate uncertainties resulting from the \
procedure.";

/// Pages of the application, in navigation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Chapter {
    Home,
    Data,
    Sample,
    Variogram,
    Model,
    Kriging,
    Compare,
}

impl Chapter {
    pub const ALL: [Chapter; 7] = [
        Chapter::Home,
        Chapter::Data,
        Chapter::Sample,
        Chapter::Variogram,
        Chapter::Model,
        Chapter::Kriging,
        Chapter::Compare,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Chapter::Home => "home",
            Chapter::Data => "data",
            Chapter::Sample => "sample",
            Chapter::Variogram => "variogram",
            Chapter::Model => "model",
            Chapter::Kriging => "kriging",
            Chapter::Compare => "compare",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Chapter::Home => "Home - Start Page",
            Chapter::Data => "Data Manager",
            Chapter::Sample => "Subsample existing data",
            Chapter::Variogram => "Variogram estimation",
            Chapter::Model => "Theoretical model fitting",
            Chapter::Kriging => "Model application - Kriging",
            Chapter::Compare => "Results - Compare Kriging",
        }
    }

    /// Parse a page key. Unknown keys yield `None`.
    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key)
    }

    /// Chapters offered to a session.
    ///
    /// Sessions that may upload manage their own data; all others can only
    /// subsample the datasets they were given.
    pub fn navigation(can_upload: bool) -> Vec<Chapter> {
        let hidden = if can_upload {
            Chapter::Sample
        } else {
            Chapter::Data
        };
        Self::ALL.into_iter().filter(|c| *c != hidden).collect()
    }
}

impl fmt::Display for Chapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One element of a rendered page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    Title { text: String },
    Markdown { text: String },
    Json { value: serde_json::Value },
    Exception { message: String, causes: Vec<String> },
}

/// Rendered page content.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Page {
    pub blocks: Vec<Block>,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn title(mut self, text: impl Into<String>) -> Self {
        self.blocks.push(Block::Title { text: text.into() });
        self
    }

    #[must_use]
    pub fn markdown(mut self, text: impl Into<String>) -> Self {
        self.blocks.push(Block::Markdown { text: text.into() });
        self
    }

    #[must_use]
    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.blocks.push(Block::Json { value });
        self
    }
}

/// Result of a page handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Render {
    /// The page ran to its end
    Complete { page: Page },
    /// The page stopped early on purpose
    Halted { page: Page, reason: String },
}

impl Render {
    pub fn page(&self) -> &Page {
        match self {
            Render::Complete { page } | Render::Halted { page, .. } => page,
        }
    }
}

/// Everything a page handler may look at.
pub struct PageContext<'a> {
    pub session: &'a SessionInfo,
    /// Private store of the session; may not exist yet
    pub store_path: &'a Path,
    pub catalog: &'a BaseDataCatalog,
    pub layout: Layout,
}

/// Renders one chapter.
pub trait PageHandler: Send + Sync {
    fn render(&self, ctx: &PageContext<'_>) -> anyhow::Result<Render>;
}

/// Built-in index page.
#[derive(Debug, Default)]
pub struct HomePage;

impl PageHandler for HomePage {
    fn render(&self, ctx: &PageContext<'_>) -> anyhow::Result<Render> {
        let page = Page::new()
            .title("Index page")
            .markdown(WELCOME)
            .json(serde_json::to_value(ctx.session)?);
        Ok(Render::Halted {
            page,
            reason: "index page".to_string(),
        })
    }
}

/// Outcome of dispatching a page request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Dispatch {
    /// No such chapter, or no handler registered for it
    Nothing,
    Rendered { chapter: String, render: Render },
    /// The handler failed; the panel describes why
    Diagnostic { chapter: String, page: Page },
}

/// Routes page names to registered handlers.
#[derive(Default)]
pub struct ChapterDispatcher {
    handlers: HashMap<Chapter, Arc<dyn PageHandler>>,
}

impl ChapterDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher with the built-in index page registered.
    pub fn with_builtin_pages() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(Chapter::Home, Arc::new(HomePage));
        dispatcher
    }

    /// Register (or replace) the handler of a chapter.
    pub fn register(&mut self, chapter: Chapter, handler: Arc<dyn PageHandler>) {
        self.handlers.insert(chapter, handler);
    }

    pub fn is_registered(&self, chapter: Chapter) -> bool {
        self.handlers.contains_key(&chapter)
    }

    /// Render page `name`, catching handler errors and panics.
    pub fn dispatch(&self, name: &str, ctx: &PageContext<'_>) -> Dispatch {
        let Some(chapter) = Chapter::parse(name) else {
            tracing::debug!(page = name, "unknown_page");
            return Dispatch::Nothing;
        };
        let Some(handler) = self.handlers.get(&chapter) else {
            tracing::debug!(%chapter, "page_not_registered");
            return Dispatch::Nothing;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler.render(ctx))) {
            Ok(Ok(render)) => Dispatch::Rendered {
                chapter: chapter.key().to_string(),
                render,
            },
            Ok(Err(e)) => {
                tracing::warn!(%chapter, error = %format!("{e:#}"), "page_failed");
                let causes = e.chain().skip(1).map(ToString::to_string).collect();
                Dispatch::Diagnostic {
                    chapter: chapter.key().to_string(),
                    page: diagnostic_panel(e.to_string(), causes),
                }
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(%chapter, %message, "page_panicked");
                Dispatch::Diagnostic {
                    chapter: chapter.key().to_string(),
                    page: diagnostic_panel(message, Vec::new()),
                }
            }
        }
    }
}

fn diagnostic_panel(message: String, causes: Vec<String>) -> Page {
    let mut page = Page::new().title(DIAGNOSTIC_TITLE).markdown(DIAGNOSTIC_TEXT);
    page.blocks.push(Block::Exception { message, causes });
    page
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "page handler panicked".to_string()
    }
}
