//! Session Shell Protocol
//!
//! Browser-facing HTTP surface.
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |                    Session Shell Protocol                   |
//! +-------------------------------------------------------------+
//! |  HTTP Endpoints:                                            |
//! |    - /health: health check                                  |
//! |    - /session, /consent, /login*, /logout: session flows    |
//! |    - /session/data: delete the private store                |
//! |    - /navigation, /pages/:name: chapter dispatch            |
//! +-------------------------------------------------------------+
//! |  Wire Format: JSON envelope { success, data?, error? }      |
//! |  Session: signed cookie                                      |
//! +-------------------------------------------------------------+
//! ```
//!
//! # Module Structure
//!
//! - `handler` - Application state implementing the flows
//! - `rest` - REST API handlers and routing

pub mod handler;
pub mod rest;

// Re-export handler
pub use handler::Handler;

// Protocol Constants
/// Default HTTP server port
pub const DEFAULT_PORT: u16 = 8501;
