//! Control API server for servo-driven railroad points.
//!
//! This crate provides an Axum HTTP server that exposes a point
//! collection over REST:
//!
//! - **Reads** of the whole collection, single points, server info and
//!   the list of stored backups
//! - **Point commands** from a fixed allow-list (`enable`, `moveleft`,
//!   `setspeed`, ...), with short aliases such as `left` and `speed`
//! - **Collection management**: adding and removing points, writing and
//!   restoring backups
//!
//! Every request must present the shared secret as HTTP basic
//! authentication. Every successful mutation is written through to the
//! database file before the response is sent.

pub mod auth;
pub mod command;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::AppState;
