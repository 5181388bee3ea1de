//! HTTP surface of the socialfeed API.
//!
//! Wires [`socialfeed_cache`] into axum: rate-limit and token-revocation
//! middleware in front of the handlers, cached reads, and writes that
//! invalidate after they commit.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod server;
pub mod store;

pub use config::AppConfig;
pub use error::ApiError;
pub use server::{AppState, ServerBuilder, SocialfeedServer, build_app, build_state};
