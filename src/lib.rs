//! homestore library: bucket/object storage on top of a key-value server.
//!
//! Buckets and objects are laid out as plain keys (see [`schema`]) on a
//! [`backend::KvBackend`], normally Redis.  The [`engine`] sequences the
//! backend calls for each operation and [`server`] exposes them over HTTP.

pub mod backend;
pub mod config;
pub mod engine;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod schema;
pub mod server;

use crate::config::Config;
use crate::engine::ObjectStore;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Storage engine over the configured backend.
    pub store: ObjectStore,
}
