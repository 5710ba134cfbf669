//! The TokenMan request-processing core: the ordered middleware
//! pipeline, the two-tier deterministic-response cache, the resilient
//! upstream dispatch path, and the streaming accumulator. The
//! persistence layer's schema, the credential vault, the TOML
//! hot-reload watcher, and the CLI/daemon supervisor are external
//! collaborators this crate depends on through traits and a single
//! `sqlx`-backed reference implementation, not full subsystems it owns.

pub mod app_state;
pub mod circuit_breaker;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod middleware;
pub mod pipeline;
pub mod retry_engine;
pub mod router;
pub mod store;
pub mod telemetry;
pub mod types;

pub use app_state::AppState;
