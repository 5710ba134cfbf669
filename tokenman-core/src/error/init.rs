use displaydoc::Display;
use thiserror::Error;

/// Failures that can only happen during process construction, before any
/// request is served. All are fatal: the process exits rather than
/// serving traffic in a half-initialized state.
#[derive(Debug, Error, Display)]
pub enum InitError {
    /// failed to load configuration: {0}
    Config(#[from] config::ConfigError),
    /// configuration failed validation: {0}
    InvalidConfig(String),
    /// failed to open store at {path}: {source}
    StoreOpen {
        path: String,
        #[source]
        source: sqlx::Error,
    },
    /// failed to run store migrations: {0}
    Migration(#[source] sqlx::Error),
    /// failed to bind listener on {addr}: {source}
    Listen {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
