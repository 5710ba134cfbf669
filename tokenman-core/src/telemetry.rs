//! Logging setup (teacher's own telemetry crate wires the same
//! `tracing-subscriber` pieces, plus an OpenTelemetry exporter pipeline
//! this core does not carry — see DESIGN.md). The level filter is kept
//! behind a [`tracing_subscriber::reload::Handle`] so it can be changed
//! without tearing down and reinstalling the global subscriber.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, reload, util::SubscriberInitExt};

pub type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

/// Installs the global subscriber once per process. `default_level` seeds
/// the filter before any environment override is applied; the returned
/// handle lets [`set_level`] swap it later.
pub fn init(default_level: &str) -> ReloadHandle {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    std::panic::set_hook(Box::new(|info| {
        tracing::error!(panic = %info, "panicked outside a guarded pipeline stage");
    }));

    handle
}

/// Swaps the active level filter without restarting the subscriber, per
/// the ambient config-reload design note.
pub fn set_level(handle: &ReloadHandle, level: &str) -> Result<(), String> {
    let filter = EnvFilter::try_new(level).map_err(|err| err.to_string())?;
    handle.reload(filter).map_err(|err| err.to_string())
}
