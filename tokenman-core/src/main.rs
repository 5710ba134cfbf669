use std::path::PathBuf;

use clap::Parser;
use tokenman_core::{app_state::AppState, config::Config, error::InitError, handler, middleware::cache::CacheMiddleware};
use tracing::info;

#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[derive(Debug, Parser)]
#[command(version, about = "A local reverse proxy that caches, compresses, and polices spend for LLM HTTP APIs.")]
struct Args {
    /// Path to a TOML config file. Values here are overridden by
    /// `TOKENMAN__`-prefixed environment variables.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Raise the default log level to debug.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = match Config::try_read(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    let default_level = if args.verbose { "debug,tokenman_core=trace" } else { "info" };
    let log_level_handle = tokenman_core::telemetry::init(default_level);

    info!(listen_addr = %config.server.listen_addr, "starting tokenman");

    let state = AppState::new(config, Some(log_level_handle)).await?;
    run(state).await
}

async fn run(state: AppState) -> Result<(), InitError> {
    let listen_addr = state.config().server.listen_addr.clone();
    let graceful_shutdown_timeout = state.config().server.graceful_shutdown_timeout;
    let purge_interval = state.config().cache.purge_interval;

    let purger = CacheMiddleware::spawn_purger(
        state.0.cache_store.clone(),
        purge_interval,
        state.0.purger_cancellation.clone(),
    );

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .map_err(|source| InitError::Listen {
            addr: listen_addr.clone(),
            source,
        })?;
    info!(addr = %listen_addr, "listening");

    let app = handler::router(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|source| InitError::Listen {
            addr: listen_addr,
            source,
        })?;

    info!(timeout = ?graceful_shutdown_timeout, "shutting down, draining in-flight requests");
    tokio::time::sleep(graceful_shutdown_timeout.min(std::time::Duration::from_secs(5))).await;
    state.0.purger_cancellation.cancel();
    let _ = purger.await;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
