//! HTTP server: composition root, router, and lifecycle.

pub mod auth;
pub mod context;
pub mod error;
pub mod router;
pub mod routes_admin;
pub mod routes_auth;
pub mod routes_library;
pub mod routes_metadata;
pub mod routes_sources;
pub mod routes_stream;
pub mod routes_subtitles;
pub mod routes_watch;

use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;

use streambox_core::config::Config;
use streambox_core::{Error, Result};

pub use context::AppContext;

/// Start the streambox server: initialize the database, build the context,
/// spawn cache maintenance, and serve HTTP until a shutdown signal.
pub async fn start(config: Config) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    // Database: migrations run here, before anything else. A failure
    // aborts the boot.
    let db_path = config.database.path.clone();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = streambox_db::pool::init_pool(&db_path.to_string_lossy())?;
    tracing::info!("Database ready at {}", db_path.display());

    let ctx = AppContext::build(config, db);
    ctx.cache.ensure_root()?;

    let cancel = CancellationToken::new();

    // Periodic cache maintenance.
    let maintenance = tokio::spawn(
        ctx.cache
            .clone()
            .maintenance_loop(cancel.child_token()),
    );

    let addr: SocketAddr = format!("{}:{}", ctx.config.server.host, ctx.config.server.port)
        .parse()
        .map_err(|e| Error::Internal(format!("invalid listen address: {e}")))?;

    let app = router::build_router(ctx);

    tracing::info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("failed to bind {addr}: {e}")))?;

    let shutdown_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_cancel))
        .await
        .map_err(|e| Error::Internal(format!("server error: {e}")))?;

    cancel.cancel();
    let _ = maintenance.await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Resolve when SIGINT or SIGTERM arrives (or the token trips).
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
