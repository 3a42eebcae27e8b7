//! punchclockd - the punchclock HTTP server binary.
//!
//! Boots the application context, starts the outbox worker, and serves
//! the timeclock API until interrupted.

use anyhow::{anyhow, Context as _};
use punchclock_api::{router, AppContext};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = punchclock_infra::config::load_or_default();
    let bind_addr = config.server.bind_addr.clone();
    let reporting_enabled = config.reporting.enabled;

    let ctx = AppContext::new(config).context("failed to initialise application context")?;

    let mut worker = ctx.build_outbox_worker()?;
    if reporting_enabled {
        worker.start().map_err(|err| anyhow!("failed to start outbox worker: {err}"))?;
    } else {
        info!("reporting disabled, outbox worker not started");
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "punchclock api listening");

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if worker.is_running() {
        if let Err(err) = worker.stop().await {
            tracing::warn!(error = %err, "outbox worker did not stop cleanly");
        }
    }

    info!("punchclock api stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
