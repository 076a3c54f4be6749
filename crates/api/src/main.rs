use std::net::SocketAddr;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};

use shelfline_api::app::{build_app, services};
use shelfline_infra::{Config, shutdown_signal};
use shelfline_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shelfline_observability::init(LogFormat::from_env());

    let config = Config::from_env().context("invalid configuration")?;
    let wiring = services::build_services(&config).await?;
    let app = build_app(wiring.services.clone(), &config.server);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.changed().await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => {
            result.context("server task panicked")?.context("server error")?;
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    let _ = stop_tx.send(true);
    let grace = config.server.shutdown_grace;
    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => result.context("server task panicked")?.context("server error")?,
        Err(_) => {
            warn!(?grace, "connections still open after grace period, aborting");
            server.abort();
        }
    }

    if let Some(consumer) = wiring.consumer {
        if let Err(err) = consumer.shutdown(config.consumer.shutdown_grace).await {
            error!(error = %err, "embedded consumer stopped with an error");
        }
    }

    info!("shutdown complete");
    Ok(())
}
