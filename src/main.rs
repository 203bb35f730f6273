use anyhow::Result;
use energy_ledger::{api, collector, config, telemetry};
use config::Config;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cfg = Config::load()?;
    telemetry::init_tracing(cfg.log.format);

    let app_state = collector::AppState::new(cfg.clone()).await?;
    let app = api::router(app_state.clone(), &cfg);

    let addr = cfg.server.socket_addr()?;
    if cfg.server.host == "0.0.0.0" {
        warn!("server binding to 0.0.0.0; the API is reachable from the network");
    }
    info!(%addr, "starting energy ledger");

    let shutdown = CancellationToken::new();
    let collectors = collector::spawn_collectors(app_state, shutdown.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    for task in collectors {
        if let Err(e) = task.await {
            warn!(error = %e, "collector task failed");
        }
    }
    warn!("shutdown complete");
    Ok(())
}
