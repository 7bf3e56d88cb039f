//! Strata server binary.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use strata_config::Config;
use strata_server::{AppState, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load_default().context("loading configuration")?;
    let bind = format!("{}:{}", config.server.bind, config.server.port);

    let state = AppState::from_config(config)
        .map_err(|e| anyhow::anyhow!("wiring stores: {e:?}"))?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(%bind, "Strata server listening");
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
