use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use whiteboard_server::{
    config::Config,
    routes,
    state::Gateway,
    store::SqliteCommandLog,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config::from_env()?;
    let log = SqliteCommandLog::connect(&cfg.database_url)
        .await
        .with_context(|| format!("opening command log at {}", cfg.database_url))?;
    let gateway = Arc::new(Gateway::new(Arc::new(log), cfg.channel_capacity));

    let app = routes::app(gateway, cfg.static_dir.clone(), cfg.body_limit);

    let listener = tokio::net::TcpListener::bind(cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    info!(addr = %cfg.bind_addr, "whiteboard server listening");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
