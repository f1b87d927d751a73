use std::env;

use anyhow::Result;
use tabi_api::{build_app_with, Settings};
use tabi_observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("tabi_api");

    let bind = env::var("TABI_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let settings = Settings::from_env();
    let persistent = settings.database_url.is_some();

    let app = build_app_with(settings).await?;

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(bind = %bind, persistent, "tabi concierge api started");

    axum::serve(listener, app).await?;
    Ok(())
}
