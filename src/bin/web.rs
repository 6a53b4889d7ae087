//! Ralph HTTP 服务
//!
//! 启动: cargo run --bin ralph-web --features web
//! 监听地址由 RALPH_ADDR 指定，默认 127.0.0.1:8080

use std::sync::Arc;

use anyhow::Context;
use ralph::config::load_config;
use ralph::integrations::http::create_router;
use ralph::{observability, SessionService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let service = SessionService::from_config(&cfg).context("Failed to build session service")?;
    let service = Arc::new(service);

    let purged = service.purge_expired().await.context("Failed to purge sessions")?;
    tracing::info!(purged, "session checkpoints ready");

    let addr = std::env::var("RALPH_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Ralph web listening on http://{}", addr);

    axum::serve(listener, create_router(service))
        .await
        .context("Server error")?;
    Ok(())
}
