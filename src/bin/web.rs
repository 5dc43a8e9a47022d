//! Docent HTTP 服务
//!
//! 启动: cargo run --bin docent-web --features web
//! 监听地址取 web.bind，可用 DOCENT__WEB__BIND 覆盖

use std::sync::Arc;

use anyhow::Context;
use docent::config::load_config;
use docent::{observability, web, AssistantBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let bind = cfg.web.bind.clone();
    let assistant = AssistantBuilder::new(cfg)
        .build()
        .await
        .context("Failed to build assistant")?;
    let app = web::router(Arc::new(assistant));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!("Docent API: http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}
