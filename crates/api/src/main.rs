use anyhow::Context;

use procura_infra::config::ProcurementConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    procura_observability::init();

    let config = ProcurementConfig::from_env().context("invalid configuration")?;
    let bind_addr = config.bind_addr.clone();

    let app = procura_api::app::build_app(config).context("failed to start background workers")?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
