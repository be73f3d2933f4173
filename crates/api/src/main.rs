use std::sync::Arc;

use anyhow::Context;

use rolegate_api::app::{self, services::AppServices};
use rolegate_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rolegate_observability::init();

    let config = ApiConfig::from_env().context("invalid configuration")?;

    app::catalog_mirror::verify(rolegate_auth::PermissionCatalog::global())
        .context("permission catalog mirror is out of date")?;

    let services = AppServices::from_config(&config)
        .await
        .context("failed to initialize role store")?;
    let app = app::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
