use std::sync::Arc;
use tracing::info;

use profile_hunter::{config::Config, server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    let bind_addr = config.bind_addr.clone();
    info!("Starting profile-hunter");

    let state = Arc::new(AppState::from_config(config).await?);
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("profile-hunter listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
