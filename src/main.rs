use partner_dashboard::gate::AccessGate;
use partner_dashboard::metabase::MetabaseClient;
use partner_dashboard::tokens::TokenStore;
use partner_dashboard::{AppConfig, AppState, load_partners, router};
use std::{net::SocketAddr, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = AppConfig::from_env()?;
    let partners = load_partners(&config.partners_path).await?;
    info!(
        partners = partners.partners.len(),
        strategy = ?config.fetch_strategy,
        "loaded partner configuration"
    );

    let tokens = Arc::new(TokenStore::new(config.token_path.clone()));
    if let Err(err) = tokens.sweep().await {
        error!("failed to sweep expired tokens: {}", err.message);
    }

    let http = config.metabase.http_client()?;
    let state = AppState::new(
        AccessGate::new(config.secret.clone(), tokens),
        MetabaseClient::new(http, config.metabase.clone()),
        partners,
        config.fetch_strategy,
        config.utc_offset,
    );
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
