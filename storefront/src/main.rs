use storefront::api;
use storefront::app_state::AppState;
use storefront::config::{self, Config};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Search the current directory and ancestors so running from `storefront/`
    // still picks up the repo-root `.env`.
    config::load_env_file();
    let config = Config::from_env()?;

    tracing::info!(
        port = config.port,
        storefront_api = %config.storefront_api_url,
        network_debug = config.network_debug.enabled,
        poll_ms = config.network_debug.poll_interval.as_millis() as u64,
        batch_limit = config.network_debug.batch_limit,
        capacity = config.event_store_capacity,
        "Starting storefront server"
    );
    if config.network_debug.enabled {
        tracing::warn!("Network debug relay is enabled; do not expose this server publicly");
    }

    let cors = api::cors_layer(&config);
    let port = config.port;

    let app_state = AppState::spawn(config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to spawn event store: {e}"))?;

    let app = api::app(api::ApiState {
        app_state: app_state.clone(),
    })
    .layer(TraceLayer::new_for_http())
    .layer(cors);

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "Listening");

    api::serve(listener, app, app_state, shutdown_signal()).await?;

    tracing::info!("Storefront server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
