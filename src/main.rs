use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use finaice_bridge::{api, config::Config, oauth, powens, store, sync, AppState, SharedState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "finaice_bridge=info".into()),
        )
        .init();

    // Load config — missing Powens credentials are fatal here.
    let config = Config::from_env()?;
    info!("finaice-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}:{} ({})", config.host, config.port, config.environment);

    // Initialize components
    let store = store::Store::new(&config.database_url).await?;
    store.migrate().await?;
    info!("Database connected and migrated ✓");

    let powens = powens::PowensClient::new(&config)?;
    let sync = sync::SyncEngine::new(store.clone(), powens.clone());
    let broker = oauth::TokenBroker::new(
        store.clone(),
        powens.clone(),
        sync.clone(),
        &config.powens_auth_url,
        &config.powens_client_id,
        &config.powens_redirect_uri,
    );

    if config.powens_webhook_secret.is_none() {
        tracing::warn!("POWENS_WEBHOOK_SECRET not set — webhook signatures will not be verified");
    }

    // Build shared state
    let state: SharedState = Arc::new(AppState {
        config: config.clone(),
        store,
        powens,
        broker,
        sync,
    });

    // Start expired-state sweeper
    let sweeper_state = state.clone();
    tokio::spawn(async move {
        store::state_sweeper(sweeper_state).await;
    });

    // Build router
    let app = api::router(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server ready ✓");
    axum::serve(listener, app).await?;

    Ok(())
}
