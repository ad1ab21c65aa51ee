use std::sync::Arc;

use anyhow::Context;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use dealerdesk::config::Config;
use dealerdesk::notify::ResendNotifier;
use dealerdesk::store::SqliteStore;
use dealerdesk::{AppState, handlers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dealerdesk=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env();

    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("opening database {}", config.database_path))?;
    let notifier = ResendNotifier::new(config.resend_api_key.clone(), config.email_from.clone());

    let addr = config.addr();
    let state = AppState::new(Arc::new(store), Arc::new(notifier), config);
    let app = handlers::router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "dealerdesk listening");
    axum::serve(listener, app).await?;
    Ok(())
}
