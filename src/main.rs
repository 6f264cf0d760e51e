//! parley bot server

use parley::api::{create_router, AppState};
use parley::bot::{Bot, BotDeps};
use parley::config::Config;
use parley::db::Database;
use parley::i18n::Catalog;
use parley::store::DatabaseStore;
use parley::transport::telegram::TelegramTransport;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();
    let Some(token) = config.bot_token.as_deref() else {
        return Err("PARLEY_BOT_TOKEN is not set".into());
    };

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;
    let store = Arc::new(DatabaseStore::new(db.clone()));

    let catalog = match &config.catalog_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading text catalog");
            Catalog::from_file(path)?
        }
        None => Catalog::builtin(),
    }
    .with_default_locale(config.locale.clone());

    let transport = Arc::new(TelegramTransport::new(&config.api_base, token)?);
    let bot = Arc::new(Bot::new(
        &config,
        BotDeps {
            transport,
            markers: store.clone(),
            sessions: store,
            localizer: Arc::new(catalog),
        },
    ));

    // Expired markers and sessions are invisible to reads; this only reclaims space
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            match db.purge_expired(chrono::Utc::now()) {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Purged expired rows"),
                Err(e) => tracing::warn!(error = %e, "Failed to purge expired rows"),
            }
        }
    });

    let app = create_router(AppState::new(bot.clone()));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("parley listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutting down, aborting open flows");
            bot.shutdown();
        })
        .await?;

    Ok(())
}
