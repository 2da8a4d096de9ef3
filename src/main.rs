use std::sync::Arc;

use campus_carpool::chat::ChatService;
use campus_carpool::config::ServerConfig;
use campus_carpool::dialogue::DialogueEngine;
use campus_carpool::dialogue::time::FormatTimeParser;
use campus_carpool::directions::{DirectionsProvider, GoogleDirections, NoDirections};
use campus_carpool::http::routes;
use campus_carpool::matching::MatchingWorkflow;
use campus_carpool::notify::NotificationDeriver;
use campus_carpool::session::SessionStore;
use campus_carpool::store::{MemoryRepository, Repository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env();

    eprintln!("🚗 Campus Carpool v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Listening on http://{}", config.bind_addr);
    eprintln!("   Start a session: GET /welcome");
    eprintln!("   Chat: POST /chat with your token in the Authorization header\n");

    let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());

    let directions: Arc<dyn DirectionsProvider> = match config.maps_api_key.clone() {
        Some(key) => Arc::new(GoogleDirections::new(key)),
        None => {
            tracing::warn!("CARPOOL_MAPS_API_KEY not set, address and route lookups disabled");
            Arc::new(NoDirections)
        }
    };

    let sessions = Arc::new(SessionStore::new());
    let engine = DialogueEngine::new(repo.clone(), Arc::new(FormatTimeParser::new()));
    let matching = MatchingWorkflow::new(repo.clone(), directions);
    let notifier = NotificationDeriver::new(repo.clone());
    let chat = Arc::new(ChatService::new(sessions, engine, matching, notifier));

    let app = routes(chat);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "server started");
    axum::serve(listener, app).await?;

    Ok(())
}
