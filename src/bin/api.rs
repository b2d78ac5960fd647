use multimodal_assistant_router::{
    api::{start_server, AppState},
    extract::PlainTextExtractor,
    generation::GeminiGenerator,
    router::IntentRouter,
    session::{SessionLocks, SessionService, SessionStore},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let gemini_api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| {
        eprintln!("GEMINI_API_KEY not set in .env; generation calls will fail");
        "mock_key".to_string()
    });

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    let session_ttl = Duration::from_secs(
        std::env::var("SESSION_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24 * 3600),
    );

    info!("Assistant Router - API Server");
    info!("Port: {}", api_port);

    // Create components
    let generator = Arc::new(GeminiGenerator::new(gemini_api_key));
    let router = Arc::new(IntentRouter::new(generator));
    let sessions = Arc::new(SessionService::from_env());
    let locks = SessionLocks::new();

    // Idle sessions are evicted explicitly; see SESSION_TTL_SECS
    {
        let sessions = Arc::clone(&sessions);
        let locks = locks.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;

                match sessions.evict_idle(session_ttl).await {
                    Ok(evicted) if evicted > 0 => {
                        info!(evicted, "Session sweep complete");
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Session sweep failed: {}", e),
                }

                locks.prune().await;
            }
        });
    }

    let state = AppState {
        router,
        sessions: sessions as Arc<dyn SessionStore>,
        locks,
        extractor: Arc::new(PlainTextExtractor),
    };

    info!("Router initialized");
    info!("Starting API server...");

    start_server(state, api_port).await?;

    Ok(())
}
