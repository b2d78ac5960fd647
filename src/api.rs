//! REST API server for the assistant router
//!
//! Maps an incoming request (query text, optional file, optional session id)
//! onto the router and persists the resulting turn pair back into the
//! session store. Per-session access is serialized across
//! snapshot → run → append.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use uuid::Uuid;

use crate::error::RouterError;
use crate::extract::TextExtractor;
use crate::models::ConversationTurn;
use crate::router::IntentRouter;
use crate::session::{SessionLocks, SessionStore};

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<IntentRouter>,
    pub sessions: Arc<dyn SessionStore>,
    pub locks: SessionLocks,
    pub extractor: Arc<dyn TextExtractor>,
}

/// =============================
/// Helpers: Session Id Resolution
/// =============================

fn stable_uuid_from_string(input: &str) -> Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

/// Clients may send any opaque session string; non-UUID values map to a
/// stable UUID so the same client string always lands on the same session.
fn resolve_session_id(value: Option<&str>) -> Uuid {
    match value {
        Some(v) if !v.trim().is_empty() => {
            Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v))
        }
        _ => Uuid::new_v4(),
    }
}

fn status_for(error: &RouterError) -> StatusCode {
    match error {
        RouterError::ClassificationError(_) | RouterError::GenerationError(_) => {
            StatusCode::BAD_GATEWAY
        }
        RouterError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Send Endpoint
/// =============================

struct SendRequest {
    query: String,
    session_id: Option<String>,
    file: Option<(String, Vec<u8>)>,
}

async fn parse_multipart(mut multipart: Multipart) -> Result<SendRequest, String> {
    let mut query = String::new();
    let mut session_id = None;
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Malformed multipart body: {}", e))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "query" => {
                query = field
                    .text()
                    .await
                    .map_err(|e| format!("Unreadable query field: {}", e))?;
            }
            "session_id" => {
                session_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| format!("Unreadable session_id field: {}", e))?,
                );
            }
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| format!("Unreadable file field: {}", e))?;
                file = Some((file_name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    Ok(SendRequest {
        query,
        session_id,
        file,
    })
}

async fn send_message(
    State(state): State<AppState>,
    multipart: Multipart,
) -> (StatusCode, Json<ApiResponse>) {
    let request = match parse_multipart(multipart).await {
        Ok(request) => request,
        Err(message) => {
            return (StatusCode::BAD_REQUEST, Json(ApiResponse::error(message)));
        }
    };

    let extracted_text = match &request.file {
        Some((file_name, bytes)) => {
            info!(%file_name, size = bytes.len(), "Received file upload");
            state.extractor.extract(file_name, bytes).await
        }
        None => String::new(),
    };

    let session_id = resolve_session_id(request.session_id.as_deref());
    info!(%session_id, query = %request.query, "Received send request");

    // One in-flight invocation per session; held across snapshot → run →
    // append so concurrent requests cannot interleave history.
    let _guard = state.locks.acquire(session_id).await;

    let mut user_content = request.query.clone();
    if !extracted_text.is_empty() {
        user_content.push_str("\nUser provided:\n");
        user_content.push_str(&extracted_text);
    }

    if let Err(e) = state
        .sessions
        .append(session_id, ConversationTurn::user(user_content))
        .await
    {
        return (
            status_for(&e),
            Json(ApiResponse::error(format!("Session store failed: {}", e))),
        );
    }

    let history = match state.sessions.history(session_id).await {
        Ok(history) => history,
        Err(e) => {
            return (
                status_for(&e),
                Json(ApiResponse::error(format!("Session store failed: {}", e))),
            );
        }
    };

    match state
        .router
        .run(&request.query, history, &extracted_text)
        .await
    {
        Ok(outcome) => {
            if let Err(e) = state
                .sessions
                .append(
                    session_id,
                    ConversationTurn::assistant(outcome.final_response.clone()),
                )
                .await
            {
                return (
                    status_for(&e),
                    Json(ApiResponse::error(format!("Session store failed: {}", e))),
                );
            }

            (
                StatusCode::OK,
                Json(ApiResponse::success(serde_json::json!({
                    "session_id": session_id,
                    "response": outcome.final_response,
                    "intent": outcome.intent,
                }))),
            )
        }
        Err(e) => (
            status_for(&e),
            Json(ApiResponse::error(format!("Routing failed: {}", e))),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/send", post(send_message))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: AppState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
