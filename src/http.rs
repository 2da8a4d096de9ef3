//! HTTP transport — thin axum layer over the chat service.
//!
//! Mirrors the chat's tone even for transport errors: every response body is
//! a `{"message": ...}` the client can show verbatim.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::debug;

use crate::chat::ChatService;
use crate::error::ChatError;

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
}

/// Build the router.
pub fn routes(chat: Arc<ChatService>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/welcome", get(welcome))
        .route("/chat", post(chat_turn))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { chat })
}

#[derive(Serialize)]
struct MessageBody {
    message: String,
}

#[derive(Serialize)]
struct WelcomeBody {
    token: String,
    message: String,
}

#[derive(Deserialize)]
struct TurnBody {
    message: String,
}

async fn root() -> impl IntoResponse {
    Json(MessageBody {
        message: "Please use the route '/welcome' to start a session.".into(),
    })
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "campus-carpool",
    }))
}

/// StartSession: allocate a token and greet.
async fn welcome(State(state): State<AppState>) -> impl IntoResponse {
    let (token, message) = state.chat.start_session().await;
    Json(WelcomeBody { token, message })
}

/// HandleTurn: one chat message in, one reply out.
async fn chat_turn(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<TurnBody>, JsonRejection>,
) -> Response {
    let Some(token) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
    else {
        return error_response(&ChatError::Unauthorized(
            "I'm sorry, but you don't seem to be logged in. Please log in and try again.".into(),
        ));
    };

    let Ok(Json(TurnBody { message })) = body else {
        return (
            StatusCode::BAD_REQUEST,
            Json(MessageBody {
                message: "I could not understand what you said because it wasn't \
                          written in a JSON format!"
                    .into(),
            }),
        )
            .into_response();
    };

    match state.chat.handle_turn(token, &message).await {
        Ok(reply) => Json(MessageBody { message: reply }).into_response(),
        Err(err) => {
            debug!(kind = err.kind(), error = %err, "turn failed");
            error_response(&err)
        }
    }
}

/// One chat-style message plus a status classification per error.
fn error_response(err: &ChatError) -> Response {
    let status = match err {
        ChatError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ChatError::Conflict(_) => StatusCode::CONFLICT,
        ChatError::NotFound(_) => StatusCode::NOT_FOUND,
        ChatError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        ChatError::External(_) => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(serde_json::json!({
            "message": err.to_string(),
            "kind": err.kind(),
        })),
    )
        .into_response()
}
