//! HTTP request handlers

use super::AppState;
use crate::transport::telegram::TgUpdate;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(receive_update))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct WebhookResponse {
    ok: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthResponse {
    status: &'static str,
    pending_waits: usize,
    outstanding_waits: usize,
    capacity: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================
// Webhook
// ============================================================

/// Accept one update; command handling continues after the response
async fn receive_update(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<WebhookResponse>, AppError> {
    let raw: TgUpdate = serde_json::from_str(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid update: {e}")))?;
    let update_id = raw.update_id;

    let Some(update) = raw.into_update() else {
        // Acknowledge so the platform does not redeliver it
        tracing::debug!(update_id, "Ignoring unsupported update");
        return Ok(Json(WebhookResponse { ok: true }));
    };

    tracing::debug!(update_id, user_id = %update.user_id, "Received update");
    state.bot.handle_update(update).await;
    Ok(Json(WebhookResponse { ok: true }))
}

// ============================================================
// Health
// ============================================================

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let correlator = state.bot.correlator();
    Json(HealthResponse {
        status: "ok",
        pending_waits: correlator.pending_count(),
        outstanding_waits: correlator.admission().outstanding(),
        capacity: correlator.admission().capacity(),
    })
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        tracing::warn!(status = %status, error = %message, "Rejecting webhook request");
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::{Bot, BotDeps};
    use crate::config::Config;
    use crate::i18n::Catalog;
    use crate::testing::{InMemorySessionStore, InMemoryWaitStore, MockTransport};
    use crate::types::ChatId;
    use std::sync::Arc;
    use std::time::Duration;

    fn state() -> (AppState, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let bot = Bot::new(
            &Config::from_lookup(|_| None),
            BotDeps {
                transport: transport.clone(),
                markers: Arc::new(InMemoryWaitStore::new()),
                sessions: Arc::new(InMemorySessionStore::new()),
                localizer: Arc::new(Catalog::builtin()),
            },
        );
        (AppState::new(Arc::new(bot)), transport)
    }

    #[tokio::test]
    async fn test_webhook_starts_command() {
        let (state, transport) = state();
        let body = r#"{
            "update_id": 1,
            "message": {
                "message_id": 10,
                "chat": {"id": 5},
                "from": {"id": 5, "username": "ada"},
                "text": "/start"
            }
        }"#;

        let response = receive_update(State(state), body.to_string()).await.unwrap();
        assert_eq!(response.0, WebhookResponse { ok: true });

        for _ in 0..200 {
            if !transport.sent_texts().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            transport.visible_texts(ChatId(5)),
            vec!["Hi ada! Use /email to register your address or /event to draft an event."]
        );
    }

    #[tokio::test]
    async fn test_webhook_ignores_unsupported_update() {
        let (state, transport) = state();
        let response = receive_update(State(state), r#"{"update_id": 2}"#.to_string())
            .await
            .unwrap();
        assert!(response.0.ok);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_rejects_malformed_body() {
        let (state, _) = state();
        let err = receive_update(State(state), "not json".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_reports_waits() {
        let (state, _) = state();
        let Json(health) = health(State(state)).await;
        assert_eq!(
            health,
            HealthResponse {
                status: "ok",
                pending_waits: 0,
                outstanding_waits: 0,
                capacity: 1024,
            }
        );
    }
}
