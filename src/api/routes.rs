use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::api::models::HealthResponse;
use crate::api::response;
use crate::error::{AppError, Result};
use crate::line::{EventMessage, SIGNATURE_HEADER, WebhookEvent, WebhookPayload, verify_signature};
use crate::message::InboundMessage;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/callback", post(callback_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn callback_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str> {
    tracing::info!(bytes = body.len(), "Callback received");

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::SignatureError(format!("missing {} header", SIGNATURE_HEADER)))?;

    if let Err(e) = verify_signature(&state.config.channel_secret, &body, signature) {
        tracing::warn!(
            error = %e,
            "Invalid signature. Please check your channel access token/channel secret."
        );
        return Err(e);
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)?;
    tracing::info!(
        destination = payload.destination.as_deref().unwrap_or("-"),
        events = payload.events.len(),
        "Webhook payload decoded"
    );
    for message in text_messages(payload) {
        state.router.handle(&message).await;
    }

    Ok("OK")
}

/// Text messages that can be answered, in payload order.
fn text_messages(payload: WebhookPayload) -> impl Iterator<Item = InboundMessage> {
    payload.events.into_iter().filter_map(|event| match event {
        WebhookEvent::Message(event) => {
            let received_at = event.received_at();
            match (event.reply_token, event.message) {
                (Some(reply_token), EventMessage::Text { text, .. }) => {
                    tracing::info!(?received_at, %text, "Text message received");
                    Some(InboundMessage { text, reply_token })
                }
                _ => None,
            }
        }
        WebhookEvent::Other => None,
    })
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    response::success(HealthResponse {
        status: "ok",
        summarizer: state.config.summarizer.name(),
        extractor: state.config.extractor.to_string(),
    })
}
