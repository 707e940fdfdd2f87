//! LINE Messaging API: webhook signatures, webhook payloads and replies.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const SIGNATURE_HEADER: &str = "X-Line-Signature";

/// Longest text LINE accepts in a single text message.
pub const MAX_TEXT_CHARS: usize = 5000;

/// Checks `signature` against base64(HMAC-SHA256(channel_secret, body)).
pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> Result<()> {
    let expected = STANDARD
        .decode(signature.trim())
        .map_err(|_| AppError::SignatureError("signature is not base64".to_string()))?;

    let mut mac = Hmac::<Sha256>::new_from_slice(channel_secret.as_bytes())
        .map_err(|e| AppError::SignatureError(e.to_string()))?;
    mac.update(body);

    // Constant-time comparison
    mac.verify_slice(&expected)
        .map_err(|_| AppError::SignatureError("signature mismatch".to_string()))
}

/// Computes the signature LINE attaches to `body`.
pub fn sign(channel_secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(channel_secret.as_bytes())
        .map_err(|e| AppError::SignatureError(e.to_string()))?;
    mac.update(body);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub destination: Option<String>,
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WebhookEvent {
    Message(MessageEvent),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    pub message: EventMessage,
}

impl MessageEvent {
    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp.and_then(DateTime::from_timestamp_millis)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventMessage {
    Text { id: String, text: String },
    #[serde(other)]
    Other,
}

/// Sends one text reply to a reply token.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn reply(&self, reply_token: &str, text: &str) -> Result<()>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: [TextMessage<'a>; 1],
}

#[derive(Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

pub struct LineClient {
    client: Client,
    access_token: String,
    endpoint: String,
}

impl LineClient {
    pub fn new(access_token: &str, api_base: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(LineClient {
            client,
            access_token: access_token.to_string(),
            endpoint: format!("{}/v2/bot/message/reply", api_base.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ReplySender for LineClient {
    async fn reply(&self, reply_token: &str, text: &str) -> Result<()> {
        let text = truncate_chars(text, MAX_TEXT_CHARS);
        let body = ReplyRequest {
            reply_token,
            messages: [TextMessage { kind: "text", text }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ReplyError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::ReplyError(format!("HTTP {}: {}", status, detail)));
        }
        Ok(())
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{bearer_token, body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn signature_round_trip_and_mismatch() {
        let body = br#"{"events":[]}"#;
        let signature = sign("secret", body).unwrap();
        assert!(verify_signature("secret", body, &signature).is_ok());
        assert!(matches!(
            verify_signature("other", body, &signature),
            Err(AppError::SignatureError(_))
        ));
        assert!(matches!(
            verify_signature("secret", b"{}", &signature),
            Err(AppError::SignatureError(_))
        ));
        assert!(matches!(
            verify_signature("secret", body, "not base64!"),
            Err(AppError::SignatureError(_))
        ));
    }

    #[test]
    fn known_signature_vector() {
        // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
        let signature = sign("key", b"The quick brown fox jumps over the lazy dog").unwrap();
        assert_eq!(signature, "97yD9DBThCSxMpjmqm+xQ+9NWaFJRhdZl0edvC0aPNg=");
    }

    #[test]
    fn payload_decodes_text_and_skips_other_events() {
        let payload: WebhookPayload = serde_json::from_value(json!({
            "destination": "U123",
            "events": [
                {
                    "type": "message",
                    "replyToken": "r1",
                    "timestamp": 1_700_000_000_000i64,
                    "source": {"type": "user", "userId": "U1"},
                    "message": {"type": "text", "id": "m1", "text": "hi https://a.example"}
                },
                {
                    "type": "message",
                    "replyToken": "r2",
                    "message": {"type": "sticker", "id": "m2", "packageId": "1"}
                },
                {"type": "follow", "replyToken": "r3"}
            ]
        }))
        .unwrap();

        assert_eq!(payload.destination.as_deref(), Some("U123"));
        assert_eq!(payload.events.len(), 3);
        match &payload.events[0] {
            WebhookEvent::Message(event) => {
                assert_eq!(event.reply_token.as_deref(), Some("r1"));
                assert_eq!(event.received_at().unwrap().timestamp(), 1_700_000_000);
                assert!(matches!(
                    &event.message,
                    EventMessage::Text { text, .. } if text == "hi https://a.example"
                ));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(
            &payload.events[1],
            WebhookEvent::Message(MessageEvent { message: EventMessage::Other, .. })
        ));
        assert!(matches!(payload.events[2], WebhookEvent::Other));
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("あいうえお", 3), "あいう");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[tokio::test]
    async fn reply_posts_text_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/bot/message/reply"))
            .and(bearer_token("line-token"))
            .and(body_json(json!({
                "replyToken": "r1",
                "messages": [{"type": "text", "text": "hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = LineClient::new("line-token", &server.uri(), Duration::from_secs(5)).unwrap();
        client.reply("r1", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn rejected_reply_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"message":"Invalid reply token"}"#),
            )
            .mount(&server)
            .await;

        let client = LineClient::new("t", &server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.reply("expired", "hello").await.unwrap_err();
        assert!(matches!(err, AppError::ReplyError(ref msg) if msg.contains("Invalid reply token")));
    }
}
