use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const SUMMARY_UNAVAILABLE: &str = "要約を取得できませんでした。";

const GROQ_INSTRUCTIONS: &str = "Please always only reply in Japanese. It is the most important thing.\
Please include the title and main points of the text in your summary so that it can be understood without reading the text.\
Avoid subjective opinions or unnecessary details.\
Focus on the most important factual information.\
Please summarize the following text in four lines or less.\
Use only what the text says, not your knowledge.";

const OLLAMA_INSTRUCTIONS: &str = "Please reply in Japanese.\
Please summarize the following text in three lines or less.\
Please be concise and include key points in your summary.\
Please include the title and main points of the text in your summary so that it can be understood without reading the text.\
Ensure that the summary is coherent and logically structured.\
Avoid subjective opinions or unnecessary details.\
Focus on the most important factual information.\
Use only what the text says, not your knowledge.";

const GROQ_MAX_TOKENS: u32 = 8000;
const GROQ_TEMPERATURE: f64 = 1.2;

/// Produces a short summary of a page.
///
/// Implementations never fail: an unreachable backend or an unusable
/// response yields [`SUMMARY_UNAVAILABLE`].
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, title: &str, body: &str) -> String;
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

fn article_text(title: &str, body: &str) -> String {
    let mut result = String::with_capacity(title.len() + body.len() + 32);
    result.push_str("タイトル: ");
    result.push_str(title);
    result.push_str("\n本文: ");
    result.push_str(body);
    result
}

/// Single prompt carrying both instructions and the article.
pub fn build_prompt(instructions: &str, title: &str, body: &str) -> String {
    format!("{}\n\n{}", instructions, article_text(title, body))
}

/// `choices[0].message.content` of an OpenAI-style completion.
pub fn first_choice_content(json: &Value) -> Option<&str> {
    usable(json["choices"][0]["message"]["content"].as_str())
}

/// `message.content` of an Ollama chat response.
pub fn message_content(json: &Value) -> Option<&str> {
    usable(json["message"]["content"].as_str())
}

fn usable(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|text| !text.is_empty())
}

fn build_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .build()?)
}

async fn post_json(request: reqwest::RequestBuilder) -> Result<Value> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(AppError::LlmError(format!("HTTP {}: {}", status, detail)));
    }
    Ok(response.json().await?)
}

fn summary_or_sentinel(
    backend: &str,
    result: Result<Value>,
    extract: fn(&Value) -> Option<&str>,
) -> String {
    match result {
        Ok(json) => match extract(&json) {
            Some(summary) => {
                tracing::info!(backend, %summary, "Summary obtained");
                summary.to_string()
            }
            None => {
                tracing::warn!(backend, response = %json, "Response has no usable completion");
                SUMMARY_UNAVAILABLE.to_string()
            }
        },
        Err(e) => {
            tracing::warn!(backend, error = %e, "Summarization request failed");
            SUMMARY_UNAVAILABLE.to_string()
        }
    }
}

/// Hosted backend speaking the OpenAI chat-completions protocol.
pub struct GroqSummarizer {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl GroqSummarizer {
    pub fn new(api_key: &str, base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(GroqSummarizer {
            client: build_client(timeout)?,
            api_key: api_key.to_string(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }

    fn request(&self, title: &str, body: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system",
                    content: GROQ_INSTRUCTIONS.to_string(),
                },
                Message {
                    role: "user",
                    content: article_text(title, body),
                },
            ],
            max_tokens: Some(GROQ_MAX_TOKENS),
            temperature: Some(GROQ_TEMPERATURE),
            stream: None,
        }
    }
}

#[async_trait]
impl Summarizer for GroqSummarizer {
    async fn summarize(&self, title: &str, body: &str) -> String {
        tracing::info!(%title, model = %self.model, "Requesting summary from Groq");
        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request(title, body));
        summary_or_sentinel("groq", post_json(request).await, first_choice_content)
    }
}

/// Local backend served by Ollama's `/api/chat`.
pub struct OllamaSummarizer {
    client: Client,
    endpoint: String,
    model: String,
}

impl OllamaSummarizer {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(OllamaSummarizer {
            client: build_client(timeout)?,
            endpoint: format!("{}/api/chat", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }

    fn request(&self, title: &str, body: &str) -> ChatRequest {
        let prompt = build_prompt(OLLAMA_INSTRUCTIONS, title, body);
        tracing::debug!(prompt_len = prompt.len(), "Built prompt");
        ChatRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "system",
                content: prompt,
            }],
            max_tokens: None,
            temperature: None,
            stream: Some(false),
        }
    }
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    async fn summarize(&self, title: &str, body: &str) -> String {
        tracing::info!(%title, model = %self.model, "Requesting summary from Ollama");
        let request = self.client.post(&self.endpoint).json(&self.request(title, body));
        summary_or_sentinel("ollama", post_json(request).await, message_content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn prompt_contains_instructions_title_and_body() {
        let prompt = build_prompt(OLLAMA_INSTRUCTIONS, "T", "B");
        assert!(prompt.starts_with("Please reply in Japanese."));
        assert!(prompt.ends_with("\n\nタイトル: T\n本文: B"));
        assert!(prompt.contains("three lines or less"));
        assert!(prompt.contains("not your knowledge"));
    }

    #[test]
    fn completion_parsing_guards_missing_fields() {
        let ok = json!({"choices": [{"message": {"content": " summary "}}]});
        assert_eq!(first_choice_content(&ok), Some("summary"));
        assert_eq!(first_choice_content(&json!({"choices": []})), None);
        assert_eq!(first_choice_content(&json!({"error": "quota"})), None);
        assert_eq!(
            first_choice_content(&json!({"choices": [{"message": {"content": null}}]})),
            None
        );
        assert_eq!(
            first_choice_content(&json!({"choices": [{"message": {"content": "  "}}]})),
            None
        );

        assert_eq!(message_content(&json!({"message": {"content": "x"}})), Some("x"));
        assert_eq!(message_content(&json!({"done": true})), None);
        assert_eq!(message_content(&json!([1, 2])), None);
    }

    #[test]
    fn groq_request_splits_instructions_from_article() {
        let summarizer =
            GroqSummarizer::new("key", "http://localhost", "gemma2-9b-it", Duration::from_secs(1))
                .unwrap();
        let body = serde_json::to_value(summarizer.request("T", "B")).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "タイトル: T\n本文: B");
        assert_eq!(body["max_tokens"], 8000);
        assert_eq!(body["temperature"], 1.2);
        assert!(body.get("stream").is_none());
    }

    #[tokio::test]
    async fn groq_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/v1/chat/completions"))
            .and(bearer_token("gsk_test"))
            .and(body_partial_json(json!({"model": "gemma2-9b-it"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "三行の要約"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let summarizer = GroqSummarizer::new(
            "gsk_test",
            &format!("{}/openai/v1", server.uri()),
            "gemma2-9b-it",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(summarizer.summarize("T", "B").await, "三行の要約");
    }

    #[tokio::test]
    async fn groq_empty_choices_yield_sentinel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let summarizer =
            GroqSummarizer::new("k", &server.uri(), "m", Duration::from_secs(5)).unwrap();
        assert_eq!(summarizer.summarize("T", "B").await, SUMMARY_UNAVAILABLE);
    }

    #[tokio::test]
    async fn groq_auth_failure_yields_sentinel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let summarizer =
            GroqSummarizer::new("k", &server.uri(), "m", Duration::from_secs(5)).unwrap();
        assert_eq!(summarizer.summarize("T", "B").await, SUMMARY_UNAVAILABLE);
    }

    #[tokio::test]
    async fn non_json_response_yields_sentinel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let summarizer = OllamaSummarizer::new(&server.uri(), "m", Duration::from_secs(5)).unwrap();
        assert_eq!(summarizer.summarize("T", "B").await, SUMMARY_UNAVAILABLE);
    }

    #[tokio::test]
    async fn ollama_sends_single_system_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"model": "gemma2:2b", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": "要約です"},
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let summarizer =
            OllamaSummarizer::new(&server.uri(), "gemma2:2b", Duration::from_secs(5)).unwrap();
        assert_eq!(summarizer.summarize("T", "B").await, "要約です");

        let requests = server.received_requests().await.unwrap();
        let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let messages = sent["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "system");
        assert!(messages[0]["content"].as_str().unwrap().contains("本文: B"));
    }

    #[tokio::test]
    async fn unreachable_backend_yields_sentinel() {
        let summarizer =
            OllamaSummarizer::new("http://127.0.0.1:1", "m", Duration::from_secs(2)).unwrap();
        assert_eq!(summarizer.summarize("T", "B").await, SUMMARY_UNAVAILABLE);
    }
}
