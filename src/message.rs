use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use crate::extractor::Extractor;
use crate::line::ReplySender;
use crate::llm::Summarizer;

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+").expect("Failed to compile URL pattern"));

/// A chat text message together with the token used to answer it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub text: String,
    pub reply_token: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyPayload {
    pub text: String,
}

impl ReplyPayload {
    pub fn new(title: &str, summary: &str) -> Self {
        ReplyPayload {
            text: format!("タイトル: {}\n要約: {}", title, summary),
        }
    }
}

/// Leftmost URL in `text`, if any.
pub fn find_first_url(text: &str) -> Option<&str> {
    URL_PATTERN.find(text).map(|m| m.as_str())
}

/// Runs extraction and summarization for the first URL of a message and
/// answers with the result.
pub struct MessageRouter {
    extractor: Arc<dyn Extractor>,
    summarizer: Arc<dyn Summarizer>,
    replier: Arc<dyn ReplySender>,
}

impl MessageRouter {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        summarizer: Arc<dyn Summarizer>,
        replier: Arc<dyn ReplySender>,
    ) -> Self {
        MessageRouter {
            extractor,
            summarizer,
            replier,
        }
    }

    pub async fn handle(&self, message: &InboundMessage) {
        let Some(url) = find_first_url(&message.text) else {
            tracing::debug!("No URL in message");
            return;
        };
        tracing::info!(%url, "URL detected");

        let content = self.extractor.extract(url).await;
        let summary = self.summarizer.summarize(&content.title, &content.body).await;
        let reply = ReplyPayload::new(&content.title, &summary);

        match self.replier.reply(&message.reply_token, &reply.text).await {
            Ok(()) => tracing::info!(%url, "Reply sent"),
            Err(e) => tracing::warn!(%url, error = %e, "Reply failed"),
        }
    }
}
