pub mod api;
#[cfg(feature = "headless")]
pub mod browser;
pub mod config;
pub mod decode;
pub mod error;
pub mod extractor;
pub mod line;
pub mod llm;
pub mod message;

use std::sync::Arc;

use config::{Config, ExtractorKind, SummarizerBackend};
use error::Result;
use extractor::{Extractor, HttpExtractor, builtin_site_rules};
use line::LineClient;
use llm::{GroqSummarizer, OllamaSummarizer, Summarizer};
use message::MessageRouter;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub router: Arc<MessageRouter>,
}

impl AppState {
    pub fn new(config: Config, router: MessageRouter) -> Self {
        AppState {
            config: Arc::new(config),
            router: Arc::new(router),
        }
    }
}

/// Wires the extraction, summarization and reply strategies selected by `config`.
pub fn build_state(config: Config) -> Result<AppState> {
    let timeouts = config.timeouts;

    let extractor: Arc<dyn Extractor> = match config.extractor {
        ExtractorKind::Http => Arc::new(HttpExtractor::new(timeouts.fetch, builtin_site_rules())?),
        #[cfg(feature = "headless")]
        ExtractorKind::Headless => {
            let mut headless =
                browser::HeadlessExtractor::new(timeouts.fetch, builtin_site_rules());
            if let Some(path) = &config.chrome_path {
                headless = headless.with_chrome_path(path);
            }
            Arc::new(headless)
        }
        #[cfg(not(feature = "headless"))]
        ExtractorKind::Headless => {
            return Err(error::AppError::ConfigError(
                "EXTRACTOR=headless requires the 'headless' feature".to_string(),
            ));
        }
    };

    let summarizer: Arc<dyn Summarizer> = match &config.summarizer {
        SummarizerBackend::Groq {
            api_key,
            base_url,
            model,
        } => Arc::new(GroqSummarizer::new(
            api_key,
            base_url,
            model,
            timeouts.summarize,
        )?),
        SummarizerBackend::Ollama { base_url, model } => {
            Arc::new(OllamaSummarizer::new(base_url, model, timeouts.summarize)?)
        }
    };

    let replier = Arc::new(LineClient::new(
        &config.access_token,
        &config.line_api_base,
        timeouts.reply,
    )?);

    tracing::info!(
        summarizer = config.summarizer.name(),
        extractor = %config.extractor,
        "Pipeline configured"
    );

    Ok(AppState::new(
        config,
        MessageRouter::new(extractor, summarizer, replier),
    ))
}
