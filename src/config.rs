use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};

const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_GROQ_MODEL: &str = "gemma2-9b-it";
const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "gemma2:2b";
const DEFAULT_LINE_API_BASE: &str = "https://api.line.me";

/// Which text-generation backend produces summaries.
#[derive(Clone, PartialEq)]
pub enum SummarizerBackend {
    Groq {
        api_key: String,
        base_url: String,
        model: String,
    },
    Ollama {
        base_url: String,
        model: String,
    },
}

const REDACTED: &str = "<redacted>";

impl fmt::Debug for SummarizerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummarizerBackend::Groq {
                base_url, model, ..
            } => f
                .debug_struct("Groq")
                .field("api_key", &REDACTED)
                .field("base_url", base_url)
                .field("model", model)
                .finish(),
            SummarizerBackend::Ollama { base_url, model } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .field("model", model)
                .finish(),
        }
    }
}

impl SummarizerBackend {
    pub fn name(&self) -> &'static str {
        match self {
            SummarizerBackend::Groq { .. } => "groq",
            SummarizerBackend::Ollama { .. } => "ollama",
        }
    }
}

/// How pages are retrieved before extraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractorKind {
    Http,
    Headless,
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractorKind::Http => f.write_str("http"),
            ExtractorKind::Headless => f.write_str("headless"),
        }
    }
}

/// Upper bounds for the three outbound calls made per message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub fetch: Duration,
    pub summarize: Duration,
    pub reply: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            fetch: Duration::from_secs(20),
            summarize: Duration::from_secs(60),
            reply: Duration::from_secs(10),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub access_token: String,
    pub channel_secret: String,
    pub line_api_base: String,
    pub summarizer: SummarizerBackend,
    pub extractor: ExtractorKind,
    pub chrome_path: Option<PathBuf>,
    pub timeouts: Timeouts,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server_addr", &self.server_addr)
            .field("access_token", &REDACTED)
            .field("channel_secret", &REDACTED)
            .field("line_api_base", &self.line_api_base)
            .field("summarizer", &self.summarizer)
            .field("extractor", &self.extractor)
            .field("chrome_path", &self.chrome_path)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| AppError::ConfigError(format!("{} is not set", key)))
        };

        let access_token = required("ACCESS_TOKEN")?;
        let channel_secret = required("CHANNEL_SECRET")?;

        let summarizer = match var("SUMMARIZER").as_deref().unwrap_or("groq") {
            "groq" => SummarizerBackend::Groq {
                api_key: required("GROQ_API_KEY")?,
                base_url: var("GROQ_BASE_URL").unwrap_or_else(|| DEFAULT_GROQ_BASE_URL.to_string()),
                model: var("GROQ_MODEL").unwrap_or_else(|| DEFAULT_GROQ_MODEL.to_string()),
            },
            "ollama" => SummarizerBackend::Ollama {
                base_url: var("OLLAMA_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OLLAMA_BASE_URL.to_string()),
                model: var("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            },
            other => {
                return Err(AppError::ConfigError(format!(
                    "Unknown SUMMARIZER '{}', expected 'groq' or 'ollama'",
                    other
                )));
            }
        };

        let extractor = match var("EXTRACTOR").as_deref().unwrap_or("http") {
            "http" => ExtractorKind::Http,
            "headless" if cfg!(feature = "headless") => ExtractorKind::Headless,
            "headless" => {
                return Err(AppError::ConfigError(
                    "EXTRACTOR=headless requires the 'headless' feature".to_string(),
                ));
            }
            other => {
                return Err(AppError::ConfigError(format!(
                    "Unknown EXTRACTOR '{}', expected 'http' or 'headless'",
                    other
                )));
            }
        };

        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            fetch: seconds(var("FETCH_TIMEOUT_SECS"), "FETCH_TIMEOUT_SECS", defaults.fetch)?,
            summarize: seconds(
                var("SUMMARIZE_TIMEOUT_SECS"),
                "SUMMARIZE_TIMEOUT_SECS",
                defaults.summarize,
            )?,
            reply: seconds(var("REPLY_TIMEOUT_SECS"), "REPLY_TIMEOUT_SECS", defaults.reply)?,
        };

        // Load server configuration with defaults
        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = var("PORT").unwrap_or_else(|| "5000".to_string());
        let port = port
            .parse::<u16>()
            .map_err(|e| AppError::ConfigError(format!("Invalid port: {}", e)))?;
        let ip = IpAddr::from_str(&host)
            .map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            access_token,
            channel_secret,
            line_api_base: var("LINE_API_BASE").unwrap_or_else(|| DEFAULT_LINE_API_BASE.to_string()),
            summarizer,
            extractor,
            chrome_path: var("CHROME_PATH").map(PathBuf::from),
            timeouts,
        })
    }
}

fn seconds(value: Option<String>, key: &str, default: Duration) -> Result<Duration> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or_else(|| AppError::ConfigError(format!("Invalid {}: '{}'", key, raw))),
    }
}
