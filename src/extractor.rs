use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, ClientBuilder};
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use url::Url;

use crate::decode::decode_html;
use crate::error::{AppError, Result};

/// Bytes of a page read before the rest is discarded.
pub const DEFAULT_MAX_PAGE_BYTES: usize = 2 * 1024 * 1024;

pub const NO_TITLE: &str = "No Title";
pub const EXTRACTION_FAILED: &str = "本文を取得できませんでした。";

/// Title and paragraph text pulled from a fetched page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedContent {
    pub title: String,
    pub body: String,
}

impl ExtractedContent {
    /// Both fields set to their sentinels.
    pub fn failed() -> Self {
        ExtractedContent {
            title: NO_TITLE.to_string(),
            body: EXTRACTION_FAILED.to_string(),
        }
    }
}

/// Fetches a URL and extracts its title and body text.
///
/// Implementations never fail: any fetch or parse problem degrades to the
/// sentinel values of [`ExtractedContent`].
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, url: &str) -> ExtractedContent;
}

/// A CSS selector tried against pages whose host matches.
#[derive(Clone, Debug)]
pub struct SiteRule {
    host: String,
    selector: Selector,
}

impl SiteRule {
    pub fn new(host: &str, css: &str) -> Result<Self> {
        let selector = Selector::parse(css)
            .map_err(|e| AppError::ParseError(format!("Invalid selector '{}': {:?}", css, e)))?;
        Ok(SiteRule {
            host: host.to_ascii_lowercase(),
            selector,
        })
    }

    /// Exact host or any subdomain of it.
    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        host == self.host
            || host
                .strip_suffix(self.host.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("Failed to parse title selector"));

static PARAGRAPH_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p").expect("Failed to parse paragraph selector"));

static BUILTIN_RULES: Lazy<Vec<SiteRule>> = Lazy::new(|| {
    [
        (
            "news.yahoo.co.jp",
            "p.sc-54nboa-0.deLyrJ.yjSlinkDirectlink.highLightSearchTarget",
        ),
        ("reuters.com", "div.ArticleBody__content___2gQno p"),
    ]
    .into_iter()
    .map(|(host, css)| SiteRule::new(host, css).expect("Failed to parse built-in site rule"))
    .collect()
});

/// Site rules shipped with the crate, in the order they are tried.
pub fn builtin_site_rules() -> Vec<SiteRule> {
    BUILTIN_RULES.clone()
}

/// Extracts title and body from an HTML document.
///
/// The first site rule whose host matches `url` and which yields any text
/// wins; otherwise every `<p>` in document order is collected.
pub fn parse_page(url: &str, html: &str, rules: &[SiteRule]) -> ExtractedContent {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| NO_TITLE.to_string());

    let host = Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string));

    let site_paragraphs = host.as_deref().and_then(|host| {
        rules
            .iter()
            .filter(|rule| rule.matches(host))
            .map(|rule| collect_paragraphs(&document, &rule.selector))
            .find(|paragraphs| !paragraphs.is_empty())
    });

    let paragraphs =
        site_paragraphs.unwrap_or_else(|| collect_paragraphs(&document, &PARAGRAPH_SELECTOR));

    let body = if paragraphs.is_empty() {
        EXTRACTION_FAILED.to_string()
    } else {
        paragraphs.join("\n")
    };

    ExtractedContent { title, body }
}

fn collect_paragraphs(document: &Html, selector: &Selector) -> Vec<String> {
    document
        .select(selector)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect()
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Retrieves pages with a plain HTTP GET.
pub struct HttpExtractor {
    client: Client,
    rules: Vec<SiteRule>,
    max_bytes: usize,
}

impl HttpExtractor {
    pub fn new(timeout: Duration, rules: Vec<SiteRule>) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .user_agent(concat!("line-link-summarizer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpExtractor {
            client,
            rules,
            max_bytes: DEFAULT_MAX_PAGE_BYTES,
        })
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Downloads at most `max_bytes` of the page and decodes it by its
    /// declared charset.
    async fn fetch_html(&self, url: &str) -> Result<String> {
        let mut response = self.client.get(url).send().await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        if let Some(len) = response.content_length() {
            if len > self.max_bytes as u64 {
                tracing::info!(%url, len, max = self.max_bytes, "Page exceeds size cap, truncating");
            }
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let room = self.max_bytes - bytes.len();
            if chunk.len() >= room {
                bytes.extend_from_slice(&chunk[..room]);
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(decode_html(&bytes, content_type.as_deref()))
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(&self, url: &str) -> ExtractedContent {
        tracing::info!(%url, "Fetching page");
        let html = match self.fetch_html(url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(%url, error = %e, "Page fetch failed");
                return ExtractedContent::failed();
            }
        };

        let content = parse_page(url, &html, &self.rules);
        log_extracted(&content);
        content
    }
}

pub(crate) fn log_extracted(content: &ExtractedContent) {
    let preview: String = content.body.chars().take(100).collect();
    tracing::info!(title = %content.title, body = %preview, "Extracted page content");
}
