//! Page retrieval through a headless Chrome instance, for pages that only
//! render their text after running scripts.

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::extractor::{ExtractedContent, Extractor, SiteRule, log_extracted, parse_page};

pub struct HeadlessExtractor {
    timeout: Duration,
    rules: Vec<SiteRule>,
    chrome_path: Option<PathBuf>,
}

impl HeadlessExtractor {
    pub fn new(timeout: Duration, rules: Vec<SiteRule>) -> Self {
        HeadlessExtractor {
            timeout,
            rules,
            chrome_path: None,
        }
    }

    /// Uses this Chrome binary instead of locating one.
    pub fn with_chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }
}

/// Launches a browser, navigates to `url` and returns the rendered DOM.
///
/// The browser process lives only inside this call; dropping `browser`
/// terminates it on every return path.
fn render(url: &str, timeout: Duration, chrome_path: Option<PathBuf>) -> Result<String> {
    let options = LaunchOptions::default_builder()
        .path(chrome_path)
        .headless(true)
        .sandbox(false)
        .idle_browser_timeout(timeout)
        .args(vec![OsStr::new("--ignore-certificate-errors")])
        .build()
        .map_err(|e| AppError::FetchError(format!("Invalid browser options: {}", e)))?;

    let browser = Browser::new(options)
        .map_err(|e| AppError::FetchError(format!("Failed to launch browser: {}", e)))?;
    let tab = browser
        .new_tab()
        .map_err(|e| AppError::FetchError(format!("Failed to open tab: {}", e)))?;
    tab.set_default_timeout(timeout);

    tab.navigate_to(url)
        .and_then(|tab| tab.wait_until_navigated())
        .map_err(|e| AppError::FetchError(format!("Navigation failed: {}", e)))?;

    tab.get_content()
        .map_err(|e| AppError::FetchError(format!("Failed to read page: {}", e)))
}

#[async_trait]
impl Extractor for HeadlessExtractor {
    async fn extract(&self, url: &str) -> ExtractedContent {
        tracing::info!(%url, "Rendering page in headless browser");
        let owned_url = url.to_string();
        let timeout = self.timeout;
        let chrome_path = self.chrome_path.clone();
        let task = tokio::task::spawn_blocking(move || render(&owned_url, timeout, chrome_path));

        // Allow launch and teardown on top of the navigation budget.
        let html = match tokio::time::timeout(timeout * 2, task).await {
            Ok(Ok(Ok(html))) => html,
            Ok(Ok(Err(e))) => {
                tracing::warn!(%url, error = %e, "Headless fetch failed");
                return ExtractedContent::failed();
            }
            Ok(Err(e)) => {
                tracing::warn!(%url, error = %e, "Headless fetch task panicked");
                return ExtractedContent::failed();
            }
            Err(_) => {
                tracing::warn!(%url, "Headless fetch timed out after {:?}", timeout * 2);
                return ExtractedContent::failed();
            }
        };

        let content = parse_page(url, &html, &self.rules);
        log_extracted(&content);
        content
    }
}
