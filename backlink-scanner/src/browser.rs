// Local headless-browser fetcher for pages that only render with JavaScript

use crate::error::{Result, ScanError};
use async_trait::async_trait;
use backlink_core::{CanonicalUrl, CrawlConfig, FetchError, FetchGateway, FetchResponse};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Gateway that loads pages in a Chromium instance launched on this machine.
///
/// Every fetch opens a fresh tab, waits for navigation to settle, and returns the
/// rendered DOM. The tab is closed whether or not rendering succeeded.
pub struct BrowserFetcher {
    browser: Browser,
    handler: JoinHandle<()>,
    timeout: Duration,
    max_content_bytes: usize,
}

impl BrowserFetcher {
    /// Start a headless browser. Without `executable` the usual install locations are searched.
    pub async fn launch(config: &CrawlConfig, executable: Option<&Path>) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(config.timeout())
            .arg(format!("--user-agent={}", config.user_agent));
        if let Some(path) = executable {
            builder = builder.chrome_executable(path);
        }
        let browser_config = builder.build().map_err(ScanError::BrowserError)?;

        let (browser, mut events) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScanError::BrowserError(e.to_string()))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        info!("Launched headless browser for page rendering");

        Ok(Self {
            browser,
            handler,
            timeout: config.timeout(),
            max_content_bytes: config.max_content_bytes,
        })
    }

    async fn render(
        &self,
        url: &CanonicalUrl,
    ) -> std::result::Result<(String, Option<String>), CdpError> {
        let page = self.browser.new_page(url.as_str()).await?;
        let loaded = async {
            page.wait_for_navigation().await?;
            let html = page.content().await?;
            let final_url = page.url().await?;
            Ok::<_, CdpError>((html, final_url))
        }
        .await;
        if let Err(e) = page.close().await {
            debug!("Failed to close tab for {}: {}", url, e);
        }
        loaded
    }
}

impl Drop for BrowserFetcher {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl FetchGateway for BrowserFetcher {
    async fn fetch(&self, url: &CanonicalUrl) -> std::result::Result<FetchResponse, FetchError> {
        let (html, final_url) = match tokio::time::timeout(self.timeout, self.render(url)).await {
            Ok(Ok(rendered)) => rendered,
            Ok(Err(e)) => {
                return Err(FetchError::Network {
                    url: url.to_string(),
                    reason: format!("browser: {}", e),
                });
            }
            Err(_) => {
                return Err(FetchError::Timeout {
                    url: url.to_string(),
                });
            }
        };

        if html.len() > self.max_content_bytes {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                limit: self.max_content_bytes,
            });
        }

        Ok(FetchResponse {
            status: 200,
            content_type: "text/html; charset=utf-8".to_string(),
            body: html,
            final_url: final_url.unwrap_or_else(|| url.to_string()),
            redirect_chain: Vec::new(),
        })
    }
}
