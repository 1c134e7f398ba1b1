use crate::error::{Result, ScanError};
use async_trait::async_trait;
use backlink_core::{CanonicalUrl, CrawlConfig, FetchError, FetchGateway, FetchResponse};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

/// Two-stage gateway: ask `primary`, and retry through `secondary` when it fails or
/// answers with a non-2xx status.
pub struct FallbackFetcher<P, S> {
    primary: P,
    secondary: S,
}

impl<P, S> FallbackFetcher<P, S>
where
    P: FetchGateway,
    S: FetchGateway,
{
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl<P, S> FetchGateway for FallbackFetcher<P, S>
where
    P: FetchGateway,
    S: FetchGateway,
{
    async fn fetch(&self, url: &CanonicalUrl) -> std::result::Result<FetchResponse, FetchError> {
        match self.primary.fetch(url).await {
            Ok(response) if response.is_success() => Ok(response),
            Ok(response) => {
                debug!(
                    "Primary fetch of {} returned HTTP {}, trying fallback",
                    url, response.status
                );
                match self.secondary.fetch(url).await {
                    Ok(rendered) if rendered.is_success() => Ok(rendered),
                    _ => Ok(response),
                }
            }
            Err(primary_error) => {
                debug!("Primary fetch of {} failed ({}), trying fallback", url, primary_error);
                self.secondary.fetch(url).await.map_err(|e| {
                    warn!("Fallback fetch of {} failed: {}", url, e);
                    primary_error
                })
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
}

/// What a rendering service returns for one page.
#[derive(Debug, Deserialize)]
pub struct RenderedPage {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub final_url: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    pub html: String,
}

fn default_status() -> u16 {
    200
}

/// Gateway that delegates to an external headless-browser service.
///
/// The service receives `POST {"url": "..."}` and answers with a [`RenderedPage`].
#[derive(Debug, Clone)]
pub struct RenderServiceFetcher {
    client: Client,
    endpoint: Url,
    max_content_bytes: usize,
}

impl RenderServiceFetcher {
    pub fn new(endpoint: &str, config: &CrawlConfig) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", endpoint, e)))?;
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            endpoint,
            max_content_bytes: config.max_content_bytes,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl FetchGateway for RenderServiceFetcher {
    async fn fetch(&self, url: &CanonicalUrl) -> std::result::Result<FetchResponse, FetchError> {
        let network = |reason: String| FetchError::Network {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&RenderRequest { url: url.as_str() })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    network(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(network(format!(
                "render service returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let page: RenderedPage = response
            .json()
            .await
            .map_err(|e| network(format!("bad render service reply: {}", e)))?;
        if page.html.len() > self.max_content_bytes {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                limit: self.max_content_bytes,
            });
        }

        Ok(FetchResponse {
            status: page.status,
            content_type: page
                .content_type
                .unwrap_or_else(|| "text/html; charset=utf-8".to_string()),
            body: page.html,
            final_url: page.final_url.unwrap_or_else(|| url.to_string()),
            redirect_chain: Vec::new(),
        })
    }
}
