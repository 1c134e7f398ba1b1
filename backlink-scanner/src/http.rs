use crate::error::Result;
use async_trait::async_trait;
use backlink_core::{CanonicalUrl, CrawlConfig, FetchError, FetchGateway, FetchResponse};
use reqwest::{Client, Response, header};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Statuses that usually mean an anti-bot wall rather than a missing page.
const BLOCKING_STATUSES: [u16; 3] = [403, 429, 999];

/// Plain HTTP gateway. Follows redirects itself so the chain can be reported.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_redirects: usize,
    max_content_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .connect_timeout(config.timeout())
            .pool_max_idle_per_host(config.workers.max(1))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            max_redirects: config.max_redirects,
            max_content_bytes: config.max_content_bytes,
        })
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_max_content_bytes(mut self, max_content_bytes: usize) -> Self {
        self.max_content_bytes = max_content_bytes;
        self
    }

    async fn read_body(
        &self,
        url: &CanonicalUrl,
        mut response: Response,
    ) -> std::result::Result<String, FetchError> {
        let too_large = || FetchError::TooLarge {
            url: url.to_string(),
            limit: self.max_content_bytes,
        };

        if let Some(length) = response.content_length()
            && length > self.max_content_bytes as u64
        {
            return Err(too_large());
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| request_error(url, e))?
        {
            if bytes.len() + chunk.len() > self.max_content_bytes {
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[async_trait]
impl FetchGateway for HttpFetcher {
    async fn fetch(&self, url: &CanonicalUrl) -> std::result::Result<FetchResponse, FetchError> {
        let mut current = url.as_str().to_string();
        let mut redirect_chain = Vec::new();

        loop {
            let response = self
                .client
                .get(&current)
                .send()
                .await
                .map_err(|e| request_error(url, e))?;
            let status = response.status().as_u16();

            if response.status().is_redirection()
                && let Some(next) = redirect_target(&current, &response)
            {
                if redirect_chain.len() >= self.max_redirects {
                    return Err(FetchError::RedirectLimitExceeded {
                        url: url.to_string(),
                        limit: self.max_redirects,
                    });
                }
                debug!("{} redirected ({}) to {}", current, status, next);
                redirect_chain.push(std::mem::replace(&mut current, next));
                continue;
            }

            if BLOCKING_STATUSES.contains(&status) {
                return Err(FetchError::Blocked {
                    url: url.to_string(),
                    status,
                });
            }

            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let body = self.read_body(url, response).await?;

            return Ok(FetchResponse {
                status,
                content_type,
                body,
                final_url: current,
                redirect_chain,
            });
        }
    }
}

fn redirect_target(current: &str, response: &Response) -> Option<String> {
    let location = response.headers().get(header::LOCATION)?.to_str().ok()?;
    let next = Url::parse(current).ok()?.join(location.trim()).ok()?;
    Some(next.to_string())
}

fn request_error(url: &CanonicalUrl, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}
