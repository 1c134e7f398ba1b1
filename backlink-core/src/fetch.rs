// Fetch Gateway: the only way the engine reaches the network

use crate::canon::CanonicalUrl;
use crate::error::FetchError;
use async_trait::async_trait;
use std::sync::Arc;

/// Content retrieved for one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
    /// URL that served the body, after redirects.
    pub final_url: String,
    /// URLs that answered with a redirect, in the order they were followed.
    pub redirect_chain: Vec<String>,
}

impl FetchResponse {
    pub fn html(url: &str, body: impl Into<String>) -> Self {
        FetchResponse {
            status: 200,
            content_type: "text/html; charset=utf-8".to_string(),
            body: body.into(),
            final_url: url.to_string(),
            redirect_chain: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn was_redirected(&self) -> bool {
        !self.redirect_chain.is_empty()
    }
}

/// Retrieves content for a URL. Caching and render fallback live behind this trait.
#[async_trait]
pub trait FetchGateway: Send + Sync {
    async fn fetch(&self, url: &CanonicalUrl) -> Result<FetchResponse, FetchError>;
}

#[async_trait]
impl<T: FetchGateway + ?Sized> FetchGateway for Arc<T> {
    async fn fetch(&self, url: &CanonicalUrl) -> Result<FetchResponse, FetchError> {
        (**self).fetch(url).await
    }
}

#[async_trait]
impl<T: FetchGateway + ?Sized> FetchGateway for Box<T> {
    async fn fetch(&self, url: &CanonicalUrl) -> Result<FetchResponse, FetchError> {
        (**self).fetch(url).await
    }
}
