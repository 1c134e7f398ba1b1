pub mod canon;
pub mod classify;
pub mod config;
pub mod crawl;
pub mod error;
pub mod fetch;
pub mod graph;
pub mod model;
pub mod pattern;
pub mod recognizer;
pub mod score;
pub mod surface;

pub use canon::{CanonicalUrl, Origin, canonicalize};
pub use config::{ChainMode, CrawlConfig, RecognizerBinding, RecognizerSpec, SameDomainPolicy};
pub use crawl::{CrawlEngine, ProgressCallback};
pub use error::{Budget, CoreError, FetchError, RecognizerError, RunError};
pub use fetch::{FetchGateway, FetchResponse};
pub use model::{BacklinkResult, Classification, EvidenceKind, EvidenceRecord, ScoreLabel};
pub use surface::Surface;

/// Crawl from `origin` and score the evidence found.
///
/// Fails only when the origin is malformed or the configuration holds invalid patterns;
/// everything else ends up in `BacklinkResult::errors`.
pub async fn crawl_and_score<F: FetchGateway>(
    origin: &str,
    fetcher: F,
    config: CrawlConfig,
) -> error::Result<BacklinkResult> {
    CrawlEngine::new(fetcher, config)?.run(origin).await
}

/// Like [`crawl_and_score`], but starts from pre-collected candidate pages.
pub async fn crawl_and_score_with_seeds<F: FetchGateway>(
    origin: &str,
    seeds: Vec<String>,
    fetcher: F,
    config: CrawlConfig,
) -> error::Result<BacklinkResult> {
    CrawlEngine::new(fetcher, config)?
        .with_seeds(seeds)
        .run(origin)
        .await
}
