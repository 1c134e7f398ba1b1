pub mod browser;
pub mod cache;
pub mod error;
pub mod fallback;
pub mod http;

pub use browser::BrowserFetcher;
pub use cache::{CacheStats, CachingFetcher, MemoryCache, ResponseCache, SqliteCache};
pub use error::ScanError;
pub use fallback::{FallbackFetcher, RenderServiceFetcher};
pub use http::HttpFetcher;
