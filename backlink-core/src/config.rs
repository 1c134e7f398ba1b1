// Crawl configuration consumed by the engine. Loaded by the caller, never by the core.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; backlink/0.1; +https://github.com/trapdoorsec/backlink)";

/// Well-known identity sites.
pub const DEFAULT_TRUSTED: &[&str] = &[
    "github.com/*",
    "*.github.io/*",
    "gitlab.com/*",
    "*.gitlab.io/*",
    "keybase.io/*",
    "linkedin.com/in/*",
    "twitter.com/*",
    "x.com/*",
    "facebook.com/*",
    "mastodon.social/*",
    "*.m.wikipedia.org/*",
    "*.wikipedia.org/*",
];

/// Aggregators and marketing sections.
pub const DEFAULT_UNTRUSTED: &[&str] = &[
    "joinmastodon.org/*",
    "*.joinmastodon.org/*",
    "github.com/sponsors/*",
    "github.com/trending/*",
    "github.com/readme/*",
    "github.com/topics/*",
    "github.com/collections/*",
    "github.com/partners/*",
    "github.com/solutions",
    "github.com/solutions/*",
    "github.com/site",
    "github.com/site/*",
    "github.com/features",
    "github.com/features/*",
    "github.com/enterprise",
    "github.com/enterprise/*",
    "github.com/resources",
    "github.com/resources/*",
    "github.com/marketplace",
    "skills.github.com",
    "*.stackoverflow.co/*",
    "stackoverflow.co",
    "stackoverflow.co/*",
    "stackoverflow.blog*",
    "api.stackexchange.com",
    "data.stackexchange.com",
    "stackoverflow.com/users/signup*",
    "*.forem.com",
];

/// Hosts that block automated clients. Their pages are fetched and reported, never expanded.
pub const DEFAULT_REPORT_ONLY: &[&str] = &[
    "twitter.com/*",
    "x.com/*",
    "linkedin.com/*",
    "reddit.com/*",
];

/// Path extensions that never lead to identity pages.
pub const ASSET_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".webp", ".bmp", ".ico", ".svg", ".avif", ".mp4", ".m4v",
    ".mov", ".webm", ".ogg", ".ogv", ".mp3", ".wav", ".flac", ".aac", ".pdf", ".zip", ".tar",
    ".gz", ".tgz", ".bz2", ".xz", ".7z", ".rar", ".exe", ".msi", ".dmg", ".iso", ".woff",
    ".woff2", ".ttf", ".otf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".css", ".js",
    ".mjs", ".map",
];

/// `rel` tokens marking a link as an asset rather than a page.
pub const ASSET_RELS: &[&str] = &[
    "icon",
    "shortcut",
    "apple-touch-icon",
    "mask-icon",
    "manifest",
    "preload",
    "prefetch",
    "dns-prefetch",
    "modulepreload",
    "stylesheet",
];

/// `rel` tokens that keep a link out of the frontier unless it also carries `me`.
pub const NO_FOLLOW_RELS: &[&str] = &["nofollow", "sponsored", "ugc"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SameDomainPolicy {
    /// Follow links into the origin's own domain.
    Follow,
    /// Never enqueue the origin's exact host.
    NoSelfDomain,
    /// Never enqueue the origin's host or any of its subdomains.
    #[default]
    NoSelfDomainOrSubdomain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainMode {
    /// Every hop of an indirect chain must be corroborated by the hop before it.
    #[default]
    Strict,
    /// Any link to the origin beyond hop 1 counts as indirect.
    Relaxed,
}

/// What a recognizer binding extracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecognizerSpec {
    RelMe,
    Anchors,
    Selector {
        selector: String,
        #[serde(default = "default_selector_attr")]
        attr: String,
    },
    JsonPath {
        path: String,
    },
    XPath {
        path: String,
    },
}

fn default_selector_attr() -> String {
    "href".to_string()
}

/// A recognizer bound to a host or host+path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizerBinding {
    pub pattern: String,
    #[serde(flatten)]
    pub recognizer: RecognizerSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub directory: Option<String>,

    #[serde(default = "default_expire_secs")]
    pub expire_secs: u64,

    #[serde(default)]
    pub store_errors: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            directory: None,
            expire_secs: default_expire_secs(),
            store_errors: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlConfig {
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,

    #[serde(default = "default_max_outlinks")]
    pub max_outlinks: usize,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,

    #[serde(default = "default_max_run_secs")]
    pub max_run_secs: u64,

    #[serde(default = "default_max_total_fetches")]
    pub max_total_fetches: usize,

    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: usize,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_trusted")]
    pub trusted: Vec<String>,

    #[serde(default = "default_untrusted")]
    pub untrusted: Vec<String>,

    #[serde(default = "default_report_only")]
    pub report_only: Vec<String>,

    #[serde(default)]
    pub recognizers: Vec<RecognizerBinding>,

    #[serde(default)]
    pub only_trusted_surfaces: bool,

    #[serde(default)]
    pub only_strong_links: bool,

    #[serde(default)]
    pub same_domain_policy: SameDomainPolicy,

    #[serde(default)]
    pub use_registrable_domain: bool,

    #[serde(default)]
    pub chain_mode: ChainMode,

    #[serde(default)]
    pub expand_from_corroborated_only: bool,

    #[serde(default)]
    pub cache: CacheConfig,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        CrawlConfig {
            max_hops: default_max_hops(),
            max_outlinks: default_max_outlinks(),
            max_redirects: default_max_redirects(),
            timeout_secs: default_timeout_secs(),
            max_content_bytes: default_max_content_bytes(),
            max_run_secs: default_max_run_secs(),
            max_total_fetches: default_max_total_fetches(),
            max_total_bytes: default_max_total_bytes(),
            workers: default_workers(),
            user_agent: default_user_agent(),
            trusted: default_trusted(),
            untrusted: default_untrusted(),
            report_only: default_report_only(),
            recognizers: Vec::new(),
            only_trusted_surfaces: false,
            only_strong_links: false,
            same_domain_policy: SameDomainPolicy::default(),
            use_registrable_domain: false,
            chain_mode: ChainMode::default(),
            expand_from_corroborated_only: false,
            cache: CacheConfig::default(),
        }
    }
}

impl CrawlConfig {
    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn with_trusted<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.trusted = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_untrusted<S: Into<String>>(
        mut self,
        patterns: impl IntoIterator<Item = S>,
    ) -> Self {
        self.untrusted = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_report_only<S: Into<String>>(
        mut self,
        patterns: impl IntoIterator<Item = S>,
    ) -> Self {
        self.report_only = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_only_trusted_surfaces(mut self, enabled: bool) -> Self {
        self.only_trusted_surfaces = enabled;
        self
    }

    pub fn with_only_strong_links(mut self, enabled: bool) -> Self {
        self.only_strong_links = enabled;
        self
    }

    pub fn with_chain_mode(mut self, mode: ChainMode) -> Self {
        self.chain_mode = mode;
        self
    }

    pub fn with_recognizer(mut self, binding: RecognizerBinding) -> Self {
        self.recognizers.push(binding);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn run_budget(&self) -> Duration {
        Duration::from_secs(self.max_run_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_max_hops() -> usize {
    3
}

fn default_max_outlinks() -> usize {
    50
}

fn default_max_redirects() -> usize {
    5
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_max_content_bytes() -> usize {
    1024 * 1024
}

fn default_max_run_secs() -> u64 {
    120
}

fn default_max_total_fetches() -> usize {
    500
}

fn default_max_total_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_workers() -> usize {
    8
}

fn default_expire_secs() -> u64 {
    24 * 3600
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_trusted() -> Vec<String> {
    DEFAULT_TRUSTED.iter().map(|s| s.to_string()).collect()
}

fn default_untrusted() -> Vec<String> {
    DEFAULT_UNTRUSTED.iter().map(|s| s.to_string()).collect()
}

fn default_report_only() -> Vec<String> {
    DEFAULT_REPORT_ONLY.iter().map(|s| s.to_string()).collect()
}
