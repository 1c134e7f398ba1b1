// URL canonicalization, equivalence and site relations

use crate::error::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use url::Url;

const FETCHABLE_SCHEMES: [&str; 2] = ["http", "https"];

/// A normalized URL used for equality and deduplication.
///
/// Scheme and host are lower-cased, the default port is dropped, the fragment and
/// userinfo are removed, trailing slashes are trimmed from the path (the root path
/// becomes empty) and an empty query is dropped. Two URLs are equivalent iff their
/// canonical strings are byte-equal.
#[derive(Clone)]
pub struct CanonicalUrl {
    text: String,
    parsed: Url,
}

impl CanonicalUrl {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn scheme(&self) -> &str {
        self.parsed.scheme()
    }

    pub fn host(&self) -> &str {
        self.parsed.host_str().unwrap_or_default()
    }

    /// Path with trailing slashes trimmed; empty for the site root.
    pub fn path(&self) -> &str {
        self.parsed.path().trim_end_matches('/')
    }

    pub fn path_depth(&self) -> usize {
        self.path().split('/').filter(|s| !s.is_empty()).count()
    }

    /// Lower-cased extension of the last path segment, including the dot.
    pub fn extension(&self) -> Option<String> {
        let last = self.path().rsplit('/').next()?;
        let dot = last.rfind('.')?;
        if dot == 0 || dot + 1 == last.len() {
            return None;
        }
        Some(last[dot..].to_lowercase())
    }

    /// `host/path` without scheme, used for pattern matching.
    pub fn host_path(&self) -> String {
        let path = self.path().trim_start_matches('/').to_lowercase();
        if path.is_empty() {
            self.host().to_string()
        } else {
            format!("{}/{}", self.host(), path)
        }
    }

    pub fn with_scheme(&self, scheme: &str) -> Result<CanonicalUrl> {
        let mut url = self.parsed.clone();
        url.set_scheme(scheme).map_err(|_| CoreError::UnsupportedScheme {
            input: self.text.clone(),
            scheme: scheme.to_string(),
        })?;
        canonicalize(url.as_str())
    }

    pub fn registrable_domain(&self) -> Option<String> {
        registrable_domain(self.host())
    }
}

impl PartialEq for CanonicalUrl {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for CanonicalUrl {}

impl Hash for CanonicalUrl {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl PartialOrd for CanonicalUrl {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CanonicalUrl {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.text.cmp(&other.text)
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanonicalUrl({})", self.text)
    }
}

impl Serialize for CanonicalUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for CanonicalUrl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        canonicalize(&raw).map_err(serde::de::Error::custom)
    }
}

/// Canonicalize an absolute http(s) URL.
pub fn canonicalize(raw: &str) -> Result<CanonicalUrl> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|e| CoreError::MalformedUrl {
        input: raw.to_string(),
        reason: e.to_string(),
    })?;
    from_url(&url, raw)
}

/// Resolve `href` against the page it was found on, then canonicalize.
///
/// `base` should be the page's final (post-redirect) URL as served, not its canonical
/// form: trimming a trailing slash changes how relative references resolve.
pub fn resolve(base: &str, href: &str) -> Result<CanonicalUrl> {
    let base_url = Url::parse(base.trim()).map_err(|e| CoreError::MalformedUrl {
        input: base.to_string(),
        reason: e.to_string(),
    })?;
    let joined = base_url
        .join(href.trim())
        .map_err(|e| CoreError::MalformedUrl {
            input: href.to_string(),
            reason: e.to_string(),
        })?;
    from_url(&joined, href)
}

fn from_url(url: &Url, raw: &str) -> Result<CanonicalUrl> {
    let scheme = url.scheme();
    if !FETCHABLE_SCHEMES.contains(&scheme) {
        return Err(CoreError::UnsupportedScheme {
            input: raw.to_string(),
            scheme: scheme.to_string(),
        });
    }
    let host = match url.host_str() {
        Some(h) if !h.is_empty() => h.trim_end_matches('.').to_lowercase(),
        _ => {
            return Err(CoreError::MalformedUrl {
                input: raw.to_string(),
                reason: "missing host".to_string(),
            });
        }
    };

    let mut text = format!("{}://{}", scheme, host);
    if let Some(port) = url.port() {
        text.push(':');
        text.push_str(&port.to_string());
    }
    text.push_str(url.path().trim_end_matches('/'));
    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        text.push('?');
        text.push_str(query);
    }

    let parsed = Url::parse(&text).map_err(|e| CoreError::MalformedUrl {
        input: raw.to_string(),
        reason: e.to_string(),
    })?;
    Ok(CanonicalUrl { text, parsed })
}

/// The URL under investigation. Set once per run and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    url: CanonicalUrl,
    bare: bool,
}

impl Origin {
    /// Parse origin input. Bare hosts (`example.com`) are treated as `https://example.com`.
    pub fn parse(raw: &str) -> Result<Origin> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::MalformedOrigin {
                input: raw.to_string(),
                reason: "empty input".to_string(),
            });
        }
        let bare = !trimmed.contains("://");
        let candidate = if bare {
            format!("https://{}", trimmed)
        } else {
            trimmed.to_string()
        };
        let url = canonicalize(&candidate).map_err(|e| CoreError::MalformedOrigin {
            input: raw.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Origin { url, bare })
    }

    pub fn url(&self) -> &CanonicalUrl {
        &self.url
    }

    /// True when the input carried no scheme.
    pub fn is_bare(&self) -> bool {
        self.bare
    }

    /// Plain-HTTP variant to retry when a bare-host origin fails over HTTPS.
    pub fn http_fallback(&self) -> Option<CanonicalUrl> {
        if self.bare && self.url.scheme() == "https" {
            self.url.with_scheme("http").ok()
        } else {
            None
        }
    }
}

pub(crate) fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Same host, ignoring a leading `www.`.
pub fn same_site(a: &CanonicalUrl, b: &CanonicalUrl) -> bool {
    strip_www(a.host()) == strip_www(b.host())
}

/// Compares registrable domains. Hosts without one (IP literals, single labels)
/// fall back to the subdomain relation.
pub fn same_registrable_domain(a: &CanonicalUrl, b: &CanonicalUrl) -> bool {
    match (a.registrable_domain(), b.registrable_domain()) {
        (Some(left), Some(right)) => left == right,
        _ => is_same_or_subdomain(b.host(), a.host()),
    }
}

/// True when `host` equals `parent` or is one of its subdomains.
pub fn is_same_or_subdomain(host: &str, parent: &str) -> bool {
    let host = strip_www(host);
    let parent = strip_www(parent);
    host == parent || host.ends_with(&format!(".{}", parent))
}

/// eTLD+1 from the public suffix list, private suffixes like `github.io` included.
pub fn registrable_domain(host: &str) -> Option<String> {
    let host = host.trim_end_matches('.').to_lowercase();
    if host.starts_with('[') || host.parse::<std::net::IpAddr>().is_ok() {
        return None;
    }
    psl::domain_str(&host).map(str::to_string)
}
