// Host and host+path glob patterns used by trust lists and recognizer bindings

use crate::canon::{self, CanonicalUrl};
use crate::error::{CoreError, Result};
use regex::Regex;

/// How specific a pattern is. Host+path patterns outrank host-wide ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    HostPath,
    Host,
}

/// A case-insensitive `fnmatch`-style glob (`*`, `?`) over `host` or `host/path`.
/// A leading `www.` is ignored on both the pattern and the URL.
///
/// `github.com/sponsors/*` matches `https://github.com/sponsors` and everything below it;
/// `*.example.com/*` matches every strict subdomain of `example.com`.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    regex: Regex,
    kind: PatternKind,
    subdomain_suffix: Option<String>,
}

impl Pattern {
    pub fn parse(raw: &str) -> Result<Pattern> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(CoreError::InvalidPattern {
                pattern: raw.to_string(),
                reason: "empty pattern".to_string(),
            });
        }
        let normalized = normalized
            .strip_prefix("https://")
            .or_else(|| normalized.strip_prefix("http://"))
            .unwrap_or(&normalized);
        let normalized = canon::strip_www(normalized).to_string();

        let regex = Regex::new(&glob_to_regex(&normalized)).map_err(|e| {
            CoreError::InvalidPattern {
                pattern: raw.to_string(),
                reason: e.to_string(),
            }
        })?;

        let host_part = normalized.split('/').next().unwrap_or_default();
        let path_part = &normalized[host_part.len()..];
        let kind = if path_part.is_empty() || path_part == "/" || path_part == "/*" {
            PatternKind::Host
        } else {
            PatternKind::HostPath
        };

        let subdomain_suffix = normalized.strip_prefix("*.").map(|rest| {
            rest.replace("/*", "").trim_end_matches('/').to_string()
        });

        Ok(Pattern {
            raw: raw.to_string(),
            regex,
            kind,
            subdomain_suffix,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn matches(&self, url: &CanonicalUrl) -> bool {
        let host = canon::strip_www(url.host()).to_lowercase();
        if host.is_empty() {
            return false;
        }
        let host_path = canon::strip_www(&url.host_path()).to_string();
        let candidates = [
            host.clone(),
            format!("{}/", host),
            format!("{}/*", host),
            host_path.clone(),
            format!("{}/", host_path),
            format!("{}/*", host_path),
        ];
        if candidates.iter().any(|c| self.regex.is_match(c)) {
            return true;
        }

        match &self.subdomain_suffix {
            Some(suffix) if self.kind == PatternKind::Host => {
                host.ends_with(&format!(".{}", suffix))
            }
            _ => false,
        }
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// An ordered list of patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    pub fn parse<S: AsRef<str>>(raw: &[S]) -> Result<PatternSet> {
        let patterns = raw
            .iter()
            .map(|p| Pattern::parse(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(PatternSet { patterns })
    }

    pub fn matches(&self, url: &CanonicalUrl) -> bool {
        self.patterns.iter().any(|p| p.matches(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::canonicalize;

    fn url(s: &str) -> CanonicalUrl {
        canonicalize(s).unwrap()
    }

    #[test]
    fn test_host_wide_pattern() {
        let p = Pattern::parse("github.com/*").unwrap();
        assert_eq!(p.kind(), PatternKind::Host);
        assert!(p.matches(&url("https://github.com")));
        assert!(p.matches(&url("https://github.com/alice")));
        assert!(!p.matches(&url("https://gist.github.com/alice")));
    }

    #[test]
    fn test_path_pattern_covers_its_root() {
        let p = Pattern::parse("github.com/sponsors/*").unwrap();
        assert_eq!(p.kind(), PatternKind::HostPath);
        assert!(p.matches(&url("https://github.com/sponsors")));
        assert!(p.matches(&url("https://github.com/sponsors/pypa")));
        assert!(!p.matches(&url("https://github.com/pypa/pip")));
    }

    #[test]
    fn test_subdomain_pattern_requires_strict_subdomain() {
        let p = Pattern::parse("*.forem.com").unwrap();
        assert!(p.matches(&url("https://dev.forem.com")));
        assert!(!p.matches(&url("https://forem.com")));
        assert!(!p.matches(&url("https://notforem.com")));
    }

    #[test]
    fn test_pattern_set_matches_any() {
        let set = PatternSet::parse(&["github.com/sponsors/*", "*.github.io"]).unwrap();
        assert!(set.matches(&url("https://github.com/sponsors/x")));
        assert!(set.matches(&url("https://alice.github.io/blog")));
        assert!(!set.matches(&url("https://github.com/alice")));
    }

    #[test]
    fn test_www_prefix_is_ignored() {
        let p = Pattern::parse("linkedin.com/in/*").unwrap();
        assert!(p.matches(&url("https://www.linkedin.com/in/alice")));
        assert!(p.matches(&url("https://linkedin.com/in/alice")));
        let p = Pattern::parse("www.example.org").unwrap();
        assert!(p.matches(&url("https://example.org")));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(Pattern::parse("   ").is_err());
    }
}
