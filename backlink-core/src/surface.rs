// Surface Policy: trusted / untrusted / unknown classification of candidate pages

use crate::canon::{self, CanonicalUrl};
use crate::config::{CrawlConfig, SameDomainPolicy};
use crate::error::Result;
use crate::graph::LinkGraph;
use crate::pattern::PatternSet;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Trusted,
    Untrusted,
    Unknown,
}

impl Surface {
    pub fn is_trusted(&self) -> bool {
        *self == Surface::Trusted
    }
}

/// Immutable trust policy for one run.
#[derive(Debug, Clone)]
pub struct SurfacePolicy {
    trusted: PatternSet,
    untrusted: PatternSet,
    report_only: PatternSet,
}

impl SurfacePolicy {
    pub fn new(trusted: PatternSet, untrusted: PatternSet) -> Self {
        SurfacePolicy {
            trusted,
            untrusted,
            report_only: PatternSet::default(),
        }
    }

    pub fn with_report_only(mut self, report_only: PatternSet) -> Self {
        self.report_only = report_only;
        self
    }

    pub fn from_config(config: &CrawlConfig) -> Result<Self> {
        Ok(SurfacePolicy::new(
            PatternSet::parse(&config.trusted)?,
            PatternSet::parse(&config.untrusted)?,
        )
        .with_report_only(PatternSet::parse(&config.report_only)?))
    }

    /// Pages that are fetched and classified but whose links are never followed.
    pub fn is_report_only(&self, url: &CanonicalUrl) -> bool {
        self.report_only.matches(url)
    }

    /// Pattern-only classification: untrusted list first, then trusted list.
    pub fn classify_static(&self, url: &CanonicalUrl) -> Surface {
        if self.untrusted.matches(url) {
            Surface::Untrusted
        } else if self.trusted.matches(url) {
            Surface::Trusted
        } else {
            Surface::Unknown
        }
    }

    /// Full classification. A page no pattern covers is trusted by inference when an
    /// already-trusted page links to it and it links back to that page.
    pub fn classify_surface(
        &self,
        url: &CanonicalUrl,
        graph: &LinkGraph,
        trusted_nodes: &HashSet<CanonicalUrl>,
    ) -> Surface {
        match self.classify_static(url) {
            Surface::Unknown => {
                let corroborated = graph
                    .mutual_neighbors(url)
                    .into_iter()
                    .any(|n| n != url && trusted_nodes.contains(n));
                if corroborated {
                    Surface::Trusted
                } else {
                    Surface::Unknown
                }
            }
            known => known,
        }
    }
}

/// Decides which links count as the origin's own domain.
#[derive(Debug, Clone, Copy)]
pub struct DomainPolicy {
    pub policy: SameDomainPolicy,
    pub use_registrable_domain: bool,
}

impl DomainPolicy {
    pub fn from_config(config: &CrawlConfig) -> Self {
        DomainPolicy {
            policy: config.same_domain_policy,
            use_registrable_domain: config.use_registrable_domain,
        }
    }

    /// True when `target` is on the origin's own domain under this policy.
    pub fn is_own_domain(&self, origin: &CanonicalUrl, target: &CanonicalUrl) -> bool {
        match self.policy {
            SameDomainPolicy::Follow => false,
            SameDomainPolicy::NoSelfDomain => canon::same_site(origin, target),
            SameDomainPolicy::NoSelfDomainOrSubdomain => {
                if self.use_registrable_domain {
                    canon::same_registrable_domain(origin, target)
                } else {
                    canon::is_same_or_subdomain(target.host(), origin.host())
                }
            }
        }
    }
}
