// Evidence Classifier: turns an observation plus traversal context into an evidence draft

use crate::canon::CanonicalUrl;
use crate::config::{ChainMode, CrawlConfig};
use crate::model::{
    Classification, EvidenceDraft, EvidenceKind, PageContext, RawObservation, UrlContext,
};
use crate::surface::Surface;

/// What a classified link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget {
    /// The origin, or an alias the origin redirected to.
    Origin,
    /// The page this node was discovered from.
    Parent,
}

/// One link observation with the traversal context needed to classify it.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub observation: &'a RawObservation,
    pub source: &'a CanonicalUrl,
    pub target: &'a CanonicalUrl,
    pub link_target: LinkTarget,
    pub hop: usize,
    pub surface: Surface,
    /// Whether the discovery parent is itself corroborated back to the origin.
    pub parent_corroborated: bool,
    /// Origin-first path to this node, used in notes.
    pub chain: &'a [CanonicalUrl],
}

#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    pub only_strong_links: bool,
    pub chain_mode: ChainMode,
}

impl Classifier {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Classifier {
            only_strong_links: config.only_strong_links,
            chain_mode: config.chain_mode,
        }
    }

    /// Classify a link. `None` means the link is not evidence at all.
    pub fn classify(&self, c: &Candidate<'_>) -> Option<EvidenceDraft> {
        let rel_me = c.observation.is_rel_me();
        let (kind, classification, notes) = match c.link_target {
            LinkTarget::Origin => self.classify_origin_link(c, rel_me),
            LinkTarget::Parent => self.classify_parent_link(c, rel_me)?,
        };

        let mut notes = notes;
        if !c.observation.context.is_empty() {
            notes.push_str(&format!("; text=\"{}\"", c.observation.context));
        }

        Some(EvidenceDraft {
            kind,
            source: UrlContext {
                url: c.source.to_string(),
                context: PageContext::CandidatePage,
            },
            target: UrlContext {
                url: c.target.to_string(),
                context: match c.link_target {
                    LinkTarget::Origin => PageContext::OriginPage,
                    LinkTarget::Parent => PageContext::CandidatePage,
                },
            },
            rel: Some(c.observation.rel.clone()),
            classification,
            hops: c.hop,
            trusted_surface: c.surface.is_trusted(),
            notes,
        })
    }

    fn classify_origin_link(
        &self,
        c: &Candidate<'_>,
        rel_me: bool,
    ) -> (EvidenceKind, Option<Classification>, String) {
        use Classification::*;

        if c.surface == Surface::Untrusted {
            return (
                EvidenceKind::Backlink,
                Some(Excluded),
                "excluded: untrusted surface".to_string(),
            );
        }
        if self.only_strong_links && !rel_me {
            return (
                EvidenceKind::Backlink,
                Some(Excluded),
                "excluded: only rel=me links accepted".to_string(),
            );
        }
        if rel_me {
            return (
                EvidenceKind::Backlink,
                Some(Strong),
                "rel=me link to origin".to_string(),
            );
        }
        if c.hop == 1 && c.surface == Surface::Trusted {
            return (
                EvidenceKind::Backlink,
                Some(Weak),
                "plain link to origin from trusted surface".to_string(),
            );
        }
        if c.hop > 1 && (c.parent_corroborated || self.chain_mode == ChainMode::Relaxed) {
            return (EvidenceKind::Backlink, Some(Indirect), self.chain_note(c));
        }
        (
            EvidenceKind::Mention,
            None,
            "mention of origin without corroboration".to_string(),
        )
    }

    fn classify_parent_link(
        &self,
        c: &Candidate<'_>,
        rel_me: bool,
    ) -> Option<(EvidenceKind, Option<Classification>, String)> {
        if c.hop < 2 || !c.parent_corroborated || c.surface == Surface::Untrusted {
            return None;
        }
        if self.only_strong_links && !rel_me {
            return Some((
                EvidenceKind::Backlink,
                Some(Classification::Excluded),
                "excluded: only rel=me links accepted".to_string(),
            ));
        }
        Some((
            EvidenceKind::Backlink,
            Some(Classification::Indirect),
            self.chain_note(c),
        ))
    }

    fn chain_note(&self, c: &Candidate<'_>) -> String {
        let pivot = c
            .chain
            .len()
            .checked_sub(2)
            .and_then(|i| c.chain.get(i))
            .map(|u| u.to_string())
            .unwrap_or_else(|| "-".to_string());
        let chain = c
            .chain
            .iter()
            .map(|u| u.as_str())
            .collect::<Vec<_>>()
            .join(" -> ");
        format!("INDIRECT via pivot={} chain={}", pivot, chain)
    }
}

/// A node is corroborated when it yields positive evidence, or a plain mention one hop
/// from the origin.
pub fn corroborates(draft: &EvidenceDraft) -> bool {
    match draft.classification {
        Some(class) => class.is_positive(),
        None => draft.kind == EvidenceKind::Mention && draft.hops == 1,
    }
}
