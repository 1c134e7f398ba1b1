use crate::error::RunError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Backlink,
    Redirect,
    Mention,
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::Backlink => "backlink",
            EvidenceKind::Redirect => "redirect",
            EvidenceKind::Mention => "mention",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Strong,
    Weak,
    Indirect,
    Excluded,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Strong => "strong",
            Classification::Weak => "weak",
            Classification::Indirect => "indirect",
            Classification::Excluded => "excluded",
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(
            self,
            Classification::Strong | Classification::Weak | Classification::Indirect
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageContext {
    OriginPage,
    CandidatePage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlContext {
    pub url: String,
    pub context: PageContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkDetails {
    pub rel: Vec<String>,
}

/// One immutable entry of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub id: String,
    pub kind: EvidenceKind,
    pub source: UrlContext,
    pub target: UrlContext,
    pub link: Option<LinkDetails>,
    pub classification: Option<Classification>,
    pub hops: usize,
    pub trusted_surface: bool,
    pub observed_at: DateTime<Utc>,
    pub notes: String,
}

/// Fields of an evidence record before its id and timestamp are assigned.
#[derive(Debug, Clone)]
pub struct EvidenceDraft {
    pub kind: EvidenceKind,
    pub source: UrlContext,
    pub target: UrlContext,
    pub rel: Option<Vec<String>>,
    pub classification: Option<Classification>,
    pub hops: usize,
    pub trusted_surface: bool,
    pub notes: String,
}

impl EvidenceDraft {
    pub fn finish(self, observed_at: DateTime<Utc>) -> EvidenceRecord {
        let id = evidence_id(
            self.kind,
            &self.source.url,
            &self.target.url,
            self.classification,
            self.hops,
        );
        EvidenceRecord {
            id,
            kind: self.kind,
            source: self.source,
            target: self.target,
            link: self.rel.map(|rel| LinkDetails { rel }),
            classification: self.classification,
            hops: self.hops,
            trusted_surface: self.trusted_surface,
            observed_at,
            notes: self.notes,
        }
    }
}

/// Content-derived identifier: the same observation always hashes to the same id.
pub fn evidence_id(
    kind: EvidenceKind,
    source: &str,
    target: &str,
    classification: Option<Classification>,
    hops: usize,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(source.as_bytes());
    hasher.update(b"\0");
    hasher.update(target.as_bytes());
    hasher.update(b"\0");
    hasher.update(classification.map(|c| c.as_str()).unwrap_or("-").as_bytes());
    hasher.update(b"\0");
    hasher.update(hops.to_le_bytes());
    format!("e-{}", &format!("{:x}", hasher.finalize())[..16])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreLabel {
    High,
    Medium,
    Low,
}

impl ScoreLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreLabel::High => "high",
            ScoreLabel::Medium => "medium",
            ScoreLabel::Low => "low",
        }
    }
}

/// Outcome of one crawl-and-score run. Produced once, at the end of the run.
#[derive(Debug, Clone, Serialize)]
pub struct BacklinkResult {
    pub origin_url: String,
    pub score: u8,
    pub label: ScoreLabel,
    pub evidence: Vec<EvidenceRecord>,
    pub errors: Vec<RunError>,
}

impl BacklinkResult {
    /// Evidence that contributes to the score.
    pub fn positive_evidence(&self) -> impl Iterator<Item = &EvidenceRecord> {
        self.evidence
            .iter()
            .filter(|e| e.classification.is_some_and(|c| c.is_positive()))
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// What produced an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservationMarker {
    RelMe,
    Anchor,
    Selector,
    StructuredPath,
}

/// A link assertion extracted from one fetched page, before canonicalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObservation {
    pub source: String,
    pub target: String,
    pub rel: Vec<String>,
    pub marker: ObservationMarker,
    pub context: String,
}

impl RawObservation {
    pub fn has_rel(&self, token: &str) -> bool {
        self.rel.iter().any(|r| r.eq_ignore_ascii_case(token))
    }

    pub fn is_rel_me(&self) -> bool {
        self.marker == ObservationMarker::RelMe || self.has_rel("me")
    }
}
