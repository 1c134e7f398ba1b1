// Scoring: reduces a completed evidence set to a score and label

use crate::model::{Classification, EvidenceRecord, ScoreLabel};
use std::collections::HashSet;

pub const STRONG_WEIGHT: f64 = 85.0;
pub const WEAK_WEIGHT: f64 = 50.0;
pub const INDIRECT_WEIGHT: f64 = 10.0;

/// Counts at which each tier saturates.
pub const STRONG_SATURATION: f64 = 1.0;
pub const WEAK_SATURATION: f64 = 2.0;
pub const INDIRECT_SATURATION: f64 = 5.0;

pub const ECHO_ONLY_PENALTY: i64 = 20;
pub const EXCESS_HOP_PENALTY: i64 = 10;
pub const MAX_PENALIZED_EXCESS_HOPS: usize = 3;
pub const CONFLICT_PENALTY: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub value: u8,
    pub label: ScoreLabel,
}

/// Breakdown of the terms that produced a score, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreTerms {
    pub strong: usize,
    pub weak: usize,
    pub indirect: usize,
    pub excluded: usize,
    pub excess_hops: usize,
    pub conflicting_strong: bool,
    pub penalty: i64,
}

/// Score an evidence set. Pure, deterministic, and independent of record order.
pub fn score(evidence: &[EvidenceRecord], max_hops: usize) -> Score {
    let terms = score_terms(evidence, max_hops);
    let s = (terms.strong as f64 / STRONG_SATURATION).min(1.0);
    let w = (terms.weak as f64 / WEAK_SATURATION).min(1.0);
    let i = (terms.indirect as f64 / INDIRECT_SATURATION).min(1.0);

    let raw = (STRONG_WEIGHT * s + WEAK_WEIGHT * w + INDIRECT_WEIGHT * i).round() as i64
        - terms.penalty;
    let value = raw.clamp(0, 100) as u8;
    Score {
        value,
        label: label_for(value),
    }
}

pub fn score_terms(evidence: &[EvidenceRecord], max_hops: usize) -> ScoreTerms {
    let count = |class: Classification| {
        evidence
            .iter()
            .filter(|e| e.classification == Some(class))
            .count()
    };
    let strong = count(Classification::Strong);
    let weak = count(Classification::Weak);
    let indirect = count(Classification::Indirect);
    let excluded = count(Classification::Excluded);

    let excess_hops = evidence
        .iter()
        .map(|e| e.hops.saturating_sub(max_hops))
        .max()
        .unwrap_or(0);
    let conflicting_strong = has_conflicting_strong_claims(evidence);

    let mut penalty = 0;
    if excluded > 0 && strong + weak + indirect == 0 {
        penalty += ECHO_ONLY_PENALTY;
    }
    penalty += EXCESS_HOP_PENALTY * excess_hops.min(MAX_PENALIZED_EXCESS_HOPS) as i64;
    if conflicting_strong {
        penalty += CONFLICT_PENALTY;
    }

    ScoreTerms {
        strong,
        weak,
        indirect,
        excluded,
        excess_hops,
        conflicting_strong,
        penalty,
    }
}

pub fn label_for(score: u8) -> ScoreLabel {
    if score >= 80 {
        ScoreLabel::High
    } else if score >= 50 {
        ScoreLabel::Medium
    } else {
        ScoreLabel::Low
    }
}

/// Two strong claims from the same host where neither page contains the other,
/// e.g. two different profiles on one platform both claiming the origin.
fn has_conflicting_strong_claims(evidence: &[EvidenceRecord]) -> bool {
    let sources: HashSet<(String, String)> = evidence
        .iter()
        .filter(|e| e.classification == Some(Classification::Strong))
        .filter_map(|e| {
            let url = url::Url::parse(&e.source.url).ok()?;
            let host = url.host_str()?.trim_start_matches("www.").to_string();
            let path = url.path().trim_end_matches('/').to_string();
            Some((host, path))
        })
        .collect();

    let sources: Vec<_> = sources.into_iter().collect();
    for (i, (host_a, path_a)) in sources.iter().enumerate() {
        for (host_b, path_b) in sources.iter().skip(i + 1) {
            if host_a != host_b {
                continue;
            }
            let nested = is_path_prefix(path_a, path_b) || is_path_prefix(path_b, path_a);
            if !nested {
                return true;
            }
        }
    }
    false
}

fn is_path_prefix(prefix: &str, path: &str) -> bool {
    path == prefix
        || (path.starts_with(prefix) && path[prefix.len()..].starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EvidenceDraft, EvidenceKind, PageContext, UrlContext};
    use chrono::Utc;

    fn ev(class: Classification, idx: usize) -> EvidenceRecord {
        EvidenceDraft {
            kind: EvidenceKind::Backlink,
            source: UrlContext {
                url: format!("https://t{}.example", idx),
                context: PageContext::CandidatePage,
            },
            target: UrlContext {
                url: "https://origin.example".to_string(),
                context: PageContext::OriginPage,
            },
            rel: None,
            classification: Some(class),
            hops: 1,
            trusted_surface: true,
            notes: String::new(),
        }
        .finish(Utc::now())
    }

    #[test]
    fn test_empty_scores_low() {
        let s = score(&[], 3);
        assert_eq!(s.value, 0);
        assert_eq!(s.label, ScoreLabel::Low);
    }

    #[test]
    fn test_label_boundaries() {
        assert_eq!(label_for(80), ScoreLabel::High);
        assert_eq!(label_for(79), ScoreLabel::Medium);
        assert_eq!(label_for(50), ScoreLabel::Medium);
        assert_eq!(label_for(49), ScoreLabel::Low);
    }

    #[test]
    fn test_path_prefix() {
        assert!(is_path_prefix("/alice", "/alice/repo"));
        assert!(!is_path_prefix("/alice", "/alicebob"));
        assert!(is_path_prefix("", "/anything"));
    }

    #[test]
    fn test_excess_hops_penalty() {
        let mut record = ev(Classification::Strong, 1);
        record.hops = 5;
        let terms = score_terms(&[record.clone()], 3);
        assert_eq!(terms.excess_hops, 2);
        assert_eq!(score(&[record], 3).value, 65);
    }
}
