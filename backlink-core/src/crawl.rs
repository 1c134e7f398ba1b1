// Crawl Engine: bounded breadth-first traversal from the origin

use crate::canon::{self, CanonicalUrl, Origin};
use crate::classify::{self, Candidate, Classifier, LinkTarget};
use crate::config::{ASSET_EXTENSIONS, ASSET_RELS, CrawlConfig, NO_FOLLOW_RELS};
use crate::error::{Budget, FetchError, Result, RunError};
use crate::fetch::{FetchGateway, FetchResponse};
use crate::graph::LinkGraph;
use crate::model::{
    BacklinkResult, EvidenceDraft, EvidenceKind, EvidenceRecord, PageContext, RawObservation,
    UrlContext,
};
use crate::recognizer::{ContentClass, Page, RecognizerRegistry};
use crate::score;
use crate::surface::{DomainPolicy, Surface, SurfacePolicy};
use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Expanding,
    Done,
}

/// A URL waiting in the frontier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlNode {
    pub url: CanonicalUrl,
    pub hop: usize,
    pub parent: Option<CanonicalUrl>,
}

/// Per-run budget counters and the cancellation signal shared with in-flight fetches.
struct RunBudget {
    cancelled: AtomicBool,
    fetches: AtomicUsize,
    bytes: AtomicUsize,
    max_fetches: usize,
    max_bytes: usize,
}

impl RunBudget {
    fn new(config: &CrawlConfig) -> Self {
        RunBudget {
            cancelled: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
            bytes: AtomicUsize::new(0),
            max_fetches: config.max_total_fetches,
            max_bytes: config.max_total_bytes,
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

enum FetchOutcome {
    Fetched(FetchResponse),
    Failed(FetchError),
    Skipped,
}

struct NodeFetch {
    node: CrawlNode,
    outcome: FetchOutcome,
    exhausted: Option<Budget>,
}

#[derive(Debug, Clone)]
struct NodeInfo {
    parent: Option<CanonicalUrl>,
    page_url: CanonicalUrl,
    corroborated: bool,
}

/// State owned by the single coordinator of one run.
struct RunState {
    origin: Origin,
    origin_keys: HashSet<CanonicalUrl>,
    visited: HashSet<CanonicalUrl>,
    nodes: HashMap<CanonicalUrl, NodeInfo>,
    graph: LinkGraph,
    trusted_nodes: HashSet<CanonicalUrl>,
    evidence: Vec<EvidenceRecord>,
    errors: Vec<RunError>,
    phase: Phase,
}

impl RunState {
    fn new(origin: Origin) -> Self {
        let mut origin_keys = HashSet::new();
        origin_keys.insert(origin.url().clone());
        RunState {
            origin,
            origin_keys,
            visited: HashSet::new(),
            nodes: HashMap::new(),
            graph: LinkGraph::new(),
            trusted_nodes: HashSet::new(),
            evidence: Vec::new(),
            errors: Vec::new(),
            phase: Phase::Init,
        }
    }

    fn transition(&mut self, next: Phase) {
        debug!("Crawl phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    fn record_budget(&mut self, budget: Budget) {
        let err = RunError::BudgetExhausted(budget);
        if !self.errors.contains(&err) {
            warn!("{}", err);
            self.errors.push(err);
        }
    }

    fn is_origin(&self, url: &CanonicalUrl) -> bool {
        self.origin_keys.contains(url)
    }

    /// Pages hosted on the origin's own site never count as evidence about it.
    fn is_self_referential(&self, page: &CanonicalUrl) -> bool {
        self.origin_keys
            .iter()
            .any(|o| canon::is_same_or_subdomain(page.host(), o.host()))
    }

    /// Origin-first discovery path ending at `url`, whose parent is `parent`.
    fn chain_to(&self, url: &CanonicalUrl, parent: Option<&CanonicalUrl>) -> Vec<CanonicalUrl> {
        let mut chain = vec![url.clone()];
        let mut current = parent.cloned();
        while let Some(u) = current {
            current = self.nodes.get(&u).and_then(|info| info.parent.clone());
            chain.push(u);
            if chain.len() > self.nodes.len() + 1 {
                break;
            }
        }
        chain.reverse();
        chain
    }

    fn push_evidence(&mut self, draft: EvidenceDraft) {
        let record = draft.finish(Utc::now());
        debug!(
            "Evidence {} {} -> {} ({})",
            record.kind.as_str(),
            record.source.url,
            record.target.url,
            record
                .classification
                .map(|c| c.as_str())
                .unwrap_or("unclassified")
        );
        self.evidence.push(record);
    }
}

/// Bounded breadth-first crawl over a Fetch Gateway.
pub struct CrawlEngine<F: FetchGateway> {
    fetcher: F,
    config: CrawlConfig,
    registry: RecognizerRegistry,
    surfaces: SurfacePolicy,
    domains: DomainPolicy,
    classifier: Classifier,
    seeds: Vec<String>,
    progress_callback: Option<ProgressCallback>,
}

impl<F: FetchGateway> CrawlEngine<F> {
    /// Build an engine. Fails only on invalid trust patterns or recognizer bindings.
    pub fn new(fetcher: F, config: CrawlConfig) -> Result<Self> {
        let registry = RecognizerRegistry::new(&config.recognizers)?;
        let surfaces = SurfacePolicy::from_config(&config)?;
        let domains = DomainPolicy::from_config(&config);
        let classifier = Classifier::from_config(&config);
        Ok(CrawlEngine {
            fetcher,
            config,
            registry,
            surfaces,
            domains,
            classifier,
            seeds: Vec::new(),
            progress_callback: None,
        })
    }

    /// Pre-collected candidate pages, crawled at hop 1 instead of the origin's own links.
    pub fn with_seeds(mut self, seeds: Vec<String>) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Crawl from `origin_input` and score what was found.
    pub async fn run(&self, origin_input: &str) -> Result<BacklinkResult> {
        let origin = Origin::parse(origin_input)?;
        info!(
            "Starting backlink crawl of {} (max_hops={}, workers={})",
            origin.url(),
            self.config.max_hops,
            self.config.workers
        );

        let mut state = RunState::new(origin);
        let budget = RunBudget::new(&self.config);
        let deadline = Instant::now() + self.config.run_budget();
        let mut frontier: VecDeque<CrawlNode> = VecDeque::new();

        let origin_url = state.origin.url().clone();
        state.visited.insert(origin_url.clone());
        state.nodes.insert(
            origin_url.clone(),
            NodeInfo {
                parent: None,
                page_url: origin_url.clone(),
                corroborated: false,
            },
        );

        if self.seeds.is_empty() {
            frontier.push_back(CrawlNode {
                url: origin_url,
                hop: 0,
                parent: None,
            });
        } else {
            self.enqueue_seeds(&mut state, &mut frontier);
        }

        let origin = state.origin.clone();
        state.transition(Phase::Expanding);
        'layers: while !frontier.is_empty() {
            let layer: Vec<CrawlNode> = frontier
                .drain(..)
                .filter(|node| node.hop <= self.config.max_hops)
                .collect();
            debug!("Expanding layer of {} nodes", layer.len());

            let mut next = VecDeque::new();
            let mut fetches = stream::iter(layer)
                .map(|node| self.fetch_node(node, &origin, &budget))
                .buffered(self.config.workers.max(1));

            loop {
                match tokio::time::timeout_at(deadline, fetches.next()).await {
                    Err(_) => {
                        budget.cancel();
                        state.record_budget(Budget::WallClock);
                        break 'layers;
                    }
                    Ok(None) => break,
                    Ok(Some(fetched)) => {
                        if let Some(exhausted) = fetched.exhausted {
                            state.record_budget(exhausted);
                        }
                        self.absorb(&mut state, fetched, &mut next);
                    }
                }
            }

            if budget.is_cancelled() {
                break;
            }
            frontier = next;
        }
        state.transition(Phase::Done);

        let score = score::score(&state.evidence, self.config.max_hops);
        info!(
            "Crawl complete. Visited {} pages ({} links between {} urls), {} evidence records, {} errors, score {} ({})",
            state.visited.len(),
            state.graph.edge_count(),
            state.graph.node_count(),
            state.evidence.len(),
            state.errors.len(),
            score.value,
            score.label.as_str()
        );

        Ok(BacklinkResult {
            origin_url: state.origin.url().to_string(),
            score: score.value,
            label: score.label,
            evidence: state.evidence,
            errors: state.errors,
        })
    }

    fn enqueue_seeds(&self, state: &mut RunState, frontier: &mut VecDeque<CrawlNode>) {
        let origin_url = state.origin.url().clone();
        for raw in &self.seeds {
            let url = match canon::canonicalize(raw) {
                Ok(url) => url,
                Err(e) => {
                    warn!("Skipping seed {}: {}", raw, e);
                    continue;
                }
            };
            if state.is_origin(&url) || !state.visited.insert(url.clone()) {
                continue;
            }
            frontier.push_back(CrawlNode {
                url,
                hop: 1,
                parent: Some(origin_url.clone()),
            });
        }
        info!("Seeded frontier with {} candidate pages", frontier.len());
    }

    async fn fetch_node(
        &self,
        node: CrawlNode,
        origin: &Origin,
        budget: &RunBudget,
    ) -> NodeFetch {
        if budget.is_cancelled() {
            return NodeFetch {
                node,
                outcome: FetchOutcome::Skipped,
                exhausted: None,
            };
        }
        if budget.fetches.fetch_add(1, Ordering::SeqCst) >= budget.max_fetches {
            budget.cancel();
            return NodeFetch {
                node,
                outcome: FetchOutcome::Skipped,
                exhausted: Some(Budget::TotalFetches),
            };
        }

        if let Some(ref callback) = self.progress_callback {
            callback(node.hop, node.url.to_string());
        }

        let mut result = self.fetch_limited(&node.url).await;

        if node.hop == 0
            && result.is_err()
            && let Some(http) = origin.http_fallback()
        {
            debug!("Retrying bare origin over plain HTTP: {}", http);
            result = self.fetch_limited(&http).await;
        }

        let mut exhausted = None;
        let outcome = match result {
            Ok(response) => {
                let len = response.body.len();
                let total = budget.bytes.fetch_add(len, Ordering::SeqCst) + len;
                if total > budget.max_bytes {
                    budget.cancel();
                    exhausted = Some(Budget::TotalBytes);
                }
                FetchOutcome::Fetched(response)
            }
            Err(e) => FetchOutcome::Failed(e),
        };
        NodeFetch {
            node,
            outcome,
            exhausted,
        }
    }

    /// One gateway call with the per-request timeout, size and redirect limits applied.
    async fn fetch_limited(
        &self,
        url: &CanonicalUrl,
    ) -> std::result::Result<FetchResponse, FetchError> {
        debug!("Fetching {}", url);
        let response = tokio::time::timeout(self.config.timeout(), self.fetcher.fetch(url))
            .await
            .map_err(|_| FetchError::Timeout {
                url: url.to_string(),
            })??;

        if response.redirect_chain.len() > self.config.max_redirects {
            return Err(FetchError::RedirectLimitExceeded {
                url: url.to_string(),
                limit: self.config.max_redirects,
            });
        }
        if response.body.len() > self.config.max_content_bytes {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                limit: self.config.max_content_bytes,
            });
        }
        Ok(response)
    }

    fn absorb(&self, state: &mut RunState, fetched: NodeFetch, next: &mut VecDeque<CrawlNode>) {
        let node = fetched.node;
        let response = match fetched.outcome {
            FetchOutcome::Fetched(response) => response,
            FetchOutcome::Skipped => return,
            FetchOutcome::Failed(e) => {
                warn!("Fetch failed for {}: {}", node.url, e);
                state.errors.push(RunError::Fetch(e));
                return;
            }
        };

        if node.hop == 0 && state.origin.is_bare() {
            let served_over_http = canon::canonicalize(&response.final_url)
                .map(|u| u.scheme() == "http")
                .unwrap_or(false);
            if served_over_http && node.url.scheme() == "https" {
                state.errors.push(RunError::OriginFallback {
                    https: node.url.to_string(),
                    http: response.final_url.clone(),
                });
            }
        }

        let page_url = match canon::canonicalize(&response.final_url) {
            Ok(url) => url,
            Err(e) => {
                debug!("Unusable final URL for {}: {}", node.url, e);
                node.url.clone()
            }
        };

        if page_url != node.url {
            if node.hop == 0 {
                info!("Origin redirected to {}; treating it as an alias", page_url);
                state.origin_keys.insert(page_url.clone());
                state.visited.insert(page_url.clone());
            } else {
                self.record_redirect(state, &node, &page_url, &response);
                if state.is_origin(&page_url) || !state.visited.insert(page_url.clone()) {
                    debug!("{} redirected to already visited {}", node.url, page_url);
                    return;
                }
            }
        }

        if !response.is_success() {
            debug!("Skipping {} (HTTP {})", node.url, response.status);
            self.remember(state, &node, &page_url, false);
            return;
        }

        let class = ContentClass::from_content_type(&response.content_type);
        if class.is_binary() {
            debug!("Skipping binary content at {} ({})", node.url, response.content_type);
            self.remember(state, &node, &page_url, false);
            return;
        }

        let extraction = self.registry.extract(&Page {
            url: &page_url,
            content_type: &response.content_type,
            body: &response.body,
        });
        for (recognizer, source) in extraction.failures {
            warn!("Recognizer {} failed on {}: {}", recognizer, page_url, source);
            state.errors.push(RunError::Recognizer {
                url: page_url.to_string(),
                recognizer,
                source,
            });
        }

        let links: Vec<(RawObservation, CanonicalUrl)> = extraction
            .observations
            .into_iter()
            .filter_map(|obs| match canon::resolve(&response.final_url, &obs.target) {
                Ok(target) => Some((obs, target)),
                Err(e) => {
                    debug!("Dropping link {} on {}: {}", obs.target, page_url, e);
                    None
                }
            })
            .collect();

        for (_, target) in &links {
            state.graph.add_link(&node.url, target);
        }

        let surface = if node.hop == 0 {
            Surface::Unknown
        } else {
            self.surfaces
                .classify_surface(&node.url, &state.graph, &state.trusted_nodes)
        };
        if surface.is_trusted() {
            state.trusted_nodes.insert(node.url.clone());
        }

        let corroborated = if node.hop == 0 {
            false
        } else {
            self.classify_node(state, &node, &page_url, surface, &links)
        };
        self.remember(state, &node, &page_url, corroborated);

        let report_only = node.hop > 0 && self.surfaces.is_report_only(&node.url);
        let expand = node.hop == 0
            || (surface != Surface::Untrusted
                && !report_only
                && (!self.config.expand_from_corroborated_only || corroborated));
        if expand && node.hop < self.config.max_hops {
            self.expand(state, &node, &page_url, &links, next);
        } else if report_only {
            debug!("Not expanding report-only page {}", node.url);
        } else if surface == Surface::Untrusted {
            debug!("Not expanding untrusted surface {}", node.url);
        }
    }

    fn remember(
        &self,
        state: &mut RunState,
        node: &CrawlNode,
        page_url: &CanonicalUrl,
        corroborated: bool,
    ) {
        if node.hop == 0 {
            return;
        }
        state.nodes.insert(
            node.url.clone(),
            NodeInfo {
                parent: node.parent.clone(),
                page_url: page_url.clone(),
                corroborated,
            },
        );
    }

    fn record_redirect(
        &self,
        state: &mut RunState,
        node: &CrawlNode,
        page_url: &CanonicalUrl,
        response: &FetchResponse,
    ) {
        let mut hops: Vec<&str> = response.redirect_chain.iter().map(|s| s.as_str()).collect();
        hops.push(&response.final_url);
        let target_context = if state.is_origin(page_url) {
            PageContext::OriginPage
        } else {
            PageContext::CandidatePage
        };
        state.push_evidence(EvidenceDraft {
            kind: EvidenceKind::Redirect,
            source: UrlContext {
                url: node.url.to_string(),
                context: PageContext::CandidatePage,
            },
            target: UrlContext {
                url: page_url.to_string(),
                context: target_context,
            },
            rel: None,
            classification: None,
            hops: node.hop,
            trusted_surface: self.surfaces.classify_static(&node.url).is_trusted(),
            notes: format!("redirect chain: {}", hops.join(" -> ")),
        });
    }

    /// Classify the node's best link back to the origin, or else its link back to its
    /// parent. Returns whether the node is now corroborated.
    fn classify_node(
        &self,
        state: &mut RunState,
        node: &CrawlNode,
        page_url: &CanonicalUrl,
        surface: Surface,
        links: &[(RawObservation, CanonicalUrl)],
    ) -> bool {
        if state.is_self_referential(page_url) {
            debug!("Ignoring self-referential page {}", page_url);
            return false;
        }

        let to_origin = links
            .iter()
            .filter(|(_, target)| state.is_origin(target))
            .min_by_key(|(obs, _)| !obs.is_rel_me());

        let parent_info = node
            .parent
            .as_ref()
            .filter(|p| !state.is_origin(p))
            .and_then(|p| state.nodes.get(p).map(|info| (p, info)));
        let parent_corroborated = parent_info.is_some_and(|(_, info)| info.corroborated);

        let (link_target, observation, target) = match to_origin {
            Some((obs, target)) => (LinkTarget::Origin, obs, target),
            None => {
                let Some((parent, info)) = parent_info else {
                    return false;
                };
                let back = links.iter().find(|(_, target)| {
                    target == parent || *target == info.page_url
                });
                match back {
                    Some((obs, target)) => (LinkTarget::Parent, obs, target),
                    None => return false,
                }
            }
        };

        let chain = state.chain_to(page_url, node.parent.as_ref());
        let draft = self.classifier.classify(&Candidate {
            observation,
            source: page_url,
            target,
            link_target,
            hop: node.hop,
            surface,
            parent_corroborated,
            chain: &chain,
        });

        match draft {
            Some(draft) => {
                let corroborated = classify::corroborates(&draft);
                state.push_evidence(draft);
                corroborated
            }
            None => false,
        }
    }

    fn expand(
        &self,
        state: &mut RunState,
        node: &CrawlNode,
        page_url: &CanonicalUrl,
        links: &[(RawObservation, CanonicalUrl)],
        next: &mut VecDeque<CrawlNode>,
    ) {
        let view: &RunState = state;
        let mut seen = HashSet::new();
        let mut candidates: Vec<CanonicalUrl> = links
            .iter()
            .filter(|(obs, target)| self.should_follow(view, node, page_url, obs, target))
            .filter(|(_, target)| seen.insert(target.clone()))
            .map(|(_, target)| target.clone())
            .collect();

        candidates.sort_by_key(|target| (!canon::same_site(page_url, target), target.path_depth()));
        candidates.truncate(self.config.max_outlinks);

        let mut enqueued = 0;
        for target in candidates {
            if !state.visited.insert(target.clone()) {
                continue;
            }
            next.push_back(CrawlNode {
                url: target,
                hop: node.hop + 1,
                parent: Some(node.url.clone()),
            });
            enqueued += 1;
        }
        debug!("Enqueued {} links from {} at hop {}", enqueued, node.url, node.hop + 1);
    }

    fn should_follow(
        &self,
        state: &RunState,
        node: &CrawlNode,
        page_url: &CanonicalUrl,
        obs: &RawObservation,
        target: &CanonicalUrl,
    ) -> bool {
        if target
            .extension()
            .is_some_and(|ext| ASSET_EXTENSIONS.contains(&ext.as_str()))
        {
            return false;
        }
        if obs.rel.iter().any(|r| ASSET_RELS.contains(&r.as_str())) {
            return false;
        }
        if !obs.is_rel_me() && obs.rel.iter().any(|r| NO_FOLLOW_RELS.contains(&r.as_str())) {
            return false;
        }
        if target == &node.url || target == page_url || state.is_origin(target) {
            return false;
        }
        if state
            .origin_keys
            .iter()
            .any(|o| self.domains.is_own_domain(o, target))
        {
            return false;
        }
        if self.config.only_trusted_surfaces && !self.surfaces.classify_static(target).is_trusted() {
            return false;
        }
        !state.visited.contains(target)
    }
}
