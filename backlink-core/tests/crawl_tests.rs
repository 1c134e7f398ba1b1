// Tests for the crawl engine against an in-memory web

use async_trait::async_trait;
use backlink_core::{
    Budget, CanonicalUrl, ChainMode, Classification, CrawlConfig, CrawlEngine, EvidenceKind,
    FetchError, FetchGateway, FetchResponse, RecognizerBinding, RecognizerSpec, RunError,
    ScoreLabel, crawl_and_score, crawl_and_score_with_seeds,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
enum Reply {
    Page(FetchResponse),
    Fail(FetchError),
    Slow(Duration, FetchResponse),
}

/// Serves canned responses keyed by canonical URL and counts every fetch.
#[derive(Clone, Default)]
struct FakeWeb {
    pages: HashMap<String, Reply>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl FakeWeb {
    fn new() -> Self {
        Self::default()
    }

    fn html(mut self, url: &str, body: &str) -> Self {
        self.pages
            .insert(url.to_string(), Reply::Page(FetchResponse::html(url, body)));
        self
    }

    fn reply(mut self, url: &str, response: FetchResponse) -> Self {
        self.pages.insert(url.to_string(), Reply::Page(response));
        self
    }

    fn fail(mut self, url: &str, error: FetchError) -> Self {
        self.pages.insert(url.to_string(), Reply::Fail(error));
        self
    }

    fn slow(mut self, url: &str, delay: Duration, body: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            Reply::Slow(delay, FetchResponse::html(url, body)),
        );
        self
    }

    fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn fetched(&self) -> HashSet<String> {
        self.hits.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl FetchGateway for FakeWeb {
    async fn fetch(&self, url: &CanonicalUrl) -> Result<FetchResponse, FetchError> {
        {
            let mut hits = self.hits.lock().unwrap();
            *hits.entry(url.to_string()).or_insert(0) += 1;
        }
        match self.pages.get(url.as_str()).cloned() {
            Some(Reply::Page(response)) => Ok(response),
            Some(Reply::Fail(error)) => Err(error),
            Some(Reply::Slow(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            None => Ok(FetchResponse {
                status: 404,
                content_type: "text/html".to_string(),
                body: String::new(),
                final_url: url.to_string(),
                redirect_chain: Vec::new(),
            }),
        }
    }
}

const ORIGIN: &str = "https://alice.example";
const PROFILE: &str = "https://profile.example/alice";
const CODE: &str = "https://code.example/alice";
const MIRROR: &str = "https://mirror.example/list";
const BLOG: &str = "https://blog.other/alice";
const NOTES: &str = "https://notes.third/alice";

fn config() -> CrawlConfig {
    CrawlConfig::default()
        .with_trusted(["profile.example/*", "code.example/*"])
        .with_untrusted(["mirror.example/*"])
}

fn links(hrefs: &[&str]) -> String {
    hrefs
        .iter()
        .map(|h| format!(r#"<a href="{}">link</a>"#, h))
        .collect::<Vec<_>>()
        .join("\n")
}

fn rel_me(href: &str) -> String {
    format!(r#"<a rel="me" href="{}">Alice</a>"#, href)
}

fn count(result: &backlink_core::BacklinkResult, class: Classification) -> usize {
    result
        .evidence
        .iter()
        .filter(|e| e.classification == Some(class))
        .count()
}

fn strong_web() -> FakeWeb {
    FakeWeb::new()
        .html(ORIGIN, &links(&[PROFILE]))
        .html(PROFILE, &rel_me("https://alice.example/"))
}

// ============================================================================
// Scoring Scenarios
// ============================================================================

#[tokio::test]
async fn test_scenario_strong() {
    let result = crawl_and_score(ORIGIN, strong_web(), config()).await.unwrap();

    assert_eq!(count(&result, Classification::Strong), 1);
    assert_eq!(count(&result, Classification::Weak), 0);
    assert_eq!(count(&result, Classification::Indirect), 0);
    assert_eq!(result.score, 85);
    assert_eq!(result.label, ScoreLabel::High);
    assert!(result.errors.is_empty());

    let strong = result
        .evidence
        .iter()
        .find(|e| e.classification == Some(Classification::Strong))
        .unwrap();
    assert_eq!(strong.source.url, PROFILE);
    assert_eq!(strong.target.url, ORIGIN);
    assert_eq!(strong.hops, 1);
    assert!(strong.trusted_surface);
    assert_eq!(strong.link.as_ref().unwrap().rel, vec!["me".to_string()]);
}

#[tokio::test]
async fn test_scenario_two_weak() {
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[PROFILE, CODE]))
        .html(PROFILE, &links(&[ORIGIN]))
        .html(CODE, &links(&[ORIGIN]));

    let result = crawl_and_score(ORIGIN, web, config()).await.unwrap();

    assert_eq!(count(&result, Classification::Weak), 2);
    assert_eq!(result.score, 50);
    assert_eq!(result.label, ScoreLabel::Medium);
}

#[tokio::test]
async fn test_scenario_indirect_only() {
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[BLOG]))
        .html(BLOG, &links(&[ORIGIN, NOTES]))
        .html(NOTES, &links(&[BLOG]));

    let result = crawl_and_score(ORIGIN, web, config()).await.unwrap();

    assert_eq!(count(&result, Classification::Indirect), 1);
    assert_eq!(count(&result, Classification::Strong), 0);
    assert_eq!(count(&result, Classification::Weak), 0);
    assert_eq!(result.score, 2);
    assert_eq!(result.label, ScoreLabel::Low);

    let indirect = result
        .evidence
        .iter()
        .find(|e| e.classification == Some(Classification::Indirect))
        .unwrap();
    assert_eq!(indirect.source.url, NOTES);
    assert_eq!(indirect.target.url, BLOG);
    assert_eq!(indirect.hops, 2);
    assert!(indirect.notes.contains("pivot=https://blog.other/alice"));
    assert!(
        indirect
            .notes
            .contains("chain=https://alice.example -> https://blog.other/alice")
    );

    let mention = result
        .evidence
        .iter()
        .find(|e| e.kind == EvidenceKind::Mention)
        .unwrap();
    assert_eq!(mention.source.url, BLOG);
    assert_eq!(mention.classification, None);
}

#[tokio::test]
async fn test_uncorroborated_chain_is_not_indirect() {
    // The hop-1 page never links back, so its children cannot corroborate anything.
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[BLOG]))
        .html(BLOG, &links(&[NOTES]))
        .html(NOTES, &links(&[ORIGIN, BLOG]));

    let result = crawl_and_score(ORIGIN, web, config()).await.unwrap();

    assert_eq!(count(&result, Classification::Indirect), 0);
    assert_eq!(result.score, 0);
}

#[tokio::test]
async fn test_relaxed_chain_counts_far_links() {
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[BLOG]))
        .html(BLOG, &links(&[NOTES]))
        .html(NOTES, &links(&[ORIGIN]));

    let result = crawl_and_score(ORIGIN, web, config().with_chain_mode(ChainMode::Relaxed))
        .await
        .unwrap();

    assert_eq!(count(&result, Classification::Indirect), 1);
    assert_eq!(result.score, 2);
}

#[tokio::test]
async fn test_scenario_aggregator_only() {
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[MIRROR]))
        .html(MIRROR, &links(&[ORIGIN, "https://elsewhere.example"]));

    let result = crawl_and_score(ORIGIN, web.clone(), config())
        .await
        .unwrap();

    assert_eq!(count(&result, Classification::Excluded), 1);
    assert_eq!(result.score, 0);
    assert_eq!(result.label, ScoreLabel::Low);
    // Untrusted pages are read but never expanded.
    assert_eq!(web.hits(MIRROR), 1);
    assert_eq!(web.hits("https://elsewhere.example"), 0);
}

#[tokio::test]
async fn test_scenario_mixed() {
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[PROFILE, MIRROR]))
        .html(PROFILE, &rel_me(ORIGIN))
        .html(MIRROR, &links(&[ORIGIN]));

    let result = crawl_and_score(ORIGIN, web, config()).await.unwrap();

    assert_eq!(count(&result, Classification::Strong), 1);
    assert_eq!(count(&result, Classification::Excluded), 1);
    assert_eq!(result.score, 85);
    assert_eq!(result.label, ScoreLabel::High);
}

#[tokio::test]
async fn test_default_lists_count_social_profiles_as_strong() {
    let profile = "https://x.com/alice";
    let other = "https://x.com/bob";
    let web = FakeWeb::new()
        .html(ORIGIN, &rel_me(profile))
        .html(profile, &format!("{}\n{}", rel_me(ORIGIN), links(&[other])));

    let result = crawl_and_score(ORIGIN, web.clone(), CrawlConfig::default())
        .await
        .unwrap();

    assert_eq!(count(&result, Classification::Strong), 1);
    assert_eq!(count(&result, Classification::Excluded), 0);
    assert_eq!(result.score, 85);
    assert_eq!(result.label, ScoreLabel::High);
    // report-only hosts are never expanded
    assert_eq!(web.hits(other), 0);
}

// ============================================================================
// Origin Handling
// ============================================================================

#[tokio::test]
async fn test_bare_and_https_origin_match() {
    let bare = crawl_and_score("alice.example", strong_web(), config())
        .await
        .unwrap();
    let full = crawl_and_score(ORIGIN, strong_web(), config())
        .await
        .unwrap();

    assert_eq!(bare.origin_url, full.origin_url);
    assert_eq!(bare.score, full.score);
    assert_eq!(bare.label, full.label);
    let ids = |r: &backlink_core::BacklinkResult| {
        r.evidence.iter().map(|e| e.id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&bare), ids(&full));
}

#[tokio::test]
async fn test_bare_origin_falls_back_to_http() {
    let web = FakeWeb::new()
        .fail(
            "https://bare.example",
            FetchError::Network {
                url: "https://bare.example".to_string(),
                reason: "connection refused".to_string(),
            },
        )
        .html("http://bare.example", &links(&[PROFILE]))
        .html(PROFILE, &rel_me("http://bare.example"));

    let result = crawl_and_score("bare.example", web.clone(), config())
        .await
        .unwrap();

    assert_eq!(web.hits("http://bare.example"), 1);
    assert_eq!(count(&result, Classification::Strong), 1);
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(result.errors[0], RunError::OriginFallback { .. }));
}

#[tokio::test]
async fn test_malformed_origin_is_fatal() {
    let err = crawl_and_score("https://", FakeWeb::new(), config()).await;
    assert!(err.is_err());
    let err = crawl_and_score("   ", FakeWeb::new(), config()).await;
    assert!(err.is_err());
}

#[tokio::test]
async fn test_origin_redirect_becomes_alias() {
    let web = FakeWeb::new()
        .reply(
            ORIGIN,
            FetchResponse {
                status: 200,
                content_type: "text/html".to_string(),
                body: links(&[PROFILE]),
                final_url: "https://www.alice.example/home".to_string(),
                redirect_chain: vec![ORIGIN.to_string()],
            },
        )
        .html(PROFILE, &rel_me("https://www.alice.example/home"));

    let result = crawl_and_score(ORIGIN, web, config()).await.unwrap();

    assert_eq!(count(&result, Classification::Strong), 1);
    assert!(result.evidence.iter().all(|e| e.kind != EvidenceKind::Redirect));
}

#[tokio::test]
async fn test_unreachable_origin_reports_error() {
    let web = FakeWeb::new().fail(
        ORIGIN,
        FetchError::Blocked {
            url: ORIGIN.to_string(),
            status: 403,
        },
    );

    let result = crawl_and_score(ORIGIN, web, config()).await.unwrap();

    assert!(result.evidence.is_empty());
    assert_eq!(result.score, 0);
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(
        result.errors[0],
        RunError::Fetch(FetchError::Blocked { status: 403, .. })
    ));
}

// ============================================================================
// Traversal Bounds
// ============================================================================

fn bfs_within(graph: &HashMap<usize, Vec<usize>>, max_hops: usize) -> HashSet<usize> {
    let mut dist = HashMap::new();
    let mut queue = VecDeque::new();
    dist.insert(0usize, 0usize);
    queue.push_back(0usize);
    while let Some(node) = queue.pop_front() {
        let d = dist[&node];
        if d == max_hops {
            continue;
        }
        for next in graph.get(&node).into_iter().flatten() {
            if !dist.contains_key(next) {
                dist.insert(*next, d + 1);
                queue.push_back(*next);
            }
        }
    }
    dist.keys().copied().collect()
}

fn node_url(i: usize) -> String {
    format!("https://n{}.example", i)
}

#[tokio::test]
async fn test_random_cyclic_graphs_visit_each_url_once() {
    for seed in 0..25u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let size = rng.gen_range(5..30);
        let mut graph: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut web = FakeWeb::new();

        for i in 0..size {
            let degree = rng.gen_range(0..5);
            let targets: Vec<usize> = (0..degree).map(|_| rng.gen_range(0..size)).collect();
            let mut body: Vec<String> = targets.iter().map(|t| node_url(*t)).collect();
            if rng.gen_bool(0.3) {
                body.push(node_url(0));
            }
            graph.insert(i, targets);
            let hrefs: Vec<&str> = body.iter().map(|s| s.as_str()).collect();
            web = web.html(&node_url(i), &links(&hrefs));
        }

        let max_hops = 3;
        let config = config().with_max_hops(max_hops);
        let result = crawl_and_score(&node_url(0), web.clone(), config)
            .await
            .unwrap();

        let hits = web.hits.lock().unwrap().clone();
        assert!(
            hits.values().all(|h| *h == 1),
            "seed {}: a URL was fetched twice",
            seed
        );

        let expected: HashSet<String> = bfs_within(&graph, max_hops)
            .into_iter()
            .map(node_url)
            .collect();
        assert_eq!(web.fetched(), expected, "seed {}", seed);

        for record in &result.evidence {
            assert!(record.hops >= 1 && record.hops <= max_hops, "seed {}", seed);
        }
    }
}

#[tokio::test]
async fn test_max_hops_bounds_traversal() {
    let a = "https://a.example";
    let b = "https://b.example";
    let c = "https://c.example";
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[a]))
        .html(a, &links(&[b]))
        .html(b, &links(&[c]))
        .html(c, &links(&[ORIGIN]));

    crawl_and_score(ORIGIN, web.clone(), config().with_max_hops(1))
        .await
        .unwrap();

    assert_eq!(web.hits(a), 1);
    assert_eq!(web.hits(b), 0);
    assert_eq!(web.hits(c), 0);
}

#[tokio::test]
async fn test_outlink_cap_prefers_same_site_and_shallow_paths() {
    let hub = "https://hub.example";
    let deep = "https://far.example/a/b/c";
    let shallow = "https://far.example/a";
    let sibling = "https://hub.example/deep/er/page";
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[hub]))
        .html(hub, &links(&[deep, shallow, sibling]));

    let mut config = config();
    config.max_outlinks = 2;
    crawl_and_score(ORIGIN, web.clone(), config).await.unwrap();

    assert_eq!(web.hits(sibling), 1);
    assert_eq!(web.hits(shallow), 1);
    assert_eq!(web.hits(deep), 0);
}

#[tokio::test]
async fn test_own_domain_is_not_followed() {
    let sub = "https://blog.alice.example/post";
    let web = FakeWeb::new().html(ORIGIN, &links(&[sub, "https://alice.example/about"]));

    crawl_and_score(ORIGIN, web.clone(), config()).await.unwrap();

    assert_eq!(web.hits(sub), 0);
    assert_eq!(web.hits("https://alice.example/about"), 0);
}

#[tokio::test]
async fn test_assets_and_nofollow_are_not_followed() {
    let body = format!(
        r#"<link rel="stylesheet" href="https://cdn.example/site">
        <a href="https://cdn.example/logo.png">logo</a>
        <a rel="nofollow" href="https://ads.example">ad</a>
        <a rel="me nofollow" href="{}">me</a>"#,
        PROFILE
    );
    let web = FakeWeb::new()
        .html(ORIGIN, &body)
        .html(PROFILE, &rel_me(ORIGIN));

    let result = crawl_and_score(ORIGIN, web.clone(), config()).await.unwrap();

    assert_eq!(web.hits("https://cdn.example/site"), 0);
    assert_eq!(web.hits("https://cdn.example/logo.png"), 0);
    assert_eq!(web.hits("https://ads.example"), 0);
    assert_eq!(web.hits(PROFILE), 1);
    assert_eq!(result.score, 85);
}

#[tokio::test]
async fn test_only_trusted_surfaces_restricts_frontier() {
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[PROFILE, BLOG]))
        .html(PROFILE, &rel_me(ORIGIN))
        .html(BLOG, &rel_me(ORIGIN));

    let result = crawl_and_score(
        ORIGIN,
        web.clone(),
        config().with_only_trusted_surfaces(true),
    )
    .await
    .unwrap();

    assert_eq!(web.hits(BLOG), 0);
    assert_eq!(count(&result, Classification::Strong), 1);
}

#[tokio::test]
async fn test_only_strong_links_demotes_weak() {
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[PROFILE, CODE]))
        .html(PROFILE, &links(&[ORIGIN]))
        .html(CODE, &links(&[ORIGIN]));

    let result = crawl_and_score(ORIGIN, web, config().with_only_strong_links(true))
        .await
        .unwrap();

    assert_eq!(count(&result, Classification::Weak), 0);
    assert_eq!(count(&result, Classification::Excluded), 2);
    assert_eq!(result.score, 0);
}

#[tokio::test]
async fn test_expand_from_corroborated_only() {
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[BLOG]))
        .html(BLOG, &links(&[NOTES]));

    let mut strict = config();
    strict.expand_from_corroborated_only = true;
    crawl_and_score(ORIGIN, web.clone(), strict).await.unwrap();
    assert_eq!(web.hits(BLOG), 1);
    assert_eq!(web.hits(NOTES), 0);

    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[BLOG]))
        .html(BLOG, &links(&[NOTES]));
    crawl_and_score(ORIGIN, web.clone(), config()).await.unwrap();
    assert_eq!(web.hits(NOTES), 1);
}

#[tokio::test]
async fn test_expand_from_corroborated_only_follows_backlinkers() {
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[PROFILE]))
        .html(PROFILE, &format!("{}\n{}", rel_me(ORIGIN), links(&[CODE])));

    let mut config = config();
    config.expand_from_corroborated_only = true;
    crawl_and_score(ORIGIN, web.clone(), config).await.unwrap();

    assert_eq!(web.hits(CODE), 1);
}

#[tokio::test]
async fn test_seeds_skip_origin_fetch() {
    let web = FakeWeb::new().html(PROFILE, &rel_me(ORIGIN));

    let result = crawl_and_score_with_seeds(
        ORIGIN,
        vec![PROFILE.to_string(), "not a url".to_string()],
        web.clone(),
        config(),
    )
    .await
    .unwrap();

    assert_eq!(web.hits(ORIGIN), 0);
    assert_eq!(count(&result, Classification::Strong), 1);
    assert_eq!(result.score, 85);
}

// ============================================================================
// Fetch Failures and Budgets
// ============================================================================

#[tokio::test]
async fn test_fetch_failure_is_recoverable() {
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[CODE, PROFILE]))
        .fail(
            CODE,
            FetchError::Network {
                url: CODE.to_string(),
                reason: "reset".to_string(),
            },
        )
        .html(PROFILE, &rel_me(ORIGIN));

    let result = crawl_and_score(ORIGIN, web, config()).await.unwrap();

    assert_eq!(result.score, 85);
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(
        result.errors[0],
        RunError::Fetch(FetchError::Network { .. })
    ));
}

#[tokio::test]
async fn test_oversized_page_is_rejected() {
    let big = format!("{}{}", rel_me(ORIGIN), " ".repeat(200));
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[PROFILE]))
        .html(PROFILE, &big);

    let mut config = config();
    config.max_content_bytes = 100;
    let result = crawl_and_score(ORIGIN, web, config).await.unwrap();

    assert_eq!(result.score, 0);
    assert!(result
        .errors
        .iter()
        .any(|e| matches!(e, RunError::Fetch(FetchError::TooLarge { limit: 100, .. }))));
}

#[tokio::test(start_paused = true)]
async fn test_slow_page_times_out() {
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[PROFILE]))
        .slow(PROFILE, Duration::from_secs(30), &rel_me(ORIGIN));

    let result = crawl_and_score(ORIGIN, web, config()).await.unwrap();

    assert_eq!(result.score, 0);
    assert!(matches!(
        result.errors[0],
        RunError::Fetch(FetchError::Timeout { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_wall_clock_budget_returns_partial_evidence() {
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[PROFILE, BLOG]))
        .html(PROFILE, &rel_me(ORIGIN))
        .slow(BLOG, Duration::from_secs(4), &links(&[NOTES]));

    let mut config = config();
    config.max_run_secs = 3;
    config.workers = 1;
    let result = crawl_and_score(ORIGIN, web.clone(), config).await.unwrap();

    assert_eq!(count(&result, Classification::Strong), 1);
    assert!(result.errors.contains(&RunError::BudgetExhausted(Budget::WallClock)));
    assert_eq!(web.hits(NOTES), 0);
}

#[tokio::test]
async fn test_fetch_budget_stops_crawl() {
    let a = "https://a.example";
    let b = "https://b.example";
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[a]))
        .html(a, &links(&[b]))
        .html(b, &links(&[ORIGIN]));

    let mut config = config();
    config.max_total_fetches = 2;
    let result = crawl_and_score(ORIGIN, web.clone(), config).await.unwrap();

    assert_eq!(web.hits(b), 0);
    assert!(result
        .errors
        .contains(&RunError::BudgetExhausted(Budget::TotalFetches)));
}

// ============================================================================
// Redirects and Recognizers
// ============================================================================

#[tokio::test]
async fn test_redirect_is_recorded_without_scoring() {
    let old = "https://profile.example/old-alice";
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[old]))
        .reply(
            old,
            FetchResponse {
                status: 200,
                content_type: "text/html".to_string(),
                body: rel_me(ORIGIN),
                final_url: PROFILE.to_string(),
                redirect_chain: vec![old.to_string()],
            },
        );

    let result = crawl_and_score(ORIGIN, web, config()).await.unwrap();

    let redirect = result
        .evidence
        .iter()
        .find(|e| e.kind == EvidenceKind::Redirect)
        .unwrap();
    assert_eq!(redirect.source.url, old);
    assert_eq!(redirect.target.url, PROFILE);
    assert_eq!(redirect.classification, None);

    let strong = result
        .evidence
        .iter()
        .find(|e| e.classification == Some(Classification::Strong))
        .unwrap();
    assert_eq!(strong.source.url, PROFILE);
    assert_eq!(result.score, 85);
}

#[tokio::test]
async fn test_redirect_limit_exceeded() {
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[PROFILE]))
        .reply(
            PROFILE,
            FetchResponse {
                status: 200,
                content_type: "text/html".to_string(),
                body: rel_me(ORIGIN),
                final_url: "https://profile.example/final".to_string(),
                redirect_chain: (0..6)
                    .map(|i| format!("https://profile.example/r{}", i))
                    .collect(),
            },
        );

    let result = crawl_and_score(ORIGIN, web, config()).await.unwrap();

    assert_eq!(result.score, 0);
    assert!(matches!(
        result.errors[0],
        RunError::Fetch(FetchError::RedirectLimitExceeded { limit: 5, .. })
    ));
}

#[tokio::test]
async fn test_bad_recognizer_is_recoverable() {
    let config = config().with_recognizer(RecognizerBinding {
        pattern: "profile.example/*".to_string(),
        recognizer: RecognizerSpec::Selector {
            selector: "div >".to_string(),
            attr: "href".to_string(),
        },
    });

    let result = crawl_and_score(ORIGIN, strong_web(), config).await.unwrap();

    assert_eq!(result.score, 85);
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(result.errors[0], RunError::Recognizer { .. }));
}

#[tokio::test]
async fn test_structured_path_recognizer_finds_backlink() {
    let api = "https://api.profile.example/users/alice";
    let json = r#"{"user": {"links": [{"rel": "me", "href": "https://alice.example"}]}}"#;
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[api]))
        .reply(
            api,
            FetchResponse {
                status: 200,
                content_type: "application/json".to_string(),
                body: json.to_string(),
                final_url: api.to_string(),
                redirect_chain: Vec::new(),
            },
        );

    let config = config()
        .with_trusted(["api.profile.example/*"])
        .with_recognizer(RecognizerBinding {
            pattern: "api.profile.example/users/*".to_string(),
            recognizer: RecognizerSpec::JsonPath {
                path: "$.user.links[*].href".to_string(),
            },
        });

    let result = crawl_and_score(ORIGIN, web, config).await.unwrap();

    assert_eq!(count(&result, Classification::Weak), 1);
    assert_eq!(result.score, 25);
}

#[tokio::test]
async fn test_binary_content_is_skipped() {
    let web = FakeWeb::new()
        .html(ORIGIN, &links(&[PROFILE]))
        .reply(
            PROFILE,
            FetchResponse {
                status: 200,
                content_type: "image/png".to_string(),
                body: rel_me(ORIGIN),
                final_url: PROFILE.to_string(),
                redirect_chain: Vec::new(),
            },
        );

    let result = crawl_and_score(ORIGIN, web, config()).await.unwrap();

    assert!(result.evidence.is_empty());
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn test_engine_reports_progress() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let engine = CrawlEngine::new(strong_web(), config())
        .unwrap()
        .with_progress_callback(Arc::new(move |hop: usize, url: String| {
            sink.lock().unwrap().push((hop, url));
        }));

    engine.run(ORIGIN).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![(0, ORIGIN.to_string()), (1, PROFILE.to_string())]
    );
}
