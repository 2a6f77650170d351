//! End-to-end engine behavior against a scripted upstream.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use tokio::time::sleep;

use eventide_core::Engine;
use eventide_core::EngineConfig;
use eventide_core::EventQuery;
use eventide_core::EventRecord;
use eventide_core::FetchError;
use eventide_core::FetchOptions;
use eventide_core::FetchStatus;
use eventide_core::MemoryStore;
use eventide_core::ProvenanceSource;
use eventide_core::SeedProvider;
use eventide_core::StaticSeedProvider;
use eventide_core::Tier;
use eventide_core::UpstreamBatch;
use eventide_core::UpstreamClient;

/// One scripted upstream response.
enum Outcome {
    Events(Vec<Value>, Vec<ProvenanceSource>),
    RateLimited,
    Malformed,
    Unavailable,
}

struct ScriptedCall {
    delay: Duration,
    outcome: Outcome,
}

impl ScriptedCall {
    fn immediate(outcome: Outcome) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome,
        }
    }
}

/// Upstream double that replays a fixed script and records which tiers were
/// called, in order.
#[derive(Default)]
struct ScriptedClient {
    script: Mutex<VecDeque<ScriptedCall>>,
    calls: Mutex<Vec<Tier>>,
}

impl ScriptedClient {
    fn push(&self, call: ScriptedCall) {
        self.script.lock().unwrap().push_back(call);
    }

    fn calls(&self) -> Vec<Tier> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamClient for ScriptedClient {
    async fn call(&self, _query: &EventQuery, tier: Tier) -> Result<UpstreamBatch, FetchError> {
        self.calls.lock().unwrap().push(tier);
        let scripted = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ScriptedCall::immediate(Outcome::Unavailable));
        if scripted.delay > Duration::ZERO {
            sleep(scripted.delay).await;
        }
        match scripted.outcome {
            Outcome::Events(events, sources) => Ok(UpstreamBatch { events, sources }),
            Outcome::RateLimited => Err(FetchError::RateLimited {
                retry_after_secs: None,
            }),
            Outcome::Malformed => Err(FetchError::Malformed("scripted prose".to_string())),
            Outcome::Unavailable => Err(FetchError::Unavailable("scripted outage".to_string())),
        }
    }
}

/// Seed provider that has nothing, so tier behavior is observable unmixed.
struct NoSeeds;

impl SeedProvider for NoSeeds {
    fn seed(&self, _region: &str, _category: Option<&str>) -> Vec<EventRecord> {
        Vec::new()
    }
}

fn raw_event(title: &str) -> Value {
    json!({
        "title": title,
        "category": "Entertainment",
        "description": "d",
        "date": "01/02/2026",
        "location": "Tulsa, OK"
    })
}

fn source() -> ProvenanceSource {
    ProvenanceSource {
        title: "Tulsa World".to_string(),
        uri: "https://example.com".to_string(),
    }
}

fn engine_with(config: EngineConfig, client: Arc<ScriptedClient>) -> Engine {
    Engine::new(config, Box::new(MemoryStore::new()), client).with_seed_provider(Arc::new(NoSeeds))
}

fn default_engine(client: Arc<ScriptedClient>) -> Engine {
    engine_with(EngineConfig::default(), client)
}

fn query() -> EventQuery {
    EventQuery::new("Tulsa")
}

#[tokio::test]
async fn grounded_success_with_sources_reports_grounded() {
    let client = Arc::new(ScriptedClient::default());
    client.push(ScriptedCall::immediate(Outcome::Events(
        vec![raw_event("A")],
        vec![source()],
    )));
    let engine = default_engine(client.clone());

    let result = engine.fetch(&query(), FetchOptions::default()).await.unwrap();
    assert_eq!(result.status, FetchStatus::Grounded);
    assert_eq!(result.events.len(), 1);
    assert_eq!(client.calls(), vec![Tier::Grounded]);
}

#[tokio::test]
async fn grounded_success_without_sources_reports_ai() {
    let client = Arc::new(ScriptedClient::default());
    client.push(ScriptedCall::immediate(Outcome::Events(
        vec![raw_event("A")],
        Vec::new(),
    )));
    let engine = default_engine(client.clone());

    let result = engine.fetch(&query(), FetchOptions::default()).await.unwrap();
    assert_eq!(result.status, FetchStatus::Ai);
}

#[tokio::test]
async fn second_fetch_within_ttl_never_touches_upstream() {
    let client = Arc::new(ScriptedClient::default());
    client.push(ScriptedCall::immediate(Outcome::Events(
        vec![raw_event("A")],
        Vec::new(),
    )));
    let engine = default_engine(client.clone());

    let first = engine.fetch(&query(), FetchOptions::default()).await.unwrap();
    let second = engine.fetch(&query(), FetchOptions::default()).await.unwrap();

    assert_eq!(second.status, FetchStatus::Cache);
    assert_eq!(second.events, first.events);
    assert_eq!(client.calls().len(), 1);
}

#[tokio::test]
async fn force_refresh_bypasses_a_fresh_cache_entry() {
    let client = Arc::new(ScriptedClient::default());
    client.push(ScriptedCall::immediate(Outcome::Events(
        vec![raw_event("Old")],
        Vec::new(),
    )));
    client.push(ScriptedCall::immediate(Outcome::Events(
        vec![raw_event("New")],
        Vec::new(),
    )));
    let engine = default_engine(client.clone());

    engine.fetch(&query(), FetchOptions::default()).await.unwrap();
    let refreshed = engine
        .fetch(
            &query(),
            FetchOptions {
                force_refresh: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(refreshed.status, FetchStatus::Ai);
    assert_eq!(refreshed.events[0].title, "New");
    assert_eq!(client.calls().len(), 2);
}

#[tokio::test]
async fn grounded_rate_limit_falls_back_to_base_and_marks_only_grounded() {
    let client = Arc::new(ScriptedClient::default());
    client.push(ScriptedCall::immediate(Outcome::RateLimited));
    client.push(ScriptedCall::immediate(Outcome::Events(
        vec![raw_event("A")],
        Vec::new(),
    )));
    let engine = default_engine(client.clone());

    let result = engine.fetch(&query(), FetchOptions::default()).await.unwrap();

    assert_eq!(result.status, FetchStatus::Ai);
    assert_eq!(client.calls(), vec![Tier::Grounded, Tier::Base]);
    assert!(engine.quota().is_exhausted(Tier::Grounded));
    assert!(!engine.quota().is_exhausted(Tier::Base));
}

#[tokio::test]
async fn base_rate_limit_returns_quota_limited_with_zero_events() {
    let client = Arc::new(ScriptedClient::default());
    client.push(ScriptedCall::immediate(Outcome::RateLimited));
    client.push(ScriptedCall::immediate(Outcome::RateLimited));
    let engine = default_engine(client.clone());

    let result = engine.fetch(&query(), FetchOptions::default()).await.unwrap();

    assert_eq!(result.status, FetchStatus::QuotaLimited);
    assert!(result.events.is_empty());
    assert!(engine.quota().is_exhausted(Tier::Grounded));
    assert!(engine.quota().is_exhausted(Tier::Base));
}

#[tokio::test]
async fn exhausted_grounded_tier_is_skipped_entirely() {
    let client = Arc::new(ScriptedClient::default());
    client.push(ScriptedCall::immediate(Outcome::Events(
        vec![raw_event("A")],
        Vec::new(),
    )));
    let engine = default_engine(client.clone());
    engine.quota().mark_exhausted(Tier::Grounded, Duration::from_secs(60));

    let result = engine.fetch(&query(), FetchOptions::default()).await.unwrap();

    assert_eq!(result.status, FetchStatus::Ai);
    assert_eq!(client.calls(), vec![Tier::Base]);
}

#[tokio::test]
async fn quota_window_self_heals() {
    let client = Arc::new(ScriptedClient::default());
    client.push(ScriptedCall::immediate(Outcome::Events(
        vec![raw_event("A")],
        vec![source()],
    )));
    let engine = default_engine(client.clone());
    engine.quota().mark_exhausted(Tier::Grounded, Duration::from_millis(50));

    sleep(Duration::from_millis(80)).await;
    let result = engine.fetch(&query(), FetchOptions::default()).await.unwrap();

    assert_eq!(result.status, FetchStatus::Grounded);
    assert_eq!(client.calls(), vec![Tier::Grounded]);
}

#[tokio::test]
async fn success_clears_a_previously_exhausted_tier() {
    let client = Arc::new(ScriptedClient::default());
    client.push(ScriptedCall::immediate(Outcome::Events(
        vec![raw_event("A")],
        Vec::new(),
    )));
    let engine = default_engine(client.clone());
    engine.quota().mark_exhausted(Tier::Base, Duration::from_millis(10));

    sleep(Duration::from_millis(30)).await;
    // Grounded succeeds; base stays untouched but its window has lapsed.
    engine.fetch(&query(), FetchOptions::default()).await.unwrap();
    assert!(!engine.quota().is_exhausted(Tier::Grounded));
    assert!(!engine.quota().is_exhausted(Tier::Base));
}

#[tokio::test]
async fn non_quota_failures_fall_back_to_stale_cache() {
    let client = Arc::new(ScriptedClient::default());
    client.push(ScriptedCall::immediate(Outcome::Events(
        vec![raw_event("Cached")],
        Vec::new(),
    )));
    client.push(ScriptedCall::immediate(Outcome::Unavailable));
    client.push(ScriptedCall::immediate(Outcome::Unavailable));

    // ttl of zero: every entry is stale the moment it lands.
    let config = EngineConfig {
        ttl_secs: 0,
        ttl_global_secs: 0,
        ..Default::default()
    };
    let engine = engine_with(config, client.clone());

    engine.fetch(&query(), FetchOptions::default()).await.unwrap();
    let fallback = engine.fetch(&query(), FetchOptions::default()).await.unwrap();

    assert_eq!(fallback.status, FetchStatus::Cache);
    assert_eq!(fallback.events[0].title, "Cached");
    assert_eq!(client.calls().len(), 3);
    // Outages are not quota events: both tiers stay open.
    assert!(!engine.quota().is_exhausted(Tier::Grounded));
    assert!(!engine.quota().is_exhausted(Tier::Base));
}

#[tokio::test]
async fn malformed_payloads_leave_quota_untouched() {
    let client = Arc::new(ScriptedClient::default());
    client.push(ScriptedCall::immediate(Outcome::Malformed));
    client.push(ScriptedCall::immediate(Outcome::Malformed));
    let engine = default_engine(client.clone());

    // Both tiers fail to produce a payload; with no cache and no seeds the
    // fetch yields nothing, but neither tier gets a backoff window.
    assert!(engine.fetch(&query(), FetchOptions::default()).await.is_none());
    assert_eq!(client.calls(), vec![Tier::Grounded, Tier::Base]);
    assert!(!engine.quota().is_exhausted(Tier::Grounded));
    assert!(!engine.quota().is_exhausted(Tier::Base));
}

#[tokio::test]
async fn with_no_cache_and_no_tiers_the_seed_baseline_serves() {
    let client = Arc::new(ScriptedClient::default());
    client.push(ScriptedCall::immediate(Outcome::Unavailable));
    client.push(ScriptedCall::immediate(Outcome::Unavailable));
    let engine = Engine::new(
        EngineConfig::default(),
        Box::new(MemoryStore::new()),
        client,
    )
    .with_seed_provider(Arc::new(StaticSeedProvider::builtin()));

    let result = engine.fetch(&query(), FetchOptions::default()).await.unwrap();
    assert_eq!(result.status, FetchStatus::Seed);
    assert!(!result.events.is_empty());
}

#[tokio::test]
async fn nothing_anywhere_yields_none() {
    let client = Arc::new(ScriptedClient::default());
    client.push(ScriptedCall::immediate(Outcome::Unavailable));
    client.push(ScriptedCall::immediate(Outcome::Unavailable));
    let engine = default_engine(client);

    assert!(engine.fetch(&query(), FetchOptions::default()).await.is_none());
}

#[tokio::test]
async fn superseding_fetch_discards_the_older_result() {
    let client = Arc::new(ScriptedClient::default());
    client.push(ScriptedCall {
        delay: Duration::from_millis(200),
        outcome: Outcome::Events(vec![raw_event("Slow")], Vec::new()),
    });
    client.push(ScriptedCall::immediate(Outcome::Events(
        vec![raw_event("Fast")],
        Vec::new(),
    )));
    let engine = Arc::new(default_engine(client));

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.fetch(&query(), FetchOptions::default()).await })
    };
    sleep(Duration::from_millis(50)).await;

    let second = engine.fetch(&query(), FetchOptions::default()).await.unwrap();
    assert_eq!(second.events[0].title, "Fast");

    // The superseded call delivers nothing.
    assert!(first.await.unwrap().is_none());

    // And it never wrote to the cache: a follow-up hit is still "Fast".
    let cached = engine.fetch(&query(), FetchOptions::default()).await.unwrap();
    assert_eq!(cached.status, FetchStatus::Cache);
    assert_eq!(cached.events[0].title, "Fast");
}

#[tokio::test]
async fn pagination_excludes_titles_from_prior_pages() {
    let client = Arc::new(ScriptedClient::default());
    client.push(ScriptedCall::immediate(Outcome::Events(
        vec![raw_event("A"), raw_event("B")],
        Vec::new(),
    )));
    client.push(ScriptedCall::immediate(Outcome::Events(
        vec![raw_event("B"), raw_event("C")],
        Vec::new(),
    )));
    let engine = default_engine(client);

    let page1 = engine.fetch(&query(), FetchOptions::default()).await.unwrap();
    let titles: Vec<String> = page1.events.iter().map(|e| e.title.clone()).collect();

    let mut page2_query = query();
    page2_query.page = 2;
    let page2 = engine
        .fetch(
            &page2_query,
            FetchOptions {
                exclude_titles: titles.clone(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(page2.events.len(), 1);
    assert_eq!(page2.events[0].title, "C");
    for event in &page2.events {
        assert!(!titles.contains(&event.title));
    }
}

#[tokio::test]
async fn stale_entry_is_announced_before_the_refresh_lands() {
    let client = Arc::new(ScriptedClient::default());
    client.push(ScriptedCall::immediate(Outcome::Events(
        vec![raw_event("Old")],
        Vec::new(),
    )));
    client.push(ScriptedCall::immediate(Outcome::Events(
        vec![raw_event("New")],
        Vec::new(),
    )));
    let config = EngineConfig {
        ttl_secs: 0,
        ..Default::default()
    };
    let engine = engine_with(config, client);

    engine.fetch(&query(), FetchOptions::default()).await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let fresh = engine
        .fetch(
            &query(),
            FetchOptions {
                stale_tx: Some(tx),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let snapshot = rx.recv().await.unwrap();
    assert_eq!(snapshot.status, FetchStatus::Cache);
    assert_eq!(snapshot.events[0].title, "Old");
    assert_eq!(fresh.events[0].title, "New");
}

#[tokio::test]
async fn page_one_success_appends_non_colliding_seed_records() {
    let client = Arc::new(ScriptedClient::default());
    client.push(ScriptedCall::immediate(Outcome::Events(
        vec![raw_event("Drillers Home Game"), raw_event("Live Only")],
        Vec::new(),
    )));
    let engine = Engine::new(
        EngineConfig::default(),
        Box::new(MemoryStore::new()),
        client,
    )
    .with_seed_provider(Arc::new(StaticSeedProvider::builtin()));

    let result = engine.fetch(&query(), FetchOptions::default()).await.unwrap();
    let titles: Vec<&str> = result.events.iter().map(|e| e.title.as_str()).collect();

    // Live first, then the seeds that did not collide by title.
    assert_eq!(titles[0], "Drillers Home Game");
    assert_eq!(titles[1], "Live Only");
    assert!(titles.contains(&"First Friday Art Crawl"));
    assert_eq!(
        titles
            .iter()
            .filter(|t| t.eq_ignore_ascii_case("drillers home game"))
            .count(),
        1
    );
}

#[tokio::test]
async fn reset_quota_reopens_both_tiers() {
    let client = Arc::new(ScriptedClient::default());
    client.push(ScriptedCall::immediate(Outcome::RateLimited));
    client.push(ScriptedCall::immediate(Outcome::RateLimited));
    client.push(ScriptedCall::immediate(Outcome::Events(
        vec![raw_event("A")],
        vec![source()],
    )));
    let engine = default_engine(client.clone());

    let limited = engine.fetch(&query(), FetchOptions::default()).await.unwrap();
    assert_eq!(limited.status, FetchStatus::QuotaLimited);

    engine.reset_quota();
    let result = engine.fetch(&query(), FetchOptions::default()).await.unwrap();
    assert_eq!(result.status, FetchStatus::Grounded);
    assert_eq!(client.calls().len(), 3);
}
