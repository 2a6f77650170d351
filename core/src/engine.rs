//! Query orchestration: stale-while-revalidate sequencing, tiered fallback,
//! cancellation, and status reporting.
//!
//! The [`Engine`] owns the cache store, the quota tracker, and the in-flight
//! registry as explicit, injectable state — constructed once, never ambient —
//! so it can be instantiated per test and exercised in isolation. Per key the
//! flow is: cache check → grounded attempt → base attempt → stale cache →
//! seed baseline → nothing, with the grounded tier always tried before the
//! base tier and never both in parallel (parallel attempts would double
//! quota consumption for a single logical request).

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheEntry;
use crate::cache::CacheStore;
use crate::client::ProvenanceSource;
use crate::client::UpstreamBatch;
use crate::client::UpstreamClient;
use crate::config::EngineConfig;
use crate::inflight::InFlightRegistry;
use crate::normalize;
use crate::normalize::EventRecord;
use crate::query::EventQuery;
use crate::query::QueryKey;
use crate::quota::QuotaTracker;
use crate::quota::Tier;
use crate::seed::SeedProvider;
use crate::seed::StaticSeedProvider;
use crate::store::Store;
use crate::util::OrCancelExt;

/// Which layer actually produced the data in a [`FetchResult`]. Reflects the
/// producing tier, not the tier that was merely attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchStatus {
    /// Live result backed by search, with provenance sources.
    Grounded,
    /// Live result from plain generation, unverified.
    Ai,
    /// Served from the cache.
    Cache,
    /// Served from the read-only seed baseline.
    Seed,
    /// Every live tier is inside a quota backoff window. Expected and
    /// recoverable, not a fault; the caller shows its own baseline.
    QuotaLimited,
}

/// What a fetch hands back. `events` is empty for `QuotaLimited`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub events: Vec<EventRecord>,
    pub sources: Vec<ProvenanceSource>,
    pub status: FetchStatus,
}

impl FetchResult {
    fn from_cache(entry: CacheEntry) -> Self {
        Self {
            events: entry.events,
            sources: entry.sources,
            status: FetchStatus::Cache,
        }
    }

    fn quota_limited() -> Self {
        Self {
            events: Vec::new(),
            sources: Vec::new(),
            status: FetchStatus::QuotaLimited,
        }
    }
}

/// Per-call options.
#[derive(Default)]
pub struct FetchOptions {
    /// Skip the fresh-cache short circuit and refetch unconditionally.
    pub force_refresh: bool,
    /// Titles already surfaced on earlier pages; matching records are
    /// dropped so pagination never repeats an event.
    pub exclude_titles: Vec<String>,
    /// When set, a stale or force-refreshed cache entry is pushed here
    /// before the network attempt starts, letting the caller render
    /// something immediately while the refresh runs (stale-while-
    /// revalidate).
    pub stale_tx: Option<UnboundedSender<FetchResult>>,
}

/// The data-sourcing engine: cache, quota, cancellation, and the tiered
/// upstream fallback chain behind a single `fetch` call.
pub struct Engine {
    config: EngineConfig,
    cache: CacheStore,
    quota: QuotaTracker,
    inflight: InFlightRegistry,
    client: Arc<dyn UpstreamClient>,
    seeds: Arc<dyn SeedProvider>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        store: Box<dyn Store>,
        client: Arc<dyn UpstreamClient>,
    ) -> Self {
        Self {
            config,
            cache: CacheStore::new(store),
            quota: QuotaTracker::new(),
            inflight: InFlightRegistry::new(),
            client,
            seeds: Arc::new(StaticSeedProvider::builtin()),
        }
    }

    pub fn with_seed_provider(mut self, seeds: Arc<dyn SeedProvider>) -> Self {
        self.seeds = seeds;
        self
    }

    /// Read access to the quota tracker. The engine is the only writer.
    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    /// Administrative purge of every cache entry under the current key
    /// schema prefix.
    pub fn clear_cache(&self) {
        self.cache.clear_prefix(&QueryKey::prefix());
    }

    /// Manual quota override, e.g. a user-triggered retry button.
    pub fn reset_quota(&self) {
        self.quota.reset();
    }

    /// Resolves one query through the fallback chain.
    ///
    /// `None` means nothing is available at any layer (or this call was
    /// superseded by a newer one for the same key); the caller falls back to
    /// its own static baseline. A non-`None` result always carries the
    /// status of the layer that actually produced it.
    pub async fn fetch(&self, query: &EventQuery, options: FetchOptions) -> Option<FetchResult> {
        let key = QueryKey::for_query(query);
        let token = self.inflight.begin(&key);
        let result = self.run(query, &key, options, &token).await;
        self.inflight.finish(&key, &token);
        result
    }

    async fn run(
        &self,
        query: &EventQuery,
        key: &QueryKey,
        options: FetchOptions,
        token: &CancellationToken,
    ) -> Option<FetchResult> {
        let stale_entry = self.cache.get_stale(key);

        if let Some(entry) = &stale_entry {
            if entry.is_fresh() && !options.force_refresh {
                tracing::debug!("cache hit for {key}");
                return Some(FetchResult::from_cache(entry.clone()));
            }
            // Stale or forced: hand the old snapshot over before the slow
            // part so the caller has something to show meanwhile.
            if let Some(tx) = &options.stale_tx {
                let _ = tx.send(FetchResult::from_cache(entry.clone()));
            }
        }

        let exclude: HashSet<String> = options
            .exclude_titles
            .iter()
            .map(|title| normalize::normalized_title(title))
            .collect();

        // Grounded tier first, always, and never in parallel with base.
        if self.quota.is_exhausted(Tier::Grounded) {
            tracing::debug!("grounded tier inside backoff window, skipping");
        } else {
            match self.client.call(query, Tier::Grounded).or_cancel(token).await {
                // Superseded while waiting on the network.
                Err(_) => return None,
                Ok(Ok(batch)) => {
                    return self.complete(query, key, token, batch, Tier::Grounded, &exclude);
                }
                Ok(Err(err)) if err.is_rate_limit() => {
                    self.quota
                        .mark_exhausted(Tier::Grounded, self.config.grounded_backoff());
                }
                Ok(Err(err)) => {
                    tracing::warn!("grounded tier failed for {key}: {err}");
                }
            }
        }

        // Base tier next: faster, unverified, last live option.
        if self.quota.is_exhausted(Tier::Base) {
            tracing::debug!("base tier inside backoff window, skipping");
            return Some(FetchResult::quota_limited());
        }
        match self.client.call(query, Tier::Base).or_cancel(token).await {
            // Superseded while waiting on the network.
            Err(_) => return None,
            Ok(Ok(batch)) => {
                return self.complete(query, key, token, batch, Tier::Base, &exclude);
            }
            Ok(Err(err)) if err.is_rate_limit() => {
                self.quota
                    .mark_exhausted(Tier::Base, self.config.base_backoff());
                return Some(FetchResult::quota_limited());
            }
            Ok(Err(err)) => {
                tracing::warn!("base tier failed for {key}: {err}");
            }
        }

        // Both live tiers failed for non-quota reasons: most recent cache
        // entry even if expired, else the seed baseline, else nothing.
        if let Some(entry) = stale_entry {
            tracing::debug!("serving stale cache entry for {key}");
            return Some(FetchResult::from_cache(entry));
        }
        let seed = self
            .seeds
            .seed(&query.region, query.effective_category());
        if seed.is_empty() {
            None
        } else {
            Some(FetchResult {
                events: seed,
                sources: Vec::new(),
                status: FetchStatus::Seed,
            })
        }
    }

    /// Final leg of a successful tier call: normalize, seed-merge page 1,
    /// persist, report. A superseded token drops everything on the floor.
    fn complete(
        &self,
        query: &EventQuery,
        key: &QueryKey,
        token: &CancellationToken,
        batch: UpstreamBatch,
        tier: Tier,
        exclude: &HashSet<String>,
    ) -> Option<FetchResult> {
        if token.is_cancelled() {
            tracing::debug!("discarding superseded result for {key}");
            return None;
        }

        self.quota.clear(tier);

        let page = query.effective_page();
        let mut events = normalize::normalize(batch.events, key, page, exclude);

        // Page 1 keeps the seed baseline appended after live results so the
        // list the caller rendered instantly does not shrink underneath it.
        if page == 1 {
            let seed = self
                .seeds
                .seed(&query.region, query.effective_category());
            events = normalize::merge_with_seed(events, seed);
        }

        let status = match tier {
            Tier::Grounded if !batch.sources.is_empty() => FetchStatus::Grounded,
            _ => FetchStatus::Ai,
        };

        let ttl = if query.is_aggregate() {
            self.config.ttl_global()
        } else {
            self.config.ttl()
        };
        let entry = CacheEntry::new(events.clone(), batch.sources.clone(), status, ttl);
        self.cache.set(key, entry);

        tracing::info!(
            "fetched {} events for {key} via {tier} (status {status:?})",
            events.len()
        );
        Some(FetchResult {
            events,
            sources: batch.sources,
            status,
        })
    }
}
