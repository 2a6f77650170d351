//! TTL cache layered on a [`Store`].
//!
//! Storage is strictly a performance layer: capacity pressure evicts the
//! oldest half of the entries and retries, and any other storage failure
//! degrades the cache to a no-op (gets miss, sets drop) instead of reaching
//! the caller.

use std::time::Duration;
use std::time::SystemTime;

use serde::Deserialize;
use serde::Serialize;

use crate::client::ProvenanceSource;
use crate::engine::FetchStatus;
use crate::error::StoreError;
use crate::normalize::EventRecord;
use crate::query::QueryKey;
use crate::store::Store;

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One cached fetch outcome. Entries are immutable: a refresh replaces the
/// whole entry, never patches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub events: Vec<EventRecord>,
    pub sources: Vec<ProvenanceSource>,
    pub status: FetchStatus,
    pub created_at_ms: u64,
    pub ttl_ms: u64,
}

impl CacheEntry {
    pub fn new(
        events: Vec<EventRecord>,
        sources: Vec<ProvenanceSource>,
        status: FetchStatus,
        ttl: Duration,
    ) -> Self {
        Self {
            events,
            sources,
            status,
            created_at_ms: now_ms(),
            ttl_ms: ttl.as_millis() as u64,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(now_ms())
    }

    /// An entry is valid iff `now - created_at < ttl`.
    pub fn is_fresh_at(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) < self.ttl_ms
    }
}

/// Persisted wire shape: the payload under `data`, the write time beside it.
#[derive(Serialize, Deserialize)]
struct PersistedEntry {
    data: PersistedData,
    timestamp: u64,
    ttl_ms: u64,
}

#[derive(Serialize, Deserialize)]
struct PersistedData {
    events: Vec<EventRecord>,
    sources: Vec<ProvenanceSource>,
    status: FetchStatus,
}

impl From<CacheEntry> for PersistedEntry {
    fn from(entry: CacheEntry) -> Self {
        Self {
            data: PersistedData {
                events: entry.events,
                sources: entry.sources,
                status: entry.status,
            },
            timestamp: entry.created_at_ms,
            ttl_ms: entry.ttl_ms,
        }
    }
}

impl From<PersistedEntry> for CacheEntry {
    fn from(persisted: PersistedEntry) -> Self {
        Self {
            events: persisted.data.events,
            sources: persisted.data.sources,
            status: persisted.data.status,
            created_at_ms: persisted.timestamp,
            ttl_ms: persisted.ttl_ms,
        }
    }
}

/// TTL-checked cache over an arbitrary [`Store`].
pub struct CacheStore {
    store: Box<dyn Store>,
}

impl CacheStore {
    pub fn new(store: Box<dyn Store>) -> Self {
        Self { store }
    }

    /// Fresh entry for `key`, or `None`. An expired entry is removed as a
    /// side effect and reported as absent.
    pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        let entry = self.get_any(key)?;
        if entry.is_fresh() {
            Some(entry)
        } else {
            if let Err(err) = self.store.remove(key.as_str()) {
                tracing::warn!("failed to purge expired cache entry {key}: {err}");
            }
            None
        }
    }

    /// Entry for `key` regardless of freshness. Used by the orchestrator to
    /// serve stale data when every live tier has failed.
    pub fn get_stale(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.get_any(key)
    }

    fn get_any(&self, key: &QueryKey) -> Option<CacheEntry> {
        let raw = match self.store.get_raw(key.as_str()) {
            Ok(raw) => raw?,
            Err(err) => {
                tracing::warn!("cache read failed for {key}: {err}");
                return None;
            }
        };
        match serde_json::from_str::<PersistedEntry>(&raw) {
            Ok(persisted) => Some(persisted.into()),
            Err(err) => {
                tracing::warn!("dropping undecodable cache entry {key}: {err}");
                let _ = self.store.remove(key.as_str());
                None
            }
        }
    }

    /// Persists `entry` under `key`. On capacity pressure the oldest half of
    /// the entries (by write time) is evicted and the write retried once;
    /// any remaining failure is logged and swallowed.
    pub fn set(&self, key: &QueryKey, entry: CacheEntry) {
        let raw = match serde_json::to_string(&PersistedEntry::from(entry)) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!("failed to encode cache entry {key}: {err}");
                return;
            }
        };
        match self.store.set_raw(key.as_str(), &raw) {
            Ok(()) => {}
            Err(StoreError::CapacityExceeded) => {
                self.evict_oldest_half();
                if let Err(err) = self.store.set_raw(key.as_str(), &raw) {
                    tracing::warn!("cache write failed after eviction for {key}: {err}");
                }
            }
            Err(err) => {
                tracing::warn!("cache write failed for {key}: {err}");
            }
        }
    }

    /// Administrative purge of every entry under `prefix`; used when the key
    /// schema version moves on.
    pub fn clear_prefix(&self, prefix: &str) {
        if let Err(err) = self.store.clear_prefix(prefix) {
            tracing::warn!("cache purge failed for prefix {prefix}: {err}");
        }
    }

    fn evict_oldest_half(&self) {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!("cache eviction aborted, key listing failed: {err}");
                return;
            }
        };

        let mut timestamped: Vec<(u64, String)> = Vec::new();
        for key in keys {
            let created_at = self
                .store
                .get_raw(&key)
                .ok()
                .flatten()
                .and_then(|raw| serde_json::from_str::<PersistedEntry>(&raw).ok())
                .map(|p| p.timestamp)
                // Undecodable entries sort first so eviction reclaims them.
                .unwrap_or(0);
            timestamped.push((created_at, key));
        }

        timestamped.sort();
        let evict_count = timestamped.len().div_ceil(2);
        tracing::debug!("evicting {evict_count} oldest cache entries under storage pressure");
        for (_, key) in timestamped.into_iter().take(evict_count) {
            if let Err(err) = self.store.remove(&key) {
                tracing::warn!("failed to evict cache entry {key}: {err}");
            }
        }
    }
}
