//! Per-tier quota-exhaustion tracking.
//!
//! When the upstream rate-limits a tier, the orchestrator marks it exhausted
//! for a bounded backoff window. Exhaustion is never permanent: once the
//! window elapses the tier is available again with no further bookkeeping.
//! The orchestrator is the only writer; everything else reads.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;

/// Upstream calling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Search-augmented generation: slower, quota-expensive, provenance-bearing.
    Grounded,
    /// Plain generation: faster, cheaper, unverified.
    Base,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Grounded => f.write_str("grounded"),
            Tier::Base => f.write_str("base"),
        }
    }
}

/// Process-wide "exhausted until T" state per tier. Quota windows are short
/// (minutes), so nothing here is persisted.
#[derive(Default)]
pub struct QuotaTracker {
    exhausted_until: Mutex<HashMap<Tier, Instant>>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_exhausted(&self, tier: Tier) -> bool {
        self.is_exhausted_at(tier, Instant::now())
    }

    fn is_exhausted_at(&self, tier: Tier, now: Instant) -> bool {
        match self.exhausted_until.lock() {
            Ok(map) => map.get(&tier).is_some_and(|until| *until > now),
            Err(_) => false,
        }
    }

    /// Marks `tier` exhausted for `backoff` from now. The deadline only ever
    /// moves forward: a shorter overlapping backoff cannot shrink an
    /// existing window.
    pub fn mark_exhausted(&self, tier: Tier, backoff: Duration) {
        self.mark_exhausted_at(tier, backoff, Instant::now());
    }

    fn mark_exhausted_at(&self, tier: Tier, backoff: Duration, now: Instant) {
        let deadline = now + backoff;
        if let Ok(mut map) = self.exhausted_until.lock() {
            let entry = map.entry(tier).or_insert(deadline);
            if deadline > *entry {
                *entry = deadline;
            }
            tracing::info!("tier {tier} marked exhausted for {backoff:?}");
        }
    }

    /// Clears exhaustion for `tier`; called after any successful call on it.
    pub fn clear(&self, tier: Tier) {
        if let Ok(mut map) = self.exhausted_until.lock() {
            map.remove(&tier);
        }
    }

    /// Manual override (e.g. a user-triggered retry): forgets every window.
    pub fn reset(&self) {
        if let Ok(mut map) = self.exhausted_until.lock() {
            map.clear();
        }
    }
}
