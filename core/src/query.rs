//! Query model and deterministic cache-key derivation.
//!
//! A [`QueryKey`] is the sole identity used for caching and in-flight
//! cancellation, so two logically identical queries must always produce the
//! same key regardless of how the caller assembled them. Keys are derived
//! from a canonical, field-ordered serialization of the normalized query,
//! digested to a fixed-charset string under a versioned prefix.

use serde::Deserialize;
use serde::Serialize;
use sha1::Digest;
use sha1::Sha1;

/// Bumping this invalidates every previously persisted cache entry without a
/// migration: old entries simply live under a prefix nobody asks for again.
pub const KEY_SCHEMA_VERSION: u32 = 3;

/// A query as issued by the caller. Field values are normalized by
/// [`QueryKey::for_query`]; callers do not need to pre-clean them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventQuery {
    /// Region/city name, or "All" for an aggregate query.
    pub region: String,
    /// Category filter. `None` and `Some("All")` are equivalent.
    #[serde(default)]
    pub category: Option<String>,
    /// Free-text keyword filter.
    #[serde(default)]
    pub keyword: Option<String>,
    /// Inclusive start of the date window, MM/DD/YYYY.
    #[serde(default)]
    pub start_date: Option<String>,
    /// Inclusive end of the date window, MM/DD/YYYY.
    #[serde(default)]
    pub end_date: Option<String>,
    /// 1-based page number. Zero is treated as page 1.
    #[serde(default)]
    pub page: u32,
}

impl EventQuery {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            page: 1,
            ..Default::default()
        }
    }

    /// Category with the "no constraint" cases collapsed: an absent category
    /// and the literal "All" mean the same thing.
    pub fn effective_category(&self) -> Option<&str> {
        match self.category.as_deref() {
            None => None,
            Some(c) if c.trim().is_empty() || c.trim().eq_ignore_ascii_case("all") => None,
            Some(c) => Some(c.trim()),
        }
    }

    /// Keyword trimmed and lowercased; empty collapses to absent.
    pub fn effective_keyword(&self) -> Option<String> {
        self.keyword
            .as_deref()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
    }

    pub fn effective_page(&self) -> u32 {
        self.page.max(1)
    }

    /// True for aggregate queries spanning every region. These change slowly
    /// and warrant the longer cache TTL.
    pub fn is_aggregate(&self) -> bool {
        self.region.trim().eq_ignore_ascii_case("all")
    }
}

/// Stable cache/cancellation identity for one [`EventQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey(String);

impl QueryKey {
    /// Derives the key for a query.
    ///
    /// Pure and deterministic: the canonical form lists every field in a
    /// fixed order with normalized values, so insertion order and cosmetic
    /// differences ("All" vs. no category, keyword case) cannot split the
    /// cache.
    pub fn for_query(query: &EventQuery) -> Self {
        let canonical = format!(
            "category={}\u{1f}end={}\u{1f}keyword={}\u{1f}page={}\u{1f}region={}\u{1f}start={}",
            query.effective_category().unwrap_or_default().to_lowercase(),
            query.end_date.as_deref().unwrap_or_default(),
            query.effective_keyword().unwrap_or_default(),
            query.effective_page(),
            query.region.trim().to_lowercase(),
            query.start_date.as_deref().unwrap_or_default(),
        );
        let digest = Sha1::digest(canonical.as_bytes());
        Self(format!("{}{digest:x}", Self::prefix()))
    }

    /// Current versioned key prefix. Entries under any other prefix are
    /// unreachable and subject to administrative purge.
    pub fn prefix() -> String {
        format!("eventide.v{KEY_SCHEMA_VERSION}.")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short digest fragment used when composing record identifiers.
    pub fn short_digest(&self) -> &str {
        let hex = self.0.rsplit('.').next().unwrap_or(&self.0);
        &hex[..hex.len().min(8)]
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
