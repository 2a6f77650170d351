//! Engine configuration.
//!
//! The source history disagreed with itself about backoff windows and TTLs,
//! so none of them are constants here: every duration is a field with a
//! default, overridable from a TOML document.

use std::time::Duration;

use serde::Deserialize;

/// Generative Language API base URL.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Tunables for the engine. All durations are expressed in seconds in the
/// serialized form.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model identifier, e.g. "gemini-2.5-flash".
    pub model: String,
    /// API base URL; overridable for testing against a local mock.
    pub api_base: String,
    /// Events requested per page.
    pub page_size: u32,
    /// TTL for narrowly filtered queries, seconds.
    pub ttl_secs: u64,
    /// TTL for aggregate ("All" region) queries, seconds. These change
    /// slowly and are expensive to refetch.
    pub ttl_global_secs: u64,
    /// Backoff after a grounded-tier rate limit, seconds.
    pub grounded_backoff_secs: u64,
    /// Backoff after a base-tier rate limit, seconds. Longer than the
    /// grounded window: if even plain generation is throttled, the whole
    /// key is out of budget.
    pub base_backoff_secs: u64,
    /// Optional byte budget for the backing store.
    pub store_capacity_bytes: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            page_size: 10,
            ttl_secs: 60 * 60,
            ttl_global_secs: 6 * 60 * 60,
            grounded_backoff_secs: 60,
            base_backoff_secs: 5 * 60,
            store_capacity_bytes: None,
        }
    }
}

impl EngineConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn ttl_global(&self) -> Duration {
        Duration::from_secs(self.ttl_global_secs)
    }

    pub fn grounded_backoff(&self) -> Duration {
        Duration::from_secs(self.grounded_backoff_secs)
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_secs(self.base_backoff_secs)
    }
}
