//! Root of the `eventide-core` library.
//!
//! Eventide fronts an unreliable, rate-limited content-generation API with a
//! persistent TTL cache, a tiered fallback chain (grounded search, then plain
//! generation, then cache, then seed data), per-query cancellation, and
//! quota-exhaustion backoff. The [`engine::Engine`] is the entry point; the
//! remaining modules are its collaborators.

// Prevent accidental direct writes to stdout/stderr in library code. All
// user-visible output must go through the caller or the tracing stack.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod cache;
pub mod client;
pub mod config;
pub mod engine;
mod inflight;
pub mod json_extract;
pub mod normalize;
pub mod query;
pub mod quota;
pub mod seed;
pub mod store;
pub mod util;

mod error;

pub use cache::CacheEntry;
pub use cache::CacheStore;
pub use client::GeminiClient;
pub use client::ProvenanceSource;
pub use client::UpstreamBatch;
pub use client::UpstreamClient;
pub use config::EngineConfig;
pub use engine::Engine;
pub use engine::FetchOptions;
pub use engine::FetchResult;
pub use engine::FetchStatus;
pub use error::FetchError;
pub use error::StoreError;
pub use normalize::EventRecord;
pub use query::EventQuery;
pub use query::QueryKey;
pub use quota::QuotaTracker;
pub use quota::Tier;
pub use seed::SeedProvider;
pub use seed::StaticSeedProvider;
pub use store::FileStore;
pub use store::MemoryStore;
pub use store::Store;
