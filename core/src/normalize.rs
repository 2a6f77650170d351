//! Result normalization, deduplication, and seed merging.
//!
//! Upstream records arrive as loosely shaped JSON. Normalization assigns
//! every record a stable identifier derived from (key, page, index) — never
//! from content and never trusted from upstream — so caller-side identity
//! and reconciliation stay consistent across refreshes. The lower-cased,
//! whitespace-collapsed title is the deduplication identity: within one
//! aggregated result set the first occurrence wins.

use std::collections::HashSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::query::QueryKey;

/// One event as surfaced to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Normalizer-assigned identity, stable per (key, page, index).
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default)]
    pub is_trending: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_restriction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
}

/// Deduplication identity for a title: lower-cased, whitespace collapsed.
pub fn normalized_title(title: &str) -> String {
    title
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decodes, identifies, and deduplicates one raw upstream batch.
///
/// Records that fail to decode are dropped individually rather than failing
/// the batch. `exclude_titles` holds normalized titles already surfaced on
/// prior pages; matching records are dropped so pagination never re-shows an
/// event.
pub fn normalize(
    raw: Vec<Value>,
    key: &QueryKey,
    page: u32,
    exclude_titles: &HashSet<String>,
) -> Vec<EventRecord> {
    let mut seen: HashSet<String> = exclude_titles.clone();
    let mut out = Vec::with_capacity(raw.len());

    for (index, value) in raw.into_iter().enumerate() {
        let mut record: EventRecord = match serde_json::from_value(value) {
            Ok(record) => record,
            Err(err) => {
                tracing::debug!("dropping undecodable event at index {index}: {err}");
                continue;
            }
        };
        let title_key = normalized_title(&record.title);
        if title_key.is_empty() || !seen.insert(title_key) {
            continue;
        }
        record.id = format!("{}-{page}-{index}", key.short_digest());
        out.push(record);
    }

    out
}

/// Merges live results with a seed baseline.
///
/// Live records take precedence: seed records whose normalized title collides
/// with a live record are dropped, and the surviving seed records are
/// appended after the live ones so a page keeps its familiar tail while the
/// head refreshes.
pub fn merge_with_seed(live: Vec<EventRecord>, seed: Vec<EventRecord>) -> Vec<EventRecord> {
    let mut seen: HashSet<String> = live
        .iter()
        .map(|record| normalized_title(&record.title))
        .collect();

    let mut merged = live;
    for record in seed {
        if seen.insert(normalized_title(&record.title)) {
            merged.push(record);
        }
    }
    merged
}
