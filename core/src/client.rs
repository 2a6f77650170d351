//! Upstream client adapter for the Generative Language API.
//!
//! A thin, stateless strategy around one network call: build the
//! tier-specific request, run it, map the response into raw events plus
//! provenance sources, and translate failures into the engine's error
//! taxonomy. No caching and no quota mutation happen here; that is the
//! orchestrator's job.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::config::EngineConfig;
use crate::error::FetchError;
use crate::json_extract;
use crate::query::EventQuery;
use crate::quota::Tier;

/// Fixed category vocabulary the upstream is instructed to use.
pub const CATEGORIES: &[&str] = &[
    "Sports",
    "Family Activities",
    "Entertainment",
    "Food & Drink",
    "Night Life",
    "Arts & Culture",
    "Outdoors",
    "Community",
];

/// Citation attached to a grounded result: evidence the answer was backed by
/// an actual search rather than pure generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceSource {
    pub title: String,
    pub uri: String,
}

/// One successful upstream call: undecoded event objects plus whatever
/// provenance accompanied them. Empty `sources` on the grounded tier means
/// the model answered without searching; the orchestrator downgrades the
/// reported status accordingly.
#[derive(Debug, Clone, Default)]
pub struct UpstreamBatch {
    pub events: Vec<Value>,
    pub sources: Vec<ProvenanceSource>,
}

/// The one seam the orchestrator calls through; test doubles and the real
/// HTTP client are interchangeable behind it.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn call(&self, query: &EventQuery, tier: Tier) -> Result<UpstreamBatch, FetchError>;
}

/// Error payload shape used by the API.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[allow(dead_code)]
    code: Option<u16>,
    message: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    grounding_chunks: Option<Vec<GroundingChunk>>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    title: Option<String>,
    uri: Option<String>,
}

/// HTTP client for the Generative Language API.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
    page_size: u32,
}

impl GeminiClient {
    pub fn new(api_key: String, config: &EngineConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model: config.model.clone(),
            api_base: config.api_base.clone(),
            page_size: config.page_size,
        }
    }

    /// Swaps in a caller-supplied HTTP client (custom timeouts, proxies).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Natural-language prompt encoding the query. The structure (page
    /// number, category instruction, date window, keyword, schema mandate)
    /// is part of the upstream contract and deliberately verbose.
    fn build_prompt(&self, query: &EventQuery) -> String {
        let region = query.region.trim();
        let page = query.effective_page();

        let category_instruction = match query.effective_category() {
            Some("Sports") => format!(
                "Include professional, collegiate, LOCAL HIGH SCHOOL, and YOUTH sports \
                 (football, basketball, soccer, baseball). Focus on game schedules for \
                 schools in {region}."
            ),
            Some(category) => format!("Strictly filter for {category}."),
            None => "Diverse mix: local festivals, High School/Youth sports, arts, and nightlife."
                .to_string(),
        };

        let date_instruction = if query.start_date.is_some() || query.end_date.is_some() {
            format!(
                "Dates: {} to {}.",
                query.start_date.as_deref().unwrap_or("today"),
                query.end_date.as_deref().unwrap_or("future"),
            )
        } else {
            "Upcoming this week/month.".to_string()
        };

        let keyword_line = query
            .effective_keyword()
            .map(|keyword| format!("Keyword: {keyword}\n"))
            .unwrap_or_default();

        format!(
            "Find {count} unique local events for {region} (Page {page}).\n\
             {category_instruction}\n\
             {date_instruction}\n\
             {keyword_line}\n\
             MANDATORY:\n\
             - If category is Sports, include High School and Youth athletic events.\n\
             - Format: MM/DD/YYYY.\n\
             - JSON Array only.\n\
             - ageRestriction: \"All Ages\", \"21+\", \"18+\".\n\
             - isTrending: true for popular picks.\n\
             - Include lat/lng for mapping.\n\
             - Category must match: {categories}.",
            count = self.page_size,
            categories = CATEGORIES.join(", "),
        )
    }

    /// Request body for one tier. The grounded tier enables the search tool;
    /// the base tier asks for JSON-only generation instead.
    fn build_request_body(&self, query: &EventQuery, tier: Tier) -> Value {
        let mut body = json!({
            "contents": [{ "parts": [{ "text": self.build_prompt(query) }] }],
            "generationConfig": { "responseMimeType": "application/json" },
        });
        if tier == Tier::Grounded {
            body["tools"] = json!([{ "googleSearch": {} }]);
        }
        body
    }

    fn map_error_status(status: StatusCode, body: &str) -> FetchError {
        if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) {
            let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
                || parsed.error.status.as_deref() == Some("RESOURCE_EXHAUSTED");
            if rate_limited {
                return FetchError::RateLimited {
                    retry_after_secs: None,
                };
            }
            return FetchError::Unavailable(format!(
                "{} ({status})",
                parsed.error.message
            ));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return FetchError::RateLimited {
                retry_after_secs: None,
            };
        }
        FetchError::Unavailable(format!("upstream returned {status}"))
    }

    fn parse_response(response: GenerateResponse) -> Result<UpstreamBatch, FetchError> {
        let candidates = response.candidates.unwrap_or_default();
        let first = candidates
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::Malformed("response carried no candidates".to_string()))?;

        let text: String = first
            .content
            .and_then(|content| content.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|part| part.text)
            .collect();

        let events = json_extract::extract_array(&text)?;

        let sources = first
            .grounding_metadata
            .and_then(|metadata| metadata.grounding_chunks)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|chunk| chunk.web)
            .filter_map(|web| match (web.title, web.uri) {
                (Some(title), Some(uri)) => Some(ProvenanceSource { title, uri }),
                _ => None,
            })
            .collect();

        Ok(UpstreamBatch { events, sources })
    }
}

#[async_trait]
impl UpstreamClient for GeminiClient {
    async fn call(&self, query: &EventQuery, tier: Tier) -> Result<UpstreamBatch, FetchError> {
        let url = format!("{}/{}:generateContent", self.api_base, self.model);
        let body = self.build_request_body(query, tier);

        tracing::debug!(
            "calling upstream tier={tier} region={} page={}",
            query.region,
            query.effective_page()
        );

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| FetchError::Unavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::map_error_status(status, &text));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|err| FetchError::Malformed(err.to_string()))?;

        Self::parse_response(parsed)
    }
}
