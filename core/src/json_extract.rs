//! Tolerant extraction of a JSON array from free-form model output.
//!
//! The upstream is asked for a bare JSON array but routinely wraps it in
//! prose or markdown fences. Rather than scattering string surgery across
//! call sites, this module owns the one recovery strategy: take the
//! substring from the first `[` to the last `]` and parse that. Anything
//! less structured is a [`FetchError::Malformed`].

use serde_json::Value;

use crate::error::FetchError;

/// Extracts the outermost JSON array from `text`.
pub fn extract_array(text: &str) -> Result<Vec<Value>, FetchError> {
    let trimmed = text.trim();

    // Fast path: the payload is exactly what we asked for.
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
        return Ok(items);
    }

    let start = trimmed
        .find('[')
        .ok_or_else(|| malformed(trimmed, "no opening bracket"))?;
    let end = trimmed
        .rfind(']')
        .ok_or_else(|| malformed(trimmed, "no closing bracket"))?;
    if end <= start {
        return Err(malformed(trimmed, "brackets out of order"));
    }

    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err(malformed(trimmed, "bracketed span is not an array")),
        Err(err) => Err(malformed(trimmed, &err.to_string())),
    }
}

fn malformed(payload: &str, reason: &str) -> FetchError {
    let preview: String = payload.chars().take(120).collect();
    tracing::debug!("unextractable payload ({reason}): {preview}");
    FetchError::Malformed(reason.to_string())
}
