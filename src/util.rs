//! Utility helpers for Intake.
//!
//! Small pieces shared by the submission pipeline: random identifiers for
//! storage names, cleanup of model replies and flattening of loosely typed
//! JSON form fields.

use std::collections::BTreeMap;

use serde_json::Value;

/// Returns `len` lowercase hexadecimal characters taken from a fresh v4 UUID.
/// `len` is capped at 32.
pub fn random_hex_id(len: usize) -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(len.min(32));
    id
}

/// Return the contents of the first markdown code fence (```` ```json ```` or
/// ```` ``` ````) in a language-model reply, wherever it starts. Text without
/// a fence is returned trimmed.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let inner = &trimmed[open + 3..];
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    let close = inner.find("```").unwrap_or(inner.len());
    inner[..close].trim()
}

/// The span from the first `{` to the last `}`, if any.
pub fn json_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse `raw` as a JSON object and flatten its values to strings. String
/// values are kept verbatim, everything else is rendered as JSON text.
/// Anything that is not a JSON object yields `None`.
pub fn parse_string_map(raw: &str) -> Option<BTreeMap<String, String>> {
    let Value::Object(map) = serde_json::from_str::<Value>(raw).ok()? else {
        return None;
    };
    Some(
        map.into_iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, value)
            })
            .collect(),
    )
}
