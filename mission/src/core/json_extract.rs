//! Tolerant extraction of JSON objects and code bodies from model responses.
//!
//! Models wrap their answers in commentary and Markdown fences. Extraction is
//! strict about the payload (it must parse as a JSON object) and lenient about
//! everything around it.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_+.-]*[ \t]*\r?\n(.*?)\r?\n[ \t]*```").unwrap());

/// Extract the first JSON object from a model response.
///
/// Tries, in order: each fenced block, the whole trimmed text, then the span
/// from the first `{` to the last `}`.
pub fn extract_json_object(response: &str) -> Result<Value, String> {
    let mut candidates: Vec<&str> = FENCE_RE
        .captures_iter(response)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();
    candidates.push(response.trim());
    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}'))
        && start < end
    {
        candidates.push(&response[start..=end]);
    }

    let mut last_err = None;
    for candidate in candidates {
        match serde_json::from_str::<Value>(candidate.trim()) {
            Ok(value @ Value::Object(_)) => return Ok(value),
            Ok(_) => last_err = Some("response JSON is not an object".to_string()),
            Err(err) => last_err = Some(err.to_string()),
        }
    }
    Err(match last_err {
        Some(err) if response.contains('{') => format!("no valid JSON object in response: {err}"),
        _ => "no JSON object found in response".to_string(),
    })
}

/// Return the body of the first fenced code block, or the trimmed text.
pub fn strip_code_fence(response: &str) -> String {
    let trimmed = response.trim();
    match FENCE_RE.captures(trimmed).and_then(|caps| caps.get(1)) {
        Some(body) => body.as_str().trim().to_string(),
        None => trimmed.to_string(),
    }
}
