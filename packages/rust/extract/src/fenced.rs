//! JSON decoders: the first ```` ```json ```` fence, or the whole input.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::trace;

use crate::is_payload;

/// Matches the first ```` ```json ```` fence and captures its body.
static JSON_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)[ \t]*\r?\n(.*?)\r?\n?[ \t]*```").expect("json fence regex")
});

/// Parse the body of the first JSON fence, if there is one and it holds a payload.
pub(crate) fn decode_fence(raw: &str) -> Option<Value> {
    let caps = JSON_FENCE_RE.captures(raw)?;
    let body = caps.get(1)?.as_str();
    parse_payload(body)
}

/// Parse the entire input as a payload.
pub(crate) fn decode_whole(raw: &str) -> Option<Value> {
    parse_payload(raw)
}

fn parse_payload(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(value) if is_payload(&value) => Some(value),
        Ok(_) => {
            trace!("parsed JSON is a scalar, not a payload");
            None
        }
        Err(e) => {
            trace!(error = %e, "not valid JSON");
            None
        }
    }
}
