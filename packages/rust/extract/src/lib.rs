//! Tolerant extraction of structured data from free-form provider responses.
//!
//! A response may arrive as a fenced ```` ```json ```` block, as bare JSON, as
//! one of two legacy markdown layouts (category headers with bold-ticker
//! bullets, or a ticker table), or as plain prose. [`extract`] tries the
//! decoders in that order and always returns something: a structured value
//! when one of the decoders accepts the input, the original text otherwise.
//!
//! Decoders never repair malformed data. A fence whose body fails to parse
//! simply falls through to the next decoder.

mod fenced;
mod legacy;
mod table;

use serde_json::Value;
use tracing::debug;

pub use legacy::{LegacySection, SectionDecoder};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Which decoder produced a structured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    /// Body of the first ```` ```json ```` fence.
    Fenced,
    /// The whole input parsed as JSON.
    Whole,
    /// Legacy `### Category` / `- **TICKER**: text` markup.
    LegacySections,
    /// Legacy `| Stock Ticker | ... |` table.
    LegacyTable,
}

/// Outcome of [`extract`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedValue {
    /// An object or array.
    Json { value: Value, decoder: Decoder },
    /// Nothing structured was found; the input, unchanged.
    Text(String),
}

impl ExtractedValue {
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json { .. })
    }

    /// The structured value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Json { value, .. } => Some(value),
            Self::Text(_) => None,
        }
    }

    /// Convert into the JSON value stored in an envelope (a string for text).
    pub fn into_content(self) -> Value {
        match self {
            Self::Json { value, .. } => value,
            Self::Text(text) => Value::String(text),
        }
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Extractor with a configurable legacy-section vocabulary.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    sections: SectionDecoder,
}

impl Extractor {
    /// An extractor using the given legacy section decoder.
    pub fn with_sections(sections: SectionDecoder) -> Self {
        Self { sections }
    }

    /// Run every decoder in order until one accepts `raw`.
    pub fn extract(&self, raw: &str) -> ExtractedValue {
        if raw.trim().is_empty() {
            return ExtractedValue::Text(raw.to_string());
        }

        if let Some(value) = fenced::decode_fence(raw) {
            return structured(value, Decoder::Fenced);
        }
        if let Some(value) = fenced::decode_whole(raw) {
            return structured(value, Decoder::Whole);
        }
        if let Some(value) = self.sections.decode(raw) {
            return structured(value, Decoder::LegacySections);
        }
        if let Some(value) = table::decode_table(raw) {
            return structured(value, Decoder::LegacyTable);
        }

        debug!(len = raw.len(), "no structured payload found, keeping text");
        ExtractedValue::Text(raw.to_string())
    }
}

fn structured(value: Value, decoder: Decoder) -> ExtractedValue {
    debug!(?decoder, "structured payload extracted");
    ExtractedValue::Json { value, decoder }
}

/// Extract with the default legacy vocabulary (Fast Grower / Turnaround).
pub fn extract(raw: &str) -> ExtractedValue {
    Extractor::default().extract(raw)
}

/// Only objects and arrays count as a structured payload.
pub(crate) fn is_payload(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn fenced_array_is_json() {
        let raw = "```json\n[{\"ticker\":\"AAPL\",\"reason\":\"x\"}]\n```";
        let out = extract(raw);
        assert_eq!(
            out,
            ExtractedValue::Json {
                value: json!([{"ticker": "AAPL", "reason": "x"}]),
                decoder: Decoder::Fenced,
            }
        );
    }

    #[test]
    fn fence_with_surrounding_prose() {
        let raw = "Here are my picks:\n\n```json\n{\"fast_growers\": [], \"turnarounds\": []}\n```\n\nGood luck.";
        let out = extract(raw);
        assert_eq!(out.value(), Some(&json!({"fast_growers": [], "turnarounds": []})));
    }

    #[test]
    fn bare_json_is_json() {
        let out = extract("  [{\"ticker\": \"MSFT\"}]\n");
        assert!(matches!(out, ExtractedValue::Json { decoder: Decoder::Whole, .. }));
    }

    #[test]
    fn empty_input_is_empty_text() {
        assert_eq!(extract(""), ExtractedValue::Text(String::new()));
        assert_eq!(extract("   \n"), ExtractedValue::Text("   \n".into()));
    }

    #[test]
    fn prose_is_text() {
        let raw = "The market looks choppy this week.";
        assert_eq!(extract(raw), ExtractedValue::Text(raw.into()));
    }

    #[test]
    fn scalars_and_null_are_not_payloads() {
        assert!(!extract("42").is_json());
        assert!(!extract("null").is_json());
        assert!(!extract("\"quoted\"").is_json());
        assert!(!extract("```json\nnull\n```").is_json());
    }

    #[test]
    fn malformed_fence_falls_through_to_legacy() {
        let raw = "```json\n{\"fast_growers\": [\n```\n### Fast Grower\n- **NVDA**: AI chips";
        let out = extract(raw);
        assert!(matches!(out, ExtractedValue::Json { decoder: Decoder::LegacySections, .. }));
    }

    #[test]
    fn malformed_fence_without_legacy_is_text() {
        let raw = "```json\n{\"ticker\": \"AAPL\",\n```";
        assert_eq!(extract(raw), ExtractedValue::Text(raw.into()));
    }

    #[test]
    fn only_first_fence_is_considered() {
        let raw = "```json\n{\"first\": true}\n```\n```json\n{\"second\": true}\n```";
        assert_eq!(extract(raw).value(), Some(&json!({"first": true})));
    }

    #[test]
    fn legacy_table_is_last_structured_decoder() {
        let raw = "| Stock Ticker | Reasons for Selection |\n|:-------------|:----------------------|\n| **AAPL** | Loyal customers |";
        let out = extract(raw);
        assert_eq!(
            out,
            ExtractedValue::Json {
                value: json!([{"ticker": "AAPL", "reason": "Loyal customers"}]),
                decoder: Decoder::LegacyTable,
            }
        );
    }

    #[test]
    fn into_content_wraps_text() {
        assert_eq!(extract("plain").into_content(), json!("plain"));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-zA-Z0-9 .,:'\"\\\\-]{0,24}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{1,10}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn fenced_payload_roundtrips(value in arb_json()) {
            prop_assume!(is_payload(&value));
            let pretty = serde_json::to_string_pretty(&value).unwrap();
            let raw = format!("```json\n{pretty}\n```");
            prop_assert_eq!(extract(&raw), ExtractedValue::Json { value, decoder: Decoder::Fenced });
        }

        #[test]
        fn extract_is_total(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
            let raw = String::from_utf8_lossy(&bytes);
            let _ = extract(&raw);
        }

        #[test]
        fn nested_fences_never_panic(depth in 0usize..8, body in "[a-z{}\\[\\]\" ,:]{0,40}") {
            let mut raw = body.clone();
            for _ in 0..depth {
                raw = format!("```json\n{raw}\n```");
            }
            let _ = extract(&raw);
        }
    }
}
