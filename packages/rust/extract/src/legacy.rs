//! Legacy categorization markup decoder.
//!
//! Older responses grouped tickers under markdown headers:
//!
//! ```text
//! ### Fast Grower
//! - **NVDA**: Leader in AI chips.
//! ### Turnaround
//! - **CCL**: Recovering from pandemic impact.
//! ```
//!
//! Recognized headers select the current section; any other header clears
//! it, and bullets seen while no section is active are dropped.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::debug;

/// Matches a header line (must start at column 0).
static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#+\s*(.*?)\s*$").expect("header regex"));

/// Matches `- **KEY**: description` (leading whitespace allowed).
static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[-*]\s+\*\*([^*]+?)\*\*\s*:(.*)$").expect("bullet regex")
});

/// A header title and the key its entries are collected under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacySection {
    /// Header text, e.g. `Fast Grower`.
    pub header: String,
    /// Output key, e.g. `fast_growers`.
    pub key: String,
}

impl LegacySection {
    pub fn new(header: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            key: key.into(),
        }
    }
}

/// Decoder for header/bullet markup with a fixed section vocabulary.
#[derive(Debug, Clone)]
pub struct SectionDecoder {
    sections: Vec<LegacySection>,
}

impl Default for SectionDecoder {
    fn default() -> Self {
        Self::new(vec![
            LegacySection::new("Fast Grower", "fast_growers"),
            LegacySection::new("Turnaround", "turnarounds"),
        ])
    }
}

impl SectionDecoder {
    pub fn new(sections: Vec<LegacySection>) -> Self {
        Self { sections }
    }

    /// Whether `raw` looks like header/bullet markup at all.
    fn matches(raw: &str) -> bool {
        let has_header = raw.lines().any(|l| HEADER_RE.is_match(l));
        let has_bullet = raw.lines().any(|l| BULLET_RE.is_match(l));
        has_header && has_bullet
    }

    /// Decode into `{ key: [{ticker, justification}], ... }`.
    ///
    /// Returns `None` when the markup is absent or no bullet landed in a
    /// recognized section.
    pub fn decode(&self, raw: &str) -> Option<Value> {
        if !Self::matches(raw) {
            return None;
        }

        let mut groups: Vec<Vec<Value>> = vec![Vec::new(); self.sections.len()];
        let mut current: Option<usize> = None;
        let mut dropped = 0usize;

        for line in raw.lines() {
            if let Some(caps) = HEADER_RE.captures(line) {
                let title = &caps[1];
                current = self.sections.iter().position(|s| s.header == title);
                continue;
            }

            if let Some(caps) = BULLET_RE.captures(line) {
                match current {
                    Some(idx) => groups[idx].push(json!({
                        "ticker": caps[1].trim(),
                        "justification": caps[2].trim(),
                    })),
                    None => dropped += 1,
                }
            }
        }

        if dropped > 0 {
            debug!(dropped, "legacy bullets outside a recognized section were dropped");
        }

        if groups.iter().all(Vec::is_empty) {
            return None;
        }

        let mut out = Map::new();
        for (section, entries) in self.sections.iter().zip(groups) {
            out.insert(section.key.clone(), Value::Array(entries));
        }
        Some(Value::Object(out))
    }
}
