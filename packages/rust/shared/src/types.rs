//! Core domain types for the staged research pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TickerflowError;

// ---------------------------------------------------------------------------
// StepEnvelope
// ---------------------------------------------------------------------------

/// How the content of an envelope should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeFormat {
    /// Content is a structured value (object or array).
    Json,
    /// Content is the raw response text.
    Text,
    /// The compute failed; content is a human-readable message.
    Error,
}

impl EnvelopeFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
            Self::Error => "error",
        }
    }
}

/// The normalized wrapper around any step's result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEnvelope {
    /// Parsed value for `json`, a string for `text` and `error`. Never null.
    pub content: Value,
    pub format: EnvelopeFormat,
    /// Model tag the compute reported (the quality tier for provider-backed steps).
    pub model: String,
    pub produced_at: DateTime<Utc>,
}

impl StepEnvelope {
    /// A structured envelope.
    pub fn json(content: Value, model: impl Into<String>) -> Self {
        Self {
            content,
            format: EnvelopeFormat::Json,
            model: model.into(),
            produced_at: Utc::now(),
        }
    }

    /// A free-text envelope.
    pub fn text(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: Value::String(content.into()),
            format: EnvelopeFormat::Text,
            model: model.into(),
            produced_at: Utc::now(),
        }
    }

    /// An error envelope carrying `message`.
    pub fn error(message: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: Value::String(message.into()),
            format: EnvelopeFormat::Error,
            model: model.into(),
            produced_at: Utc::now(),
        }
    }

    pub fn is_json(&self) -> bool {
        self.format == EnvelopeFormat::Json
    }

    /// The content as text, for `text` and `error` envelopes.
    pub fn as_text(&self) -> Option<&str> {
        self.content.as_str()
    }
}

// ---------------------------------------------------------------------------
// CacheRecord
// ---------------------------------------------------------------------------

/// One entry of the step cache. Writing a step id replaces its record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub step_id: String,
    /// When the record was committed.
    pub timestamp: DateTime<Utc>,
    pub envelope: StepEnvelope,
}

impl CacheRecord {
    pub fn new(step_id: impl Into<String>, envelope: StepEnvelope) -> Self {
        Self {
            step_id: step_id.into(),
            timestamp: Utc::now(),
            envelope,
        }
    }
}

// ---------------------------------------------------------------------------
// QualityTier
// ---------------------------------------------------------------------------

/// How much depth the provider should apply to one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    #[default]
    Fast,
    Detailed,
    Report,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Detailed => "detailed",
            Self::Report => "report",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = TickerflowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fast" => Ok(Self::Fast),
            "detailed" => Ok(Self::Detailed),
            "report" => Ok(Self::Report),
            other => Err(TickerflowError::validation(format!(
                "unsupported detail_level '{other}': use 'fast', 'detailed', or 'report'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// EntityRecord
// ---------------------------------------------------------------------------

/// Lynch-style stock category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Fast Grower")]
    FastGrower,
    #[serde(rename = "Turnaround")]
    Turnaround,
    #[serde(rename = "Stalwart")]
    Stalwart,
    #[serde(rename = "Slow Grower")]
    SlowGrower,
    #[serde(rename = "Cyclical")]
    Cyclical,
    #[serde(rename = "Asset Play")]
    AssetPlay,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Self::FastGrower => "Fast Grower",
            Self::Turnaround => "Turnaround",
            Self::Stalwart => "Stalwart",
            Self::SlowGrower => "Slow Grower",
            Self::Cyclical => "Cyclical",
            Self::AssetPlay => "Asset Play",
        }
    }

    pub const ALL: [Category; 6] = [
        Self::FastGrower,
        Self::Turnaround,
        Self::Stalwart,
        Self::SlowGrower,
        Self::Cyclical,
        Self::AssetPlay,
    ];

    /// Parse a display label, ignoring case and surrounding whitespace.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-ticker sentiment joined into an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub score: Option<f64>,
    pub summary: String,
}

impl Sentiment {
    /// Placeholder for entities no sentiment step reported on.
    pub fn no_data() -> Self {
        Self {
            score: None,
            summary: "N/A".into(),
        }
    }

    pub fn is_no_data(&self) -> bool {
        self.score.is_none() && self.summary == "N/A"
    }
}

/// One ticker's merged view across the vetting and sentiment steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub ticker: String,
    pub category: Category,
    pub vetting_result: Map<String, Value>,
    pub sentiment: Sentiment,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_lowercase_format() {
        let env = StepEnvelope::text("hello", "fast");
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["format"], "text");
        assert_eq!(json["content"], "hello");
        assert_eq!(json["model"], "fast");
    }

    #[test]
    fn envelope_roundtrip_preserves_timestamp() {
        let env = StepEnvelope::json(serde_json::json!([{"ticker": "AAPL"}]), "detailed");
        let raw = serde_json::to_string(&env).unwrap();
        let back: StepEnvelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn quality_tier_parsing() {
        assert_eq!("report".parse::<QualityTier>().unwrap(), QualityTier::Report);
        assert_eq!(QualityTier::default(), QualityTier::Fast);
        let err = "gemini_custom".parse::<QualityTier>().unwrap_err();
        assert!(err.to_string().contains("unsupported detail_level"));
    }

    #[test]
    fn category_uses_display_labels() {
        let json = serde_json::to_string(&Category::FastGrower).unwrap();
        assert_eq!(json, r#""Fast Grower""#);
        let parsed: Category = serde_json::from_str(r#""Asset Play""#).unwrap();
        assert_eq!(parsed, Category::AssetPlay);
        assert_eq!(Category::from_label(" slow grower "), Some(Category::SlowGrower));
        assert_eq!(Category::from_label("Growth"), None);
    }

    #[test]
    fn sentiment_sentinel() {
        let s = Sentiment::no_data();
        assert!(s.is_no_data());
        assert_eq!(
            serde_json::to_value(&s).unwrap(),
            serde_json::json!({"score": null, "summary": "N/A"})
        );
    }
}
