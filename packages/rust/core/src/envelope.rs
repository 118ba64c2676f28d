//! Turning a compute outcome into a [`StepEnvelope`].

use tickerflow_extract::{ExtractedValue, extract};
use tickerflow_shared::{ComputeError, StepEnvelope};

/// What a step's compute function produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeOutcome {
    /// Tag copied into the envelope's `model` field.
    pub model_tag: String,
    pub response: Result<String, ComputeError>,
}

impl ComputeOutcome {
    pub fn success(model_tag: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            model_tag: model_tag.into(),
            response: Ok(raw.into()),
        }
    }

    pub fn failure(model_tag: impl Into<String>, error: ComputeError) -> Self {
        Self {
            model_tag: model_tag.into(),
            response: Err(error),
        }
    }
}

/// Build the envelope for `outcome`. Never fails.
pub fn build(outcome: &ComputeOutcome) -> StepEnvelope {
    match &outcome.response {
        Err(e) => StepEnvelope::error(e.user_message(), outcome.model_tag.as_str()),
        Ok(raw) => match extract(raw) {
            ExtractedValue::Json { value, .. } => {
                StepEnvelope::json(value, outcome.model_tag.as_str())
            }
            ExtractedValue::Text(text) => StepEnvelope::text(text, outcome.model_tag.as_str()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tickerflow_shared::EnvelopeFormat;

    #[test]
    fn fenced_response_becomes_json() {
        let outcome =
            ComputeOutcome::success("fast", "```json\n[{\"ticker\":\"AAPL\",\"reason\":\"x\"}]\n```");
        let env = build(&outcome);
        assert_eq!(env.format, EnvelopeFormat::Json);
        assert_eq!(env.content, json!([{"ticker": "AAPL", "reason": "x"}]));
        assert_eq!(env.model, "fast");
    }

    #[test]
    fn prose_response_becomes_text() {
        let env = build(&ComputeOutcome::success("detailed", "No strong ideas today."));
        assert_eq!(env.format, EnvelopeFormat::Text);
        assert_eq!(env.as_text(), Some("No strong ideas today."));
    }

    #[test]
    fn empty_response_is_empty_text() {
        let env = build(&ComputeOutcome::success("fast", ""));
        assert_eq!(env.format, EnvelopeFormat::Text);
        assert_eq!(env.content, json!(""));
    }

    #[test]
    fn resource_exhaustion_has_distinct_message() {
        let outcome =
            ComputeOutcome::failure("fast", ComputeError::ResourceExhausted("429".into()));
        let env = build(&outcome);
        assert_eq!(env.format, EnvelopeFormat::Error);
        assert_eq!(
            env.as_text(),
            Some(
                "AI evaluation failed: Resource exhausted. The service is temporarily \
                 unavailable. Please try again later."
            )
        );
    }

    #[test]
    fn other_failures_carry_detail() {
        let outcome = ComputeOutcome::failure("report", ComputeError::Transport("timed out".into()));
        let env = build(&outcome);
        assert_eq!(env.format, EnvelopeFormat::Error);
        assert_eq!(env.as_text(), Some("AI evaluation failed: timed out"));
        assert_eq!(env.model, "report");
    }
}
