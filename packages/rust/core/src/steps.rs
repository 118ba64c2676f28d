//! The six registered pipeline steps.

use std::fmt;
use std::str::FromStr;

use tickerflow_shared::TickerflowError;

/// A registered step, addressed by its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStep {
    IdeaGeneration,
    CategorizationTriage,
    VettingFastGrowers,
    VettingTurnarounds,
    SentimentAnalysis,
    FinalSelectionSynthesis,
}

impl PipelineStep {
    /// Every step, in dependency order.
    pub const ALL: [PipelineStep; 6] = [
        Self::IdeaGeneration,
        Self::CategorizationTriage,
        Self::VettingFastGrowers,
        Self::VettingTurnarounds,
        Self::SentimentAnalysis,
        Self::FinalSelectionSynthesis,
    ];

    /// Step id, also the cache key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdeaGeneration => "idea_generation",
            Self::CategorizationTriage => "categorization_triage",
            Self::VettingFastGrowers => "vetting_fast_growers",
            Self::VettingTurnarounds => "vetting_turnarounds",
            Self::SentimentAnalysis => "sentiment_analysis",
            Self::FinalSelectionSynthesis => "final_selection_synthesis",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::IdeaGeneration => "Generate scuttlebutt investment ideas",
            Self::CategorizationTriage => "Sort ideas into Lynch categories, keep fast growers and turnarounds",
            Self::VettingFastGrowers => "Vet fast growers against growth criteria",
            Self::VettingTurnarounds => "Vet turnarounds against recovery criteria",
            Self::SentimentAnalysis => "Score recent market sentiment per ticker",
            Self::FinalSelectionSynthesis => "Pick the top ideas from vetting and sentiment",
        }
    }

    /// Payload field holding this step's explicit input, if it takes one.
    pub fn input_field(&self) -> Option<&'static str> {
        match self {
            Self::IdeaGeneration => Some("count"),
            Self::CategorizationTriage => Some("companies_list"),
            Self::VettingFastGrowers => Some("fast_growers_data"),
            Self::VettingTurnarounds => Some("turnarounds_data"),
            Self::SentimentAnalysis => Some("stocks_list"),
            Self::FinalSelectionSynthesis => None,
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStep {
    type Err = TickerflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| TickerflowError::UnknownStep(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip() {
        for step in PipelineStep::ALL {
            assert_eq!(step.as_str().parse::<PipelineStep>().unwrap(), step);
        }
    }

    #[test]
    fn unknown_id_is_rejected() {
        let err = "insider_trading".parse::<PipelineStep>().unwrap_err();
        assert!(err.is_rejection());
        assert_eq!(err.to_string(), "unknown step: insider_trading");
    }

    #[test]
    fn only_synthesis_has_no_input_field() {
        let without: Vec<_> = PipelineStep::ALL
            .into_iter()
            .filter(|s| s.input_field().is_none())
            .collect();
        assert_eq!(without, vec![PipelineStep::FinalSelectionSynthesis]);
    }
}
