//! Prompt templates for each step.

use chrono::{DateTime, Utc};
use serde_json::Value;

use tickerflow_shared::EntityRecord;

use crate::payload::Entity;

pub fn idea_generation(count: u64) -> String {
    format!(
        r#"You are a stock analyst who works the way Philip Fisher and Peter Lynch did: by scuttlebutt.
List {count} public companies showing strong qualitative signals of success or of significant
operational change: enthusiastic customers, high employee morale, product buzz, industry
disruption, or early signs of a turnaround. Give each a one or two sentence reason.

Return only a JSON array:
[
  {{"ticker": "AAPL", "reason": "Strong customer loyalty for the new iPhone. Positive employee reviews."}},
  {{"ticker": "MSFT", "reason": "Enterprise clients praising cloud products. Growing developer community."}}
]"#
    )
}

pub fn categorization(companies: &[String]) -> String {
    format!(
        r#"You classify companies using Peter Lynch's six categories: Slow Grower, Stalwart,
Fast Grower, Cyclical, Turnaround, Asset Play. Classify each of the {n} companies below with a
short justification, then keep only the Fast Growers and Turnarounds.

Companies:
{list}

Return only a JSON object with the keys "fast_growers" and "turnarounds", each an array of
{{"ticker": string, "justification": string}}:
{{
  "fast_growers": [{{"ticker": "NVDA", "justification": "Leader in AI chips."}}],
  "turnarounds": [{{"ticker": "CCL", "justification": "Recovering from pandemic impact."}}]
}}"#,
        n = companies.len(),
        list = companies.join("\n"),
    )
}

pub fn vet_fast_growers(candidates: &[Entity]) -> String {
    format!(
        r#"You rigorously vet fast-growing companies. Candidates, with any earlier findings and
market data:
{data}

Score each against fast grower criteria: quarterly and annual EPS growth, sales growth, new
products or highs, market leadership, institutional sponsorship, PEG ratio, balance sheet.
Refine earlier findings where given.

Return only a JSON array of {{"ticker": string, "vetting_results": {{criterion: {{"score": 0-10, "pass": bool}}}}}}:
[
  {{"ticker": "NVDA", "vetting_results": {{"Annual EPS Growth": {{"score": 8, "pass": true}}}}}}
]"#,
        data = pretty(candidates),
    )
}

pub fn vet_turnarounds(candidates: &[Entity]) -> String {
    format!(
        r#"You rigorously vet turnaround companies. Candidates, with any earlier findings and
market data:
{data}

Assess each on the nature of the turnaround, balance sheet strength, insider buying, early
signs of success, and what is new (products, management, strategy). Refine earlier findings
where given.

Return only a JSON array of {{"ticker": string, "vetting_results": {{factor: string}}}}:
[
  {{"ticker": "CCL", "vetting_results": {{"Balance Sheet Strength": "Improving cash flow, still high debt."}}}}
]"#,
        data = pretty(candidates),
    )
}

pub fn sentiment(tickers: &[String], now: DateTime<Utc>) -> String {
    format!(
        r#"You are a financial analyst. It is {now} UTC. Assess current market sentiment for the
companies below from news, social media and analyst commentary of the past month, weighting
the most recent information highest.

Companies:
{list}

Return only a JSON array of {{"ticker": string, "sentiment_score": -1.0 to 1.0, "summary": string}}:
[
  {{"ticker": "AAPL", "sentiment_score": 0.85, "summary": "Strong pre-orders and bullish analyst notes."}}
]"#,
        now = now.format("%Y-%m-%d %H:%M:%S"),
        list = tickers.join("\n"),
    )
}

pub fn final_selection(records: &[EntityRecord]) -> String {
    let data = serde_json::to_string_pretty(records).unwrap_or_else(|_| "[]".into());
    format!(
        r#"You are a portfolio manager synthesizing earlier research. Vetted stocks, with their
category, vetting results and sentiment:
{data}

Select the 10 strongest opportunities for the next one to four weeks, mixing categories but
favouring conviction. Treat sentiment as confirmation or as a red flag.

Return only a JSON array of objects with the keys "ticker", "company_name", "category",
"investment_thesis" (3-5 sentences), "vetting_results" (copied from the input) and
"sentiment_analysis" ({{"score", "summary"}})."#
    )
}

fn pretty(entities: &[Entity]) -> String {
    let value = Value::Array(entities.iter().cloned().map(Value::Object).collect());
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| "[]".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn idea_prompt_carries_count() {
        assert!(idea_generation(25).contains("List 25 public companies"));
    }

    #[test]
    fn categorization_lists_one_ticker_per_line() {
        let prompt = categorization(&["AAPL".into(), "CCL".into()]);
        assert!(prompt.contains("each of the 2 companies"));
        assert!(prompt.contains("AAPL\nCCL"));
    }

    #[test]
    fn vetting_prompt_embeds_candidates() {
        let candidate = json!({"ticker": "NVDA", "justification": "chips"})
            .as_object()
            .unwrap()
            .clone();
        let prompt = vet_fast_growers(&[candidate]);
        assert!(prompt.contains(r#""ticker": "NVDA""#));
    }
}
