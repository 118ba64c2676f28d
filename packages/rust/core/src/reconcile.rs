//! Cross-step reconciliation: merge per-ticker results from several cached
//! steps into one [`EntityRecord`] per ticker.
//!
//! Vetting sources are applied first, in the order given, then sentiment
//! sources are joined onto the vetted entities. Missing or non-JSON
//! upstream results contribute nothing; they are reported in
//! [`Reconciled::empty_sources`] rather than failing the pass.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use tickerflow_shared::{Category, EntityRecord, Sentiment};
use tickerflow_storage::StepCache;

use crate::payload::{Entity, PayloadLayout, StepPayload, entity_key};

/// What a source contributes to each entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRole {
    /// Vetting fields. `category` applies to every entity unless the
    /// layout's group says otherwise.
    Vetting { category: Option<Category> },
    /// Sentiment score and summary, joined by key.
    Sentiment,
}

/// One upstream step read during reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileSource {
    pub step_id: String,
    pub layout: PayloadLayout,
    pub role: SourceRole,
}

impl ReconcileSource {
    pub fn vetting(step_id: impl Into<String>, layout: PayloadLayout, category: Category) -> Self {
        Self {
            step_id: step_id.into(),
            layout,
            role: SourceRole::Vetting {
                category: Some(category),
            },
        }
    }

    pub fn sentiment(step_id: impl Into<String>, layout: PayloadLayout) -> Self {
        Self {
            step_id: step_id.into(),
            layout,
            role: SourceRole::Sentiment,
        }
    }
}

/// Result of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciled {
    /// Merged entities keyed by ticker.
    pub records: BTreeMap<String, EntityRecord>,
    /// Step ids that contributed nothing.
    pub empty_sources: Vec<String>,
}

impl Reconciled {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records as a list, ordered by ticker.
    pub fn into_records(self) -> Vec<EntityRecord> {
        self.records.into_values().collect()
    }
}

/// Read every source from `cache` and merge them by `key_field`.
#[instrument(skip_all, fields(sources = sources.len(), %key_field))]
pub async fn reconcile(
    cache: &dyn StepCache,
    sources: &[ReconcileSource],
    key_field: &str,
) -> Reconciled {
    let mut out = Reconciled::default();
    let mut loaded = Vec::with_capacity(sources.len());

    for source in sources {
        let payload = match cache.get(&source.step_id).await {
            Some(record) => StepPayload::decode(&record.envelope, &source.layout),
            None => {
                warn!(step_id = %source.step_id, "upstream step has no cached result");
                out.empty_sources.push(source.step_id.clone());
                continue;
            }
        };
        if payload.is_empty() {
            warn!(step_id = %source.step_id, "upstream step has no usable entities");
            out.empty_sources.push(source.step_id.clone());
            continue;
        }
        loaded.push((source, payload));
    }

    for (source, payload) in &loaded {
        if let SourceRole::Vetting { category } = source.role {
            apply_vetting(&mut out.records, source, category, payload, key_field);
        }
    }

    for (source, payload) in &loaded {
        if source.role == SourceRole::Sentiment {
            apply_sentiment(&mut out.records, source, payload, key_field);
        }
    }

    let missing = out
        .records
        .values()
        .filter(|r| r.sentiment.is_no_data())
        .count();
    if missing > 0 {
        warn!(missing, "entities without sentiment data");
    }

    info!(
        records = out.records.len(),
        empty = out.empty_sources.len(),
        "reconciliation finished"
    );
    out
}

fn apply_vetting(
    records: &mut BTreeMap<String, EntityRecord>,
    source: &ReconcileSource,
    default_category: Option<Category>,
    payload: &StepPayload,
    key_field: &str,
) {
    for (group, entity) in payload.entities() {
        let Some(ticker) = entity_key(entity, key_field) else {
            debug!(step_id = %source.step_id, "skipping entity without key");
            continue;
        };

        let category = group
            .and_then(|g| source.layout.category_of(g))
            .or(default_category)
            .or_else(|| {
                entity
                    .get("category")
                    .and_then(Value::as_str)
                    .and_then(Category::from_label)
            });
        let Some(category) = category else {
            warn!(step_id = %source.step_id, %ticker, "no category for entity, skipping");
            continue;
        };

        let fields = vetting_fields(entity, key_field);
        match records.get_mut(&ticker) {
            Some(existing) => {
                if existing.category != category {
                    warn!(
                        %ticker,
                        previous = %existing.category,
                        current = %category,
                        "category conflict, keeping the later one"
                    );
                    existing.category = category;
                }
                existing.vetting_result.extend(fields);
            }
            None => {
                records.insert(
                    ticker.clone(),
                    EntityRecord {
                        ticker,
                        category,
                        vetting_result: fields,
                        sentiment: Sentiment::no_data(),
                    },
                );
            }
        }
    }
}

/// The entity's `vetting_results`/`vetting_result` object, or every
/// field except the key when neither is present.
fn vetting_fields(entity: &Entity, key_field: &str) -> Map<String, Value> {
    for field in ["vetting_results", "vetting_result"] {
        if let Some(Value::Object(map)) = entity.get(field) {
            return map.clone();
        }
    }
    entity
        .iter()
        .filter(|(k, _)| k.as_str() != key_field)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn apply_sentiment(
    records: &mut BTreeMap<String, EntityRecord>,
    source: &ReconcileSource,
    payload: &StepPayload,
    key_field: &str,
) {
    let mut unmatched = Vec::new();

    for (_, entity) in payload.entities() {
        let Some(ticker) = entity_key(entity, key_field) else {
            continue;
        };
        let Some(record) = records.get_mut(&ticker) else {
            unmatched.push(ticker);
            continue;
        };

        let raw_score = entity
            .get("sentiment_score")
            .or_else(|| entity.get("score"))
            .filter(|v| !v.is_null());
        let score = raw_score.and_then(Value::as_f64);
        if let (Some(raw), None) = (raw_score, score) {
            warn!(%ticker, score = %raw, "sentiment score is not a number, stored as null");
        }

        let summary = match entity.get("summary").and_then(Value::as_str) {
            Some(summary) => summary.to_string(),
            None => {
                warn!(%ticker, "sentiment has no summary, using N/A");
                Sentiment::no_data().summary
            }
        };
        record.sentiment = Sentiment { score, summary };
    }

    if !unmatched.is_empty() {
        warn!(
            step_id = %source.step_id,
            tickers = ?unmatched,
            "sentiment for tickers that were not vetted, dropped"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tickerflow_shared::StepEnvelope;
    use tickerflow_storage::FileStepCache;

    use super::*;
    use crate::test_support::temp_path;

    fn sources() -> Vec<ReconcileSource> {
        vec![
            ReconcileSource::vetting("vetting_fast_growers", PayloadLayout::List, Category::FastGrower),
            ReconcileSource::vetting("vetting_turnarounds", PayloadLayout::List, Category::Turnaround),
            ReconcileSource::sentiment("sentiment_analysis", PayloadLayout::List),
        ]
    }

    async fn seeded(entries: Vec<(&str, StepEnvelope)>) -> Arc<FileStepCache> {
        let cache = Arc::new(FileStepCache::new(temp_path("cache.json")));
        for (step, env) in entries {
            cache.put(step, env).await.unwrap();
        }
        cache
    }

    #[tokio::test]
    async fn merges_vetting_and_sentiment() {
        let cache = seeded(vec![
            (
                "vetting_fast_growers",
                StepEnvelope::json(
                    json!([{"ticker": "NVDA", "vetting_results": {"Leader": {"score": 8, "pass": true}}}]),
                    "fast",
                ),
            ),
            (
                "vetting_turnarounds",
                StepEnvelope::json(
                    json!([{"ticker": "CCL", "vetting_results": {"Insider Buying": "some"}}]),
                    "fast",
                ),
            ),
            (
                "sentiment_analysis",
                StepEnvelope::json(
                    json!([
                        {"ticker": "NVDA", "sentiment_score": 0.85, "summary": "AI demand"},
                        {"ticker": "TSLA", "sentiment_score": -0.2, "summary": "not vetted"},
                    ]),
                    "fast",
                ),
            ),
        ])
        .await;

        let out = reconcile(cache.as_ref(), &sources(), "ticker").await;
        assert!(out.empty_sources.is_empty());
        assert_eq!(out.records.len(), 2);

        let nvda = &out.records["NVDA"];
        assert_eq!(nvda.category, Category::FastGrower);
        assert_eq!(nvda.vetting_result["Leader"]["score"], 8);
        assert_eq!(nvda.sentiment.score, Some(0.85));
        assert_eq!(nvda.sentiment.summary, "AI demand");

        let ccl = &out.records["CCL"];
        assert_eq!(ccl.category, Category::Turnaround);
        assert!(ccl.sentiment.is_no_data());

        assert!(!out.records.contains_key("TSLA"));
    }

    #[tokio::test]
    async fn missing_and_text_sources_are_reported_empty() {
        let cache = seeded(vec![
            (
                "vetting_fast_growers",
                StepEnvelope::json(json!([{"ticker": "SMCI", "growth": "fast"}]), "fast"),
            ),
            ("sentiment_analysis", StepEnvelope::text("markets are calm", "fast")),
        ])
        .await;

        let out = reconcile(cache.as_ref(), &sources(), "ticker").await;
        assert_eq!(out.empty_sources, vec!["vetting_turnarounds", "sentiment_analysis"]);

        let smci = &out.records["SMCI"];
        assert_eq!(smci.vetting_result, json!({"growth": "fast"}).as_object().unwrap().clone());
        assert_eq!(smci.sentiment, Sentiment::no_data());
    }

    #[tokio::test]
    async fn later_vetting_merges_fields_and_wins_category() {
        let cache = seeded(vec![
            (
                "vetting_fast_growers",
                StepEnvelope::json(json!([{"ticker": "BA", "vetting_result": {"a": 1, "b": 1}}]), "fast"),
            ),
            (
                "vetting_turnarounds",
                StepEnvelope::json(json!([{"ticker": "BA", "vetting_result": {"b": 2}}]), "fast"),
            ),
        ])
        .await;

        let out = reconcile(cache.as_ref(), &sources(), "ticker").await;
        let ba = &out.records["BA"];
        assert_eq!(ba.category, Category::Turnaround);
        assert_eq!(ba.vetting_result["a"], 1);
        assert_eq!(ba.vetting_result["b"], 2);
    }

    #[tokio::test]
    async fn grouped_layout_assigns_group_categories() {
        let cache = seeded(vec![(
            "categorization_triage",
            StepEnvelope::json(
                json!({
                    "fast_growers": [{"ticker": "NVDA", "justification": "chips"}],
                    "turnarounds": [{"ticker": "CCL", "justification": "cruises"}],
                }),
                "fast",
            ),
        )])
        .await;

        let layout = PayloadLayout::Grouped(vec![
            ("fast_growers".into(), Category::FastGrower),
            ("turnarounds".into(), Category::Turnaround),
        ]);
        let source = ReconcileSource {
            step_id: "categorization_triage".into(),
            layout,
            role: SourceRole::Vetting { category: None },
        };

        let out = reconcile(cache.as_ref(), &[source], "ticker").await;
        assert_eq!(out.records["NVDA"].category, Category::FastGrower);
        assert_eq!(out.records["CCL"].category, Category::Turnaround);
        assert_eq!(out.records["CCL"].vetting_result["justification"], "cruises");
    }

    #[tokio::test]
    async fn sentiment_before_vetting_in_source_order_still_joins() {
        let cache = seeded(vec![
            (
                "sentiment_analysis",
                StepEnvelope::json(json!([{"ticker": "CCL", "score": 0.1, "summary": "mixed"}]), "fast"),
            ),
            (
                "vetting_turnarounds",
                StepEnvelope::json(json!([{"ticker": "CCL"}]), "fast"),
            ),
        ])
        .await;

        let mut reordered = sources();
        reordered.rotate_right(1);
        let out = reconcile(cache.as_ref(), &reordered, "ticker").await;
        assert_eq!(out.records["CCL"].sentiment.score, Some(0.1));
    }

    #[tokio::test]
    async fn sentiment_joins_only_on_the_exact_ticker() {
        let cache = seeded(vec![
            (
                "vetting_fast_growers",
                StepEnvelope::json(json!([{"ticker": "NVDA"}, {"ticker": "AMD"}]), "fast"),
            ),
            (
                "sentiment_analysis",
                StepEnvelope::json(
                    json!([
                        {"ticker": " NVDA ", "sentiment_score": 0.5, "summary": "padded"},
                        {"ticker": "amd", "sentiment_score": 0.3, "summary": "lowercase"},
                    ]),
                    "fast",
                ),
            ),
        ])
        .await;

        let out = reconcile(cache.as_ref(), &sources(), "ticker").await;
        assert_eq!(out.records.len(), 2);
        assert!(out.records["NVDA"].sentiment.is_no_data());
        assert!(out.records["AMD"].sentiment.is_no_data());
    }

    #[tokio::test]
    async fn incomplete_sentiment_fields_fall_back_to_the_sentinel_values() {
        let cache = seeded(vec![
            (
                "vetting_fast_growers",
                StepEnvelope::json(json!([{"ticker": "NVDA"}, {"ticker": "AMD"}]), "fast"),
            ),
            (
                "sentiment_analysis",
                StepEnvelope::json(
                    json!([
                        {"ticker": "NVDA", "sentiment_score": 0.5},
                        {"ticker": "AMD", "sentiment_score": "0.7", "summary": "ok"},
                    ]),
                    "fast",
                ),
            ),
        ])
        .await;

        let out = reconcile(cache.as_ref(), &sources(), "ticker").await;
        let nvda = &out.records["NVDA"].sentiment;
        assert_eq!(nvda.score, Some(0.5));
        assert_eq!(nvda.summary, "N/A");

        let amd = &out.records["AMD"].sentiment;
        assert_eq!(amd.score, None);
        assert_eq!(amd.summary, "ok");
    }

    #[tokio::test]
    async fn everything_empty_yields_no_records() {
        let cache = seeded(vec![]).await;
        let out = reconcile(cache.as_ref(), &sources(), "ticker").await;
        assert!(out.is_empty());
        assert_eq!(out.empty_sources.len(), 3);
    }
}
