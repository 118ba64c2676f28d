//! Step orchestration: validate the request, serve from cache, otherwise
//! prepare the step's inputs, invoke the provider, and persist the result.
//!
//! Every step takes its input from the request payload first and falls back
//! to what earlier steps left in the cache, so `run_all` can chain the whole
//! pipeline with an empty payload.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use tickerflow_shared::{
    AppConfig, CacheRecord, Category, DefaultsConfig, QualityTier, Result, StepEnvelope,
    TickerflowError, validate_api_key,
};
use tickerflow_storage::{Snapshot, StepCache, open_cache};

use crate::envelope::ComputeOutcome;
use crate::executor::StepExecutor;
use crate::openrouter::OpenRouterProvider;
use crate::payload::{Entity, PayloadLayout, StepPayload, TICKER_FIELD, entity_key, entity_list};
use crate::prompts;
use crate::provider::{MarketData, ReasoningProvider};
use crate::reconcile::{ReconcileSource, reconcile};
use crate::steps::PipelineStep;

const FAST_GROWERS: &str = "fast_growers";
const TURNAROUNDS: &str = "turnarounds";

/// Defaults applied when a request payload is silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub idea_count: u32,
    pub detail_level: QualityTier,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&DefaultsConfig::default())
    }
}

impl From<&DefaultsConfig> for PipelineSettings {
    fn from(defaults: &DefaultsConfig) -> Self {
        Self {
            idea_count: defaults.idea_count,
            detail_level: defaults.detail_level,
        }
    }
}

/// Progress callback for `run_all`.
pub trait ProgressReporter: Send + Sync {
    /// Called before step `index` (0-based) of `total` starts.
    fn step_started(&self, step: PipelineStep, index: usize, total: usize);
    /// Called with the envelope a step produced or served from cache.
    fn step_finished(&self, step: PipelineStep, envelope: &StepEnvelope);
    /// Called once every step has finished.
    fn done(&self, completed: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn step_started(&self, _step: PipelineStep, _index: usize, _total: usize) {}
    fn step_finished(&self, _step: PipelineStep, _envelope: &StepEnvelope) {}
    fn done(&self, _completed: usize) {}
}

/// Categorization result layout.
pub fn categorized_layout() -> PayloadLayout {
    PayloadLayout::Grouped(vec![
        (FAST_GROWERS.into(), Category::FastGrower),
        (TURNAROUNDS.into(), Category::Turnaround),
    ])
}

/// Upstream steps merged for the final selection.
pub fn synthesis_sources() -> Vec<ReconcileSource> {
    vec![
        ReconcileSource::vetting(
            PipelineStep::VettingFastGrowers.as_str(),
            PayloadLayout::List,
            Category::FastGrower,
        ),
        ReconcileSource::vetting(
            PipelineStep::VettingTurnarounds.as_str(),
            PayloadLayout::List,
            Category::Turnaround,
        ),
        ReconcileSource::sentiment(PipelineStep::SentimentAnalysis.as_str(), PayloadLayout::List),
    ]
}

/// The staged research pipeline.
pub struct Pipeline {
    executor: StepExecutor,
    provider: Arc<dyn ReasoningProvider>,
    market: Arc<dyn MarketData>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        cache: Arc<dyn StepCache>,
        provider: Arc<dyn ReasoningProvider>,
        market: Arc<dyn MarketData>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            executor: StepExecutor::new(cache),
            provider,
            market,
            settings,
        }
    }

    /// Open the configured cache and provider.
    pub async fn from_config(config: &AppConfig, market: Arc<dyn MarketData>) -> Result<Self> {
        let api_key = validate_api_key(config)?;
        let provider = OpenRouterProvider::new(&config.provider, api_key)?;
        let cache = open_cache(&config.cache).await?;
        Ok(Self::new(
            cache,
            Arc::new(provider),
            market,
            PipelineSettings::from(&config.defaults),
        ))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run one step.
    ///
    /// `payload` is a JSON object (or null) carrying the step's input field
    /// and an optional `detail_level`. With `use_cache`, a cached result is
    /// returned without touching inputs or the provider.
    #[instrument(skip(self, payload))]
    pub async fn run_step(
        &self,
        step_id: &str,
        use_cache: bool,
        payload: &Value,
    ) -> Result<StepEnvelope> {
        let step: PipelineStep = step_id.parse()?;
        let payload = payload_object(payload)?;
        let tier = self.tier(payload)?;

        let provider = Arc::clone(&self.provider);

        self.executor
            .run_prepared(
                step.as_str(),
                || self.prepare(step, payload),
                move |prompt| async move {
                    info!(%tier, provider = provider.name(), "computing step");
                    let response = provider.invoke(&prompt, tier).await;
                    ComputeOutcome {
                        model_tag: tier.as_str().to_string(),
                        response,
                    }
                },
                use_cache,
            )
            .await
    }

    /// The cached record for a step, validating the id.
    pub async fn read_step(&self, step_id: &str) -> Result<Option<CacheRecord>> {
        let step: PipelineStep = step_id.parse()?;
        Ok(self.executor.lookup(step.as_str()).await)
    }

    /// Every cached record.
    pub async fn read_all_steps(&self) -> Snapshot {
        self.executor.cache().dump_all().await
    }

    /// Run every step in order, each deriving its inputs from the cache.
    ///
    /// Stops at the first step that is rejected (typically because an
    /// upstream step produced nothing usable).
    #[instrument(skip(self, progress))]
    pub async fn run_all(
        &self,
        use_cache: bool,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<(PipelineStep, StepEnvelope)>> {
        let total = PipelineStep::ALL.len();
        let mut completed = Vec::with_capacity(total);

        for (index, step) in PipelineStep::ALL.into_iter().enumerate() {
            progress.step_started(step, index, total);
            let envelope = self.run_step(step.as_str(), use_cache, &Value::Null).await?;
            if !envelope.is_json() {
                warn!(%step, format = envelope.format.as_str(), "step produced no structured result");
            }
            progress.step_finished(step, &envelope);
            completed.push((step, envelope));
        }

        progress.done(completed.len());
        Ok(completed)
    }

    // -----------------------------------------------------------------------
    // Input preparation
    // -----------------------------------------------------------------------

    fn tier(&self, payload: Option<&Map<String, Value>>) -> Result<QualityTier> {
        match payload.and_then(|p| p.get("detail_level")) {
            None | Some(Value::Null) => Ok(self.settings.detail_level),
            Some(Value::String(s)) => s.parse(),
            Some(other) => Err(TickerflowError::validation(format!(
                "detail_level must be a string, got {other}"
            ))),
        }
    }

    /// Build the prompt for `step`.
    async fn prepare(
        &self,
        step: PipelineStep,
        payload: Option<&Map<String, Value>>,
    ) -> Result<String> {
        let input = |field: &str| payload.and_then(|p| p.get(field));

        match step {
            PipelineStep::IdeaGeneration => {
                let count = match input("count") {
                    None | Some(Value::Null) => u64::from(self.settings.idea_count),
                    Some(v) => v.as_u64().filter(|&c| c > 0).ok_or_else(|| {
                        TickerflowError::validation(format!(
                            "count must be a positive integer, got {v}"
                        ))
                    })?,
                };
                Ok(prompts::idea_generation(count))
            }

            PipelineStep::CategorizationTriage => {
                let companies = match explicit_entities("companies_list", input("companies_list"))? {
                    Some(entities) => StepPayload::EntityList(entities).keys(TICKER_FIELD),
                    None => self
                        .cached_payload(PipelineStep::IdeaGeneration, &PayloadLayout::List)
                        .await
                        .keys(TICKER_FIELD),
                };
                if companies.is_empty() {
                    return Err(TickerflowError::missing_input(
                        step.as_str(),
                        "no companies_list given and idea_generation has no cached tickers",
                    ));
                }
                Ok(prompts::categorization(&companies))
            }

            PipelineStep::VettingFastGrowers => {
                let candidates = self
                    .vetting_candidates(step, "fast_growers_data", input("fast_growers_data"), FAST_GROWERS)
                    .await?;
                Ok(prompts::vet_fast_growers(&candidates))
            }

            PipelineStep::VettingTurnarounds => {
                let candidates = self
                    .vetting_candidates(step, "turnarounds_data", input("turnarounds_data"), TURNAROUNDS)
                    .await?;
                Ok(prompts::vet_turnarounds(&candidates))
            }

            PipelineStep::SentimentAnalysis => {
                let tickers = match explicit_entities("stocks_list", input("stocks_list"))? {
                    Some(entities) => StepPayload::EntityList(entities).keys(TICKER_FIELD),
                    None => self.sentiment_tickers().await,
                };
                if tickers.is_empty() {
                    return Err(TickerflowError::missing_input(
                        step.as_str(),
                        "no stocks_list given and no vetted or categorized tickers are cached",
                    ));
                }
                Ok(prompts::sentiment(&tickers, Utc::now()))
            }

            PipelineStep::FinalSelectionSynthesis => {
                let cache = self.executor.cache();
                let reconciled = reconcile(cache.as_ref(), &synthesis_sources(), TICKER_FIELD).await;
                if reconciled.is_empty() {
                    return Err(TickerflowError::missing_input(
                        step.as_str(),
                        format!(
                            "no vetted entities to synthesize (empty: {})",
                            reconciled.empty_sources.join(", ")
                        ),
                    ));
                }
                Ok(prompts::final_selection(&reconciled.into_records()))
            }
        }
    }

    async fn cached_payload(&self, step: PipelineStep, layout: &PayloadLayout) -> StepPayload {
        match self.executor.lookup(step.as_str()).await {
            Some(record) => StepPayload::decode(&record.envelope, layout),
            None => StepPayload::FreeText(String::new()),
        }
    }

    /// Explicit candidates, else the matching categorization group,
    /// annotated with market data.
    async fn vetting_candidates(
        &self,
        step: PipelineStep,
        field: &str,
        explicit: Option<&Value>,
        group: &str,
    ) -> Result<Vec<Entity>> {
        let mut candidates = match explicit_entities(field, explicit)? {
            Some(entities) => entities,
            None => self
                .cached_payload(PipelineStep::CategorizationTriage, &categorized_layout())
                .await
                .group(group),
        };
        if candidates.is_empty() {
            return Err(TickerflowError::missing_input(
                step.as_str(),
                format!("no {field} given and categorization_triage has no cached {group}"),
            ));
        }

        for candidate in &mut candidates {
            let Some(ticker) = entity_key(candidate, TICKER_FIELD) else {
                continue;
            };
            if let Some(snapshot) = self.market.fetch(&ticker).await {
                candidate.insert("market_data".into(), serde_json::to_value(snapshot)?);
            }
        }
        Ok(candidates)
    }

    /// Tickers from the vetting steps, else from categorization.
    async fn sentiment_tickers(&self) -> Vec<String> {
        let mut tickers = self
            .cached_payload(PipelineStep::VettingFastGrowers, &PayloadLayout::List)
            .await
            .keys(TICKER_FIELD);
        for ticker in self
            .cached_payload(PipelineStep::VettingTurnarounds, &PayloadLayout::List)
            .await
            .keys(TICKER_FIELD)
        {
            if !tickers.contains(&ticker) {
                tickers.push(ticker);
            }
        }
        if tickers.is_empty() {
            tickers = self
                .cached_payload(PipelineStep::CategorizationTriage, &categorized_layout())
                .await
                .keys(TICKER_FIELD);
        }
        tickers
    }
}

/// The payload as an object; null means empty.
fn payload_object(payload: &Value) -> Result<Option<&Map<String, Value>>> {
    match payload {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        other => Err(TickerflowError::validation(format!(
            "payload must be a JSON object, got {other}"
        ))),
    }
}

/// An explicit list input. Absent, null, or empty means "derive it".
fn explicit_entities(field: &str, value: Option<&Value>) -> Result<Option<Vec<Entity>>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match entity_list(v) {
            Some(entities) if entities.is_empty() => Ok(None),
            Some(entities) => Ok(Some(entities)),
            None => Err(TickerflowError::validation(format!("{field} must be an array"))),
        },
    }
}
