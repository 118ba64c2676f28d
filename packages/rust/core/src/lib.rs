//! Pipeline orchestration and domain logic for tickerflow.
//!
//! The [`Pipeline`] runs the six research steps through the step cache,
//! the [`StepExecutor`] owns the cache-or-compute decision, and
//! [`reconcile`] merges cached step results per ticker for the final
//! selection.

pub mod envelope;
pub mod executor;
pub mod openrouter;
pub mod payload;
pub mod pipeline;
pub mod prompts;
pub mod provider;
pub mod reconcile;
pub mod steps;

pub use envelope::{ComputeOutcome, build};
pub use executor::StepExecutor;
pub use openrouter::OpenRouterProvider;
pub use payload::{Entity, PayloadLayout, StepPayload};
pub use pipeline::{Pipeline, PipelineSettings, ProgressReporter, SilentProgress};
pub use provider::{MarketData, MarketSnapshot, NoMarketData, ReasoningProvider, StaticMarketData};
pub use reconcile::{ReconcileSource, Reconciled, SourceRole, reconcile};
pub use steps::PipelineStep;
