//! Cache-aware execution of a single step.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info, instrument};

use tickerflow_shared::{CacheRecord, ComputeError, Result, StepEnvelope};
use tickerflow_storage::StepCache;

use crate::envelope::{self, ComputeOutcome};

/// Model tag recorded when a compute panics before reporting its own.
pub const PANICKED_MODEL_TAG: &str = "unknown";

/// Runs step computes through the step cache.
#[derive(Clone)]
pub struct StepExecutor {
    cache: Arc<dyn StepCache>,
}

impl StepExecutor {
    pub fn new(cache: Arc<dyn StepCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<dyn StepCache> {
        &self.cache
    }

    /// Return the cached envelope for `step_id` when `use_cache` is set and
    /// one exists; otherwise await `compute`, persist its envelope, and
    /// return it.
    ///
    /// Failed computes are stored as error envelopes like any other result,
    /// and so are computes that panic. Only a failed cache write is returned
    /// as `Err`. If the returned future is dropped before `compute`
    /// resolves, nothing is written.
    pub async fn run<F, Fut>(
        &self,
        step_id: &str,
        compute: F,
        use_cache: bool,
    ) -> Result<StepEnvelope>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ComputeOutcome>,
    {
        self.run_prepared(step_id, || async { Ok(()) }, move |()| compute(), use_cache)
            .await
    }

    /// [`run`](Self::run) with an input stage that only runs on a miss.
    ///
    /// An `Err` from `prepare` is returned as is: `compute` is not called and
    /// the cache is not written.
    #[instrument(skip(self, prepare, compute), fields(backend = self.cache.name()))]
    pub async fn run_prepared<P, PFut, T, F, Fut>(
        &self,
        step_id: &str,
        prepare: P,
        compute: F,
        use_cache: bool,
    ) -> Result<StepEnvelope>
    where
        P: FnOnce() -> PFut,
        PFut: Future<Output = Result<T>>,
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = ComputeOutcome>,
    {
        if use_cache {
            if let Some(record) = self.cache.get(step_id).await {
                info!(format = record.envelope.format.as_str(), "cache hit");
                return Ok(record.envelope);
            }
            debug!("cache miss");
        }

        let input = prepare().await?;
        let outcome = match AssertUnwindSafe(async move { compute(input).await })
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(payload) => {
                let detail = panic_detail(payload.as_ref());
                error!(%detail, "step compute panicked");
                ComputeOutcome::failure(PANICKED_MODEL_TAG, ComputeError::Provider(detail))
            }
        };
        let envelope = envelope::build(&outcome);
        self.cache.put(step_id, envelope.clone()).await?;

        info!(
            format = envelope.format.as_str(),
            model = %envelope.model,
            "step computed"
        );
        Ok(envelope)
    }

    /// The cached record for `step_id`, if any.
    pub async fn lookup(&self, step_id: &str) -> Option<CacheRecord> {
        self.cache.get(step_id).await
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("compute panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("compute panicked: {msg}")
    } else {
        "compute panicked".to_string()
    }
}
