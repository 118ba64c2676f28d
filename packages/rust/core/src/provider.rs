//! The reasoning provider seam and the market-data seam.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use tickerflow_shared::{ComputeError, QualityTier};

/// Something that answers a prompt at a given quality tier.
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    async fn invoke(&self, prompt: &str, tier: QualityTier) -> Result<String, ComputeError>;

    /// Provider name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// Company facts attached to vetting candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub ticker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    /// Free-form numeric or textual metrics (P/E, growth, debt ratio, ...).
    #[serde(default)]
    pub metrics: Map<String, Value>,
}

/// Per-ticker market data lookup. `None` means nothing is known.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn fetch(&self, ticker: &str) -> Option<MarketSnapshot>;
}

/// Market data source that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMarketData;

#[async_trait]
impl MarketData for NoMarketData {
    async fn fetch(&self, _ticker: &str) -> Option<MarketSnapshot> {
        None
    }
}

/// Fixed in-memory snapshots, e.g. loaded from a JSON file.
#[derive(Debug, Clone, Default)]
pub struct StaticMarketData {
    snapshots: HashMap<String, MarketSnapshot>,
}

impl StaticMarketData {
    pub fn new(snapshots: impl IntoIterator<Item = MarketSnapshot>) -> Self {
        Self {
            snapshots: snapshots
                .into_iter()
                .map(|s| (s.ticker.clone(), s))
                .collect(),
        }
    }

    /// Parse a JSON array of snapshots.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        let snapshots: Vec<MarketSnapshot> = serde_json::from_str(raw)?;
        Ok(Self::new(snapshots))
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[async_trait]
impl MarketData for StaticMarketData {
    async fn fetch(&self, ticker: &str) -> Option<MarketSnapshot> {
        self.snapshots.get(ticker).cloned()
    }
}
