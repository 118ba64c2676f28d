//! Shared types, error model, and configuration for tickerflow.
//!
//! This crate is the foundation depended on by all other tickerflow crates.
//! It provides:
//! - [`TickerflowError`]: the unified error type, and [`ComputeError`] for
//!   provider/compute failures
//! - Domain types ([`StepEnvelope`], [`CacheRecord`], [`EntityRecord`], [`QualityTier`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CacheBackend, CacheConfig, DefaultsConfig, ProviderConfig, config_dir,
    config_file_path, expand_home, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{ComputeError, Result, TickerflowError};
pub use types::{
    CacheRecord, Category, EntityRecord, EnvelopeFormat, QualityTier, Sentiment, StepEnvelope,
};
