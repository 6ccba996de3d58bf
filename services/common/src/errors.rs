//! Engine error taxonomy
//!
//! Errors are isolated as locally as possible: provider and validation errors
//! stay inside an ingestion cycle, cache errors degrade to the memory
//! fallback, and only pipeline-fatal conditions reach the caller.

use thiserror::Error;

/// Engine error types
#[derive(Debug, Error)]
pub enum EngineError {
    /// Provider fetch failed (network/HTTP); isolated per provider
    #[error("provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    /// Malformed or nonsensical rate data, rejected from consolidation
    #[error("validation failed for {pair}: {message}")]
    Validation { pair: String, message: String },

    /// Primary cache store unavailable; reads degrade to the memory fallback
    #[error("cache error: {0}")]
    Cache(String),

    /// Pipeline stopped after consecutive failures or failed to start
    #[error("pipeline stopped: {0}")]
    PipelineStopped(String),

    /// No rate available for a currency the computation requires
    #[error("no rate available for {currency} (base {base})")]
    MissingRate { currency: String, base: String },

    /// Risk or hedging computation failed
    #[error("computation error: {0}")]
    Computation(String),

    /// Configuration is missing or inconsistent
    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Provider failure helper
    pub fn provider(provider: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error is fatal to the pipeline as a whole
    pub fn is_pipeline_fatal(&self) -> bool {
        matches!(self, Self::PipelineStopped(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::MissingRate {
            currency: "SEK".to_string(),
            base: "USD".to_string(),
        };
        assert_eq!(err.to_string(), "no rate available for SEK (base USD)");
        assert!(!err.is_pipeline_fatal());
        assert!(EngineError::PipelineStopped("max failures".into()).is_pipeline_fatal());
    }
}
