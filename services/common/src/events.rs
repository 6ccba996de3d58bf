//! Engine event channel
//!
//! Outbound events for the surrounding application: rate updates after each
//! successful ingestion cycle and threshold alerts from the cache. Delivery is
//! broadcast-based and never blocks the publisher; a lagging subscriber drops
//! old events rather than stalling a cache write or pipeline cycle.

use crate::constants::pipeline::EVENT_CHANNEL_CAPACITY;
use crate::types::{AlertDirection, CachedRate, CurrencyPair};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Aggregate outcome of validating one ingestion cycle's rates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Rates checked
    pub total: usize,
    /// Rates that passed
    pub valid: usize,
    /// Rates rejected
    pub invalid: usize,
    /// Rates with warnings (stale, anomalous, wide spread)
    pub warnings: usize,
    /// Mean quality score across checked rates
    pub average_quality: f64,
    /// Cross-rate inconsistencies found
    pub inconsistencies: usize,
    /// Triangular arbitrage opportunities found (informational)
    pub arbitrage_opportunities: usize,
}

/// Events emitted by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A successful ingestion cycle refreshed the cached rates
    RatesUpdated {
        /// Consolidated rates by pair string ("EUR/USD")
        rates: FxHashMap<String, CachedRate>,
        /// Validation outcome for the cycle
        validation: ValidationSummary,
        /// Mean consolidation quality for the cycle
        quality_score: f64,
    },
    /// A rate alert threshold was crossed
    RateAlert {
        pair: CurrencyPair,
        threshold: f64,
        direction: AlertDirection,
        current_rate: f64,
    },
    /// The pipeline stopped itself after consecutive failures
    PipelineStopped { reason: String },
}

/// Broadcast channel for engine events
///
/// Subscribers are registered up front via `subscribe`; publishing succeeds
/// whether or not anyone is listening.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event without blocking
    ///
    /// Returns the number of subscribers that will observe it.
    pub fn publish(&self, event: EngineEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("engine event dropped: no subscribers");
                0
            }
        }
    }

    /// Current subscriber count
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}
