//! Rate Cache Service
//!
//! Durable TTL-based store for consolidated FX rates, backed by redis with a
//! transparent in-process fallback:
//! - Write-through to the primary plus opportunistic memory population
//! - Reads degrade to the memory cache when the primary is unreachable
//! - Threshold alert watches evaluated on every write, delivered off the
//!   write path via the engine event bus

pub mod alerts;
pub mod backend;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use services_common::{
    AlertDirection, CacheConfig, CachedRate, CurrencyPair, EngineEvent, EventBus,
    constants::cache::RATE_KEY_PREFIX,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, warn};
use uuid::Uuid;

pub use alerts::AlertBook;
pub use backend::{CacheBackend, MemoryBackend, RedisBackend};

/// Cache counters and connection state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheInfo {
    /// Whether the primary store answered its last operation
    pub primary_connected: bool,
    /// Whether a primary store is configured at all
    pub primary_configured: bool,
    pub hits: u64,
    pub misses: u64,
    /// Reads served by the memory fallback after a primary failure
    pub fallback_hits: u64,
    /// Primary operations that failed
    pub primary_errors: u64,
}

/// Health report for the cache layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheHealth {
    /// "healthy" when the primary answers, "degraded" on memory-only service
    pub status: String,
    pub is_healthy: bool,
    pub info: CacheInfo,
}

/// Rate cache with primary/fallback tiers and alert evaluation
pub struct RateCache {
    primary: Option<Box<dyn CacheBackend>>,
    fallback: MemoryBackend,
    ttl_secs: u64,
    alerts: AlertBook,
    events: EventBus,
    primary_healthy: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    fallback_hits: AtomicU64,
    primary_errors: AtomicU64,
}

impl RateCache {
    /// Connect to the configured redis primary
    ///
    /// Fails when redis is unreachable; the pipeline treats that as a fatal
    /// startup error. Runtime failures after a successful connect degrade to
    /// the memory fallback instead.
    pub async fn connect(config: &CacheConfig, events: EventBus) -> Result<Self> {
        let primary = RedisBackend::connect(&config.redis_url).await?;
        Ok(Self::assemble(Some(Box::new(primary)), config, events))
    }

    /// Memory-only cache (tests, demos, environments without redis)
    pub fn in_memory(config: &CacheConfig, events: EventBus) -> Self {
        Self::assemble(None, config, events)
    }

    /// Cache over an arbitrary primary backend
    pub fn with_backend(
        primary: Box<dyn CacheBackend>,
        config: &CacheConfig,
        events: EventBus,
    ) -> Self {
        Self::assemble(Some(primary), config, events)
    }

    fn assemble(
        primary: Option<Box<dyn CacheBackend>>,
        config: &CacheConfig,
        events: EventBus,
    ) -> Self {
        let configured = primary.is_some();
        Self {
            primary,
            fallback: MemoryBackend::new(),
            ttl_secs: config.ttl_secs,
            alerts: AlertBook::new(config.alert_cooldown_secs),
            events,
            primary_healthy: AtomicBool::new(configured),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            fallback_hits: AtomicU64::new(0),
            primary_errors: AtomicU64::new(0),
        }
    }

    fn key(pair: &CurrencyPair) -> String {
        format!("{RATE_KEY_PREFIX}:{pair}")
    }

    /// Write one rate through the cache tiers and evaluate alert watches
    ///
    /// Primary failures degrade the cache rather than failing the write; the
    /// memory tier always receives the entry, so each pair's write is atomic
    /// from a reader's point of view.
    pub async fn set_rate(&self, rate: &CachedRate) -> Result<()> {
        let pair = &rate.consolidated.pair;
        let key = Self::key(pair);
        let payload = serde_json::to_string(rate)?;

        if let Some(primary) = &self.primary {
            match primary.put(&key, &payload, self.ttl_secs).await {
                Ok(()) => self.primary_healthy.store(true, Ordering::Relaxed),
                Err(err) => {
                    self.primary_errors.fetch_add(1, Ordering::Relaxed);
                    self.primary_healthy.store(false, Ordering::Relaxed);
                    warn!(%pair, %err, "primary cache write failed, memory tier only");
                }
            }
        }

        // Opportunistic fallback population keeps reads alive through a
        // primary outage
        self.fallback.put(&key, &payload, self.ttl_secs).await?;

        for fired in self.alerts.evaluate(pair, rate.rate()) {
            self.events.publish(EngineEvent::RateAlert {
                pair: fired.pair,
                threshold: fired.threshold,
                direction: fired.direction,
                current_rate: rate.rate(),
            });
        }

        Ok(())
    }

    /// Batch write
    pub async fn set_rates(&self, rates: &[CachedRate]) -> Result<()> {
        for rate in rates {
            self.set_rate(rate).await?;
        }
        Ok(())
    }

    /// Read a pair's cached rate, falling back transparently
    pub async fn get_rate(&self, pair: &CurrencyPair) -> Option<CachedRate> {
        let key = Self::key(pair);

        if let Some(primary) = &self.primary {
            match primary.fetch(&key).await {
                Ok(Some(payload)) => {
                    self.primary_healthy.store(true, Ordering::Relaxed);
                    return match serde_json::from_str(&payload) {
                        Ok(rate) => {
                            self.hits.fetch_add(1, Ordering::Relaxed);
                            Some(rate)
                        }
                        Err(err) => {
                            warn!(%pair, %err, "corrupt cache entry dropped");
                            self.misses.fetch_add(1, Ordering::Relaxed);
                            None
                        }
                    };
                }
                Ok(None) => {
                    self.primary_healthy.store(true, Ordering::Relaxed);
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                Err(err) => {
                    self.primary_errors.fetch_add(1, Ordering::Relaxed);
                    self.primary_healthy.store(false, Ordering::Relaxed);
                    debug!(%pair, %err, "primary cache read failed, trying fallback");
                }
            }
        }

        match self.fallback.fetch(&key).await {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(rate) => {
                    self.fallback_hits.fetch_add(1, Ordering::Relaxed);
                    Some(rate)
                }
                Err(_) => None,
            },
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Remove all rate keys from both tiers
    pub async fn clear_cache(&self) -> Result<usize> {
        let mut removed = 0;
        if let Some(primary) = &self.primary {
            match primary.purge_prefix(RATE_KEY_PREFIX).await {
                Ok(count) => removed = count,
                Err(err) => {
                    self.primary_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(%err, "primary cache purge failed");
                }
            }
        }
        let fallback_removed = self.fallback.purge_prefix(RATE_KEY_PREFIX).await?;
        Ok(removed.max(fallback_removed))
    }

    /// Register a threshold watch on a pair
    pub fn set_rate_alert(
        &self,
        pair: CurrencyPair,
        threshold: f64,
        direction: AlertDirection,
    ) -> Uuid {
        self.alerts.register(pair, threshold, direction)
    }

    /// Remove a watch by id
    pub fn remove_rate_alert(&self, id: Uuid) -> bool {
        self.alerts.remove(id)
    }

    /// All registered watches
    pub fn list_alerts(&self) -> Vec<services_common::RateAlert> {
        self.alerts.list()
    }

    /// Counters and connection state
    pub fn get_cache_info(&self) -> CacheInfo {
        CacheInfo {
            primary_connected: self.primary_healthy.load(Ordering::Relaxed),
            primary_configured: self.primary.is_some(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fallback_hits: self.fallback_hits.load(Ordering::Relaxed),
            primary_errors: self.primary_errors.load(Ordering::Relaxed),
        }
    }

    /// Probe the primary and report cache health
    pub async fn health_check(&self) -> CacheHealth {
        let primary_ok = match &self.primary {
            Some(primary) => match primary.ping().await {
                Ok(()) => {
                    self.primary_healthy.store(true, Ordering::Relaxed);
                    true
                }
                Err(_) => {
                    self.primary_healthy.store(false, Ordering::Relaxed);
                    false
                }
            },
            None => false,
        };

        let status = if primary_ok { "healthy" } else { "degraded" };
        CacheHealth {
            status: status.to_string(),
            is_healthy: primary_ok,
            info: self.get_cache_info(),
        }
    }
}
