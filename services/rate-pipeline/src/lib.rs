//! FX rate ingestion pipeline.
//!
//! Drives the fetch -> validate -> consolidate -> cache cycle on a timer:
//! all configured providers are queried in parallel with a per-provider
//! timeout, surviving quotes are merged per pair and written to the cache,
//! and a `RatesUpdated` event closes the cycle. Provider failures are
//! isolated; only a run of cycles where *every* provider fails stops the
//! pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rate_cache::RateCache;
use rate_validator::RateValidator;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use services_common::{
    CachedRate, ConsolidatedRate, CurrencyPair, EngineConfig, EngineError, EngineEvent, EventBus,
    RateDerivation, RawRate,
};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub mod consolidator;
pub mod providers;

pub use consolidator::RateConsolidator;
pub use providers::{ProviderFactory, RateProvider};

/// Per-provider health accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStats {
    pub name: String,
    /// False once consecutive failures reach the unhealthy threshold.
    pub healthy: bool,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_success: Option<DateTime<Utc>>,
}

impl ProviderStats {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            healthy: true,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            last_error: None,
            last_success: None,
        }
    }

    fn record_success(&mut self) {
        self.success_count += 1;
        self.consecutive_failures = 0;
        self.healthy = true;
        self.last_error = None;
        self.last_success = Some(Utc::now());
    }

    fn record_failure(&mut self, error: String) {
        self.failure_count += 1;
        self.consecutive_failures += 1;
        self.last_error = Some(error);
        if self.consecutive_failures >= services_common::constants::pipeline::PROVIDER_FAILURE_THRESHOLD
        {
            self.healthy = false;
        }
    }
}

/// Overall pipeline state reported by `health_check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Running,
    Degraded,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineHealth {
    pub status: PipelineStatus,
    pub is_healthy: bool,
    pub providers: Vec<ProviderStats>,
    pub last_update: Option<DateTime<Utc>>,
    pub cycles_completed: u64,
    /// Cycles in a row where every provider failed.
    pub consecutive_failures: u32,
}

/// The ingestion pipeline.
///
/// Shared behind an `Arc`; `start` spawns the timer loop onto the runtime
/// and returns immediately.
pub struct RatePipeline {
    config: EngineConfig,
    providers: Vec<Arc<dyn RateProvider>>,
    consolidator: RwLock<RateConsolidator>,
    validator: RwLock<RateValidator>,
    cache: Arc<RateCache>,
    events: EventBus,
    is_running: AtomicBool,
    cycle_in_progress: AtomicBool,
    consecutive_failures: AtomicU32,
    cycles_completed: AtomicU64,
    last_update: RwLock<Option<DateTime<Utc>>>,
    provider_stats: RwLock<FxHashMap<String, ProviderStats>>,
}

impl RatePipeline {
    /// Build a pipeline over explicit provider instances.
    pub fn new(
        config: EngineConfig,
        providers: Vec<Arc<dyn RateProvider>>,
        cache: Arc<RateCache>,
        events: EventBus,
    ) -> Self {
        let mut reliability = FxHashMap::default();
        let mut stats = FxHashMap::default();
        for provider in &providers {
            reliability.insert(
                provider.name().to_string(),
                config.provider_reliability(provider.name()),
            );
            stats.insert(provider.name().to_string(), ProviderStats::new(provider.name()));
        }

        Self {
            consolidator: RwLock::new(RateConsolidator::new(reliability)),
            validator: RwLock::new(RateValidator::new(config.validation.clone())),
            providers,
            cache,
            events,
            is_running: AtomicBool::new(false),
            cycle_in_progress: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
            cycles_completed: AtomicU64::new(0),
            last_update: RwLock::new(None),
            provider_stats: RwLock::new(stats),
            config,
        }
    }

    /// Build a pipeline with providers instantiated from configuration.
    pub fn from_config(
        config: EngineConfig,
        cache: Arc<RateCache>,
        events: EventBus,
    ) -> Result<Self> {
        let client = ProviderFactory::http_client(config.provider_timeout_secs)?;
        let mut providers: Vec<Arc<dyn RateProvider>> = Vec::new();
        for entry in &config.providers {
            match ProviderFactory::create(entry, client.clone()) {
                Some(provider) => providers.push(Arc::from(provider)),
                None => warn!(provider = %entry.name, "skipping unknown or misconfigured provider"),
            }
        }
        anyhow::ensure!(!providers.is_empty(), "no usable rate providers configured");
        Ok(Self::new(config, providers, cache, events))
    }

    /// Start the timer loop. Fails when the cache's primary store is
    /// configured but unreachable; a pipeline that cannot persist rates
    /// must not pretend to run.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            debug!("pipeline already running");
            return Ok(());
        }

        let cache_info = self.cache.get_cache_info();
        if cache_info.primary_configured && !cache_info.primary_connected {
            self.is_running.store(false, Ordering::SeqCst);
            return Err(EngineError::Cache(
                "primary cache configured but not connected".to_string(),
            )
            .into());
        }

        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(pipeline.config.update_interval_secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(
                interval_secs = pipeline.config.update_interval_secs,
                providers = pipeline.providers.len(),
                "rate pipeline started"
            );
            while pipeline.is_running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if !pipeline.is_running.load(Ordering::SeqCst) {
                    break;
                }
                pipeline.run_cycle().await;
            }
            info!("rate pipeline loop exited");
        });
        Ok(())
    }

    /// Stop the timer loop after the current cycle, if any.
    pub fn stop(&self) {
        if self.is_running.swap(false, Ordering::SeqCst) {
            info!("rate pipeline stopping");
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Execute one fetch -> validate -> consolidate -> cache cycle.
    ///
    /// Driven by `start`'s timer; public so tests and callers can step the
    /// pipeline manually. Overlapping invocations are skipped.
    pub async fn run_cycle(&self) {
        if self.cycle_in_progress.swap(true, Ordering::SeqCst) {
            warn!("previous ingestion cycle still in progress, skipping");
            return;
        }
        self.run_cycle_inner().await;
        self.cycle_in_progress.store(false, Ordering::SeqCst);
    }

    async fn run_cycle_inner(&self) {
        let quotes = self.fetch_all_providers().await;

        if quotes.is_empty() {
            let failed = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
            warn!(
                consecutive = failed,
                max = self.config.max_consecutive_failures,
                "ingestion cycle produced no rates"
            );
            if failed >= self.config.max_consecutive_failures {
                let reason = format!(
                    "all providers failed for {failed} consecutive cycles"
                );
                error!(%reason, "pipeline stopping itself");
                self.is_running.store(false, Ordering::SeqCst);
                self.events.publish(EngineEvent::PipelineStopped { reason });
            }
            return;
        }
        self.consecutive_failures.store(0, Ordering::SeqCst);

        // Validation and consolidation are synchronous; keep the lock scopes
        // free of awaits.
        let (consolidated, summary, cycle_quality) = {
            let mut validator = self.validator.write();
            let report = validator.validate_rates(&quotes);
            let accepted: Vec<RawRate> = quotes
                .iter()
                .zip(&report.validations)
                .filter(|(_, v)| v.is_valid)
                .map(|(q, _)| q.clone())
                .collect();

            let consolidated: FxHashMap<CurrencyPair, ConsolidatedRate> = {
                let mut consolidator = self.consolidator.write();
                consolidator.set_reliability(self.merged_reliability(&validator));
                consolidator.consolidate_all(&accepted)
            };

            for rate in consolidated.values() {
                validator.record_rate(&rate.pair, rate.rate);
            }

            let cycle_quality = if consolidated.is_empty() {
                0.0
            } else {
                consolidated.values().map(|r| r.quality_score).sum::<f64>()
                    / consolidated.len() as f64
            };
            (consolidated, report.summary(), cycle_quality)
        };

        let cached: Vec<CachedRate> = consolidated
            .into_values()
            .map(CachedRate::direct)
            .collect();
        if let Err(e) = self.cache.set_rates(&cached).await {
            warn!(error = %e, "failed to cache consolidated rates");
        }

        let rates: FxHashMap<String, CachedRate> = cached
            .into_iter()
            .map(|r| (r.consolidated.pair.to_string(), r))
            .collect();
        info!(
            pairs = rates.len(),
            valid = summary.valid,
            invalid = summary.invalid,
            quality = format!("{cycle_quality:.1}"),
            "ingestion cycle complete"
        );

        *self.last_update.write() = Some(Utc::now());
        self.cycles_completed.fetch_add(1, Ordering::SeqCst);
        self.events.publish(EngineEvent::RatesUpdated {
            rates,
            validation: summary,
            quality_score: cycle_quality,
        });
    }

    /// Config reliabilities overlaid with the validator's observed track
    /// record, so consolidation weights drift with provider behavior.
    fn merged_reliability(&self, validator: &RateValidator) -> FxHashMap<String, f64> {
        let mut merged = FxHashMap::default();
        for provider in &self.providers {
            let configured = self.config.provider_reliability(provider.name());
            let observed = validator.provider_reliability(provider.name());
            merged.insert(provider.name().to_string(), observed.unwrap_or(configured));
        }
        merged
    }

    async fn fetch_all_providers(&self) -> Vec<RawRate> {
        let timeout = Duration::from_secs(self.config.provider_timeout_secs);
        let base = self.config.base_currency.clone();
        let symbols = self.config.target_currencies.clone();

        let mut tasks = JoinSet::new();
        for provider in &self.providers {
            let provider = Arc::clone(provider);
            let base = base.clone();
            let symbols = symbols.clone();
            tasks.spawn(async move {
                let name = provider.name().to_string();
                let result =
                    tokio::time::timeout(timeout, provider.fetch_rates(&base, &symbols)).await;
                let flattened = match result {
                    Ok(Ok(rates)) => Ok(rates),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("timed out after {}s", timeout.as_secs())),
                };
                (name, flattened)
            });
        }

        let mut quotes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let Ok((name, result)) = joined else {
                error!("provider fetch task panicked");
                continue;
            };
            let mut stats = self.provider_stats.write();
            let entry = stats
                .entry(name.clone())
                .or_insert_with(|| ProviderStats::new(&name));
            match result {
                Ok(rates) if !rates.is_empty() => {
                    debug!(provider = %name, count = rates.len(), "provider fetch succeeded");
                    entry.record_success();
                    quotes.extend(rates);
                }
                Ok(_) => {
                    entry.record_failure("returned no rates".to_string());
                    warn!(provider = %name, "provider returned no rates");
                }
                Err(e) => {
                    entry.record_failure(e.clone());
                    warn!(provider = %name, error = %e, "provider fetch failed");
                }
            }
        }
        quotes
    }

    /// Look up a rate, deriving it when only related pairs are cached.
    ///
    /// Resolution order: identity, direct cache hit, inverse of the
    /// opposite pair, then a cross rate through the configured base
    /// currency. Derived rates carry discounted quality.
    pub async fn get_rate(&self, base: &str, quote: &str) -> Option<CachedRate> {
        let pair = CurrencyPair::new(base, quote);
        if pair.is_identity() {
            return Some(identity_rate(pair));
        }

        if let Some(direct) = self.cache.get_rate(&pair).await {
            return Some(direct);
        }

        if let Some(opposite) = self.cache.get_rate(&pair.inverse()).await {
            return Some(derive_inverse(pair, &opposite));
        }

        let pivot = self.config.base_currency.as_str();
        if base != pivot && quote != pivot {
            let to_quote = self.cache.get_rate(&CurrencyPair::new(pivot, quote)).await?;
            let to_base = self.cache.get_rate(&CurrencyPair::new(pivot, base)).await?;
            return derive_cross(pair, &to_base, &to_quote);
        }
        None
    }

    /// Pipeline and provider health snapshot.
    pub fn health_check(&self) -> PipelineHealth {
        let providers: Vec<ProviderStats> = {
            let stats = self.provider_stats.read();
            let mut list: Vec<ProviderStats> = stats.values().cloned().collect();
            list.sort_by(|a, b| a.name.cmp(&b.name));
            list
        };
        let last_update = *self.last_update.read();

        let status = if !self.is_running() {
            PipelineStatus::Stopped
        } else {
            let healthy = providers.iter().filter(|p| p.healthy).count();
            let stale = last_update.is_some_and(|t| {
                (Utc::now() - t).num_seconds() as u64 > 2 * self.config.update_interval_secs
            });
            if stale || healthy * 2 < providers.len() {
                PipelineStatus::Degraded
            } else {
                PipelineStatus::Running
            }
        };

        PipelineHealth {
            status,
            is_healthy: status == PipelineStatus::Running,
            providers,
            last_update,
            cycles_completed: self.cycles_completed.load(Ordering::SeqCst),
            consecutive_failures: self.consecutive_failures.load(Ordering::SeqCst),
        }
    }

    /// Snapshot of the validator's running totals.
    pub fn validation_stats(&self) -> rate_validator::ValidationStats {
        self.validator.read().get_validation_stats().clone()
    }

    /// Return series per tracked pair, for the risk engine. Empty when the
    /// pair has fewer than two observations.
    pub fn return_series(&self, pair: &CurrencyPair) -> Vec<f64> {
        self.validator.read().history().returns_for(pair)
    }

    pub fn cache(&self) -> &Arc<RateCache> {
        &self.cache
    }
}

fn identity_rate(pair: CurrencyPair) -> CachedRate {
    CachedRate::direct(ConsolidatedRate {
        pair,
        rate: 1.0,
        providers: Vec::new(),
        provider_count: 0,
        quality_score: 100.0,
        timestamp: Utc::now(),
    })
}

fn derive_inverse(pair: CurrencyPair, opposite: &CachedRate) -> CachedRate {
    let source = opposite.consolidated.pair.clone();
    CachedRate {
        consolidated: ConsolidatedRate {
            pair,
            rate: 1.0 / opposite.consolidated.rate,
            providers: opposite.consolidated.providers.clone(),
            provider_count: opposite.consolidated.provider_count,
            quality_score: opposite.consolidated.quality_score,
            timestamp: opposite.consolidated.timestamp,
        },
        cached_at: opposite.cached_at,
        derivation: RateDerivation::Inverse,
        source_rates: vec![source],
    }
}

fn derive_cross(
    pair: CurrencyPair,
    to_base: &CachedRate,
    to_quote: &CachedRate,
) -> Option<CachedRate> {
    if to_base.consolidated.rate <= 0.0 {
        return None;
    }
    let mut providers = to_base.consolidated.providers.clone();
    providers.extend(to_quote.consolidated.providers.iter().cloned());
    providers.sort();
    providers.dedup();
    let provider_count = providers.len();

    Some(CachedRate {
        consolidated: ConsolidatedRate {
            pair,
            rate: to_quote.consolidated.rate / to_base.consolidated.rate,
            providers,
            provider_count,
            quality_score: to_base
                .consolidated
                .quality_score
                .min(to_quote.consolidated.quality_score),
            timestamp: to_base
                .consolidated
                .timestamp
                .min(to_quote.consolidated.timestamp),
        },
        cached_at: to_base.cached_at.min(to_quote.cached_at),
        derivation: RateDerivation::Cross,
        source_rates: vec![
            to_base.consolidated.pair.clone(),
            to_quote.consolidated.pair.clone(),
        ],
    })
}
