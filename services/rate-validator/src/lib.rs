//! Rate Validation Engine
//!
//! Validates incoming FX rates before they reach the cache:
//! - Structural checks (finite positive rate, ask >= bid, staleness)
//! - Statistical anomaly detection against a bounded rolling history
//! - Cross-rate consistency and triangular-arbitrage detection
//! - Incremental provider reliability scoring

pub mod history;

use chrono::Utc;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use services_common::{CurrencyPair, RawRate, ValidationConfig, ValidationSummary};
use tracing::{debug, warn};

pub use history::{HistoryStore, RateHistory};

/// Result of validating one rate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateValidation {
    /// Validated pair
    pub pair: CurrencyPair,
    /// Whether the rate may enter the cache
    pub is_valid: bool,
    /// Quality score in [0, 100]
    pub quality_score: f64,
    /// Rejection reasons (non-empty iff invalid)
    pub errors: Vec<String>,
    /// Non-fatal findings (staleness, spread, anomaly)
    pub warnings: Vec<String>,
    /// |z| of the rate against the rolling window; 0 with thin history
    pub anomaly_score: f64,
}

/// A direct rate disagreeing with its derivation via a third currency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossRateInconsistency {
    pub pair: CurrencyPair,
    /// Intermediate currency used for the derived rate
    pub via: String,
    pub direct: f64,
    pub derived: f64,
    /// Relative deviation |direct - derived| / direct
    pub deviation: f64,
}

/// A rate cycle whose product deviates from 1 (informational)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangularArbitrage {
    /// Currency cycle A -> B -> C -> A
    pub cycle: [String; 3],
    /// Product of the three rates
    pub product: f64,
    /// |product - 1|
    pub deviation: f64,
}

/// Result of validating a full rate map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchValidationReport {
    pub validations: Vec<RateValidation>,
    pub inconsistencies: Vec<CrossRateInconsistency>,
    pub arbitrage_opportunities: Vec<TriangularArbitrage>,
}

impl BatchValidationReport {
    /// Condense into the event-facing summary
    pub fn summary(&self) -> ValidationSummary {
        let total = self.validations.len();
        let valid = self.validations.iter().filter(|v| v.is_valid).count();
        let warnings = self
            .validations
            .iter()
            .filter(|v| !v.warnings.is_empty())
            .count();
        let average_quality = if total > 0 {
            self.validations.iter().map(|v| v.quality_score).sum::<f64>() / total as f64
        } else {
            0.0
        };
        ValidationSummary {
            total,
            valid,
            invalid: total - valid,
            warnings,
            average_quality,
            inconsistencies: self.inconsistencies.len(),
            arbitrage_opportunities: self.arbitrage_opportunities.len(),
        }
    }

    /// Pairs that passed validation
    pub fn valid_pairs(&self) -> Vec<CurrencyPair> {
        self.validations
            .iter()
            .filter(|v| v.is_valid)
            .map(|v| v.pair.clone())
            .collect()
    }
}

/// Running totals across all validations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationStats {
    pub total_validated: u64,
    pub passed: u64,
    pub failed: u64,
    pub inconsistencies_found: u64,
    pub arbitrage_found: u64,
    quality_sum: f64,
}

impl ValidationStats {
    /// Mean quality over everything validated so far
    pub fn average_quality(&self) -> f64 {
        if self.total_validated == 0 {
            0.0
        } else {
            self.quality_sum / self.total_validated as f64
        }
    }
}

// Quality penalties applied on top of a perfect score
const PENALTY_STALE: f64 = 15.0;
const PENALTY_WIDE_SPREAD: f64 = 10.0;
const PENALTY_ANOMALY_PER_Z: f64 = 10.0;
const PENALTY_ANOMALY_CAP: f64 = 30.0;

/// Rate validation engine
pub struct RateValidator {
    config: ValidationConfig,
    history: HistoryStore,
    /// Smoothed reliability per provider, in [0, 1]
    provider_reliability: FxHashMap<String, f64>,
    stats: ValidationStats,
}

impl RateValidator {
    pub fn new(config: ValidationConfig) -> Self {
        let history = HistoryStore::new(config.history_capacity);
        Self {
            config,
            history,
            provider_reliability: FxHashMap::default(),
            stats: ValidationStats::default(),
        }
    }

    /// Validate one rate against structure, staleness and the rolling history
    ///
    /// Does not mutate the history: identical input against unchanged history
    /// yields an identical result. Accepted rates are fed back via
    /// [`record_rate`](Self::record_rate).
    pub fn validate_single_rate(&mut self, raw: &RawRate) -> RateValidation {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut quality: f64 = 100.0;
        let mut anomaly_score = 0.0;

        // Structural checks reject outright
        if !raw.rate.is_finite() || raw.rate <= 0.0 {
            errors.push(format!("rate must be a positive finite number, got {}", raw.rate));
        }
        if let (Some(bid), Some(ask)) = (raw.bid, raw.ask) {
            if ask < bid {
                errors.push(format!("ask {ask} below bid {bid}"));
            }
        }

        if errors.is_empty() {
            // Staleness warns, never rejects
            let age_secs = (Utc::now() - raw.fetched_at).num_seconds();
            if age_secs > self.config.staleness_secs {
                warnings.push(format!("rate is stale ({age_secs}s old)"));
                quality -= PENALTY_STALE;
            }

            if let Some(spread) = raw.spread() {
                if spread > services_common::constants::validation::MAX_SPREAD {
                    warnings.push(format!("unusually wide spread {:.4}", spread));
                    quality -= PENALTY_WIDE_SPREAD;
                }
            }

            // Anomaly detection once enough history exists
            if let Some(history) = self.history.get(&raw.pair) {
                if history.len() >= self.config.min_history_samples {
                    if let Some(z) = history.z_score(raw.rate) {
                        anomaly_score = z.abs();
                        if anomaly_score > self.config.anomaly_z_threshold {
                            warnings.push(format!(
                                "rate deviates {:.2} sigma from rolling mean",
                                anomaly_score
                            ));
                            quality -=
                                (anomaly_score * PENALTY_ANOMALY_PER_Z).min(PENALTY_ANOMALY_CAP);
                        }
                    }
                }
            }
        }

        let is_valid = errors.is_empty();
        let quality_score = if is_valid { quality.clamp(0.0, 100.0) } else { 0.0 };

        self.stats.total_validated += 1;
        self.stats.quality_sum += quality_score;
        if is_valid {
            self.stats.passed += 1;
        } else {
            self.stats.failed += 1;
            warn!(pair = %raw.pair, provider = %raw.provider, ?errors, "rate rejected");
        }

        self.update_provider_reliability(&raw.provider, quality_score / 100.0);

        RateValidation {
            pair: raw.pair.clone(),
            is_valid,
            quality_score,
            errors,
            warnings,
            anomaly_score,
        }
    }

    /// Validate a rate map, including cross-rate and triangular checks
    pub fn validate_rates(&mut self, rates: &[RawRate]) -> BatchValidationReport {
        let validations: Vec<RateValidation> =
            rates.iter().map(|r| self.validate_single_rate(r)).collect();

        // Only structurally valid rates participate in consistency checks
        let rate_map: FxHashMap<CurrencyPair, f64> = rates
            .iter()
            .zip(&validations)
            .filter(|(_, v)| v.is_valid)
            .map(|(r, _)| (r.pair.clone(), r.rate))
            .collect();

        let inconsistencies = self.check_cross_rates(&rate_map);
        let arbitrage_opportunities = self.check_triangular(&rate_map);

        self.stats.inconsistencies_found += inconsistencies.len() as u64;
        self.stats.arbitrage_found += arbitrage_opportunities.len() as u64;

        BatchValidationReport {
            validations,
            inconsistencies,
            arbitrage_opportunities,
        }
    }

    /// Feed an accepted rate into the rolling history
    pub fn record_rate(&mut self, pair: &CurrencyPair, rate: f64) {
        self.history.record(pair, rate);
    }

    /// Direct vs derived-via-third-currency agreement
    fn check_cross_rates(
        &self,
        rates: &FxHashMap<CurrencyPair, f64>,
    ) -> Vec<CrossRateInconsistency> {
        let mut findings = Vec::new();
        for (pair, &direct) in rates {
            for (leg_a, &rate_a) in rates {
                if leg_a.base != pair.base || leg_a.quote == pair.quote {
                    continue;
                }
                let leg_b = CurrencyPair::new(&leg_a.quote, &pair.quote);
                let Some(&rate_b) = rates.get(&leg_b) else {
                    continue;
                };
                let derived = rate_a * rate_b;
                let deviation = ((direct - derived) / direct).abs();
                if deviation > self.config.cross_rate_tolerance {
                    debug!(
                        %pair, via = %leg_a.quote, direct, derived,
                        "cross-rate inconsistency"
                    );
                    findings.push(CrossRateInconsistency {
                        pair: pair.clone(),
                        via: leg_a.quote.clone(),
                        direct,
                        derived,
                        deviation,
                    });
                }
            }
        }
        findings
    }

    /// Cycle products A -> B -> C -> A deviating from 1
    fn check_triangular(&self, rates: &FxHashMap<CurrencyPair, f64>) -> Vec<TriangularArbitrage> {
        let mut findings = Vec::new();
        for (ab, &rate_ab) in rates {
            for (bc, &rate_bc) in rates {
                if bc.base != ab.quote || bc.quote == ab.base {
                    continue;
                }
                let ca = CurrencyPair::new(&bc.quote, &ab.base);
                let Some(&rate_ca) = rates.get(&ca) else {
                    continue;
                };
                let product = rate_ab * rate_bc * rate_ca;
                let deviation = (product - 1.0).abs();
                if deviation > self.config.triangular_tolerance {
                    // Informational only; each cycle is reported once per
                    // starting currency, deduplicated by the caller if needed
                    findings.push(TriangularArbitrage {
                        cycle: [ab.base.clone(), ab.quote.clone(), bc.quote.clone()],
                        product,
                        deviation,
                    });
                }
            }
        }
        findings
    }

    /// Exponentially smooth a provider's reliability toward an observation
    fn update_provider_reliability(&mut self, provider: &str, observation: f64) {
        let alpha = self.config.reliability_alpha;
        let entry = self
            .provider_reliability
            .entry(provider.to_string())
            .or_insert(observation);
        *entry = *entry * (1.0 - alpha) + observation * alpha;
    }

    /// Smoothed reliability for a provider, if it has been observed
    pub fn provider_reliability(&self, provider: &str) -> Option<f64> {
        self.provider_reliability.get(provider).copied()
    }

    /// Snapshot of every observed provider's smoothed reliability
    pub fn reliability_snapshot(&self) -> FxHashMap<String, f64> {
        self.provider_reliability.clone()
    }

    /// Running validation totals
    pub fn get_validation_stats(&self) -> &ValidationStats {
        &self.stats
    }

    /// Rolling history store (read access for the risk engine's return series)
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }
}
