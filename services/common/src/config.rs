//! Engine configuration surface
//!
//! One config tree for the whole engine, loadable from a file plus `FX_`
//! environment overrides. Every section has documented defaults so the engine
//! runs out of the box against the public, keyless providers.

use crate::constants::{cache, pipeline, quality, risk, validation};
use anyhow::Result;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// One external rate provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name ("exchangerate-host", "frankfurter", "open-exchange-rates")
    pub name: String,
    /// API key, for providers that require one
    pub api_key: Option<String>,
    /// Initial reliability score in [0, 1]; defaults to 0.5 when absent
    pub reliability: Option<f64>,
}

/// Cache section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Redis connection URL for the primary store
    pub redis_url: String,
    /// TTL for cached rates, seconds
    pub ttl_secs: u64,
    /// Cooldown between repeat firings of one alert watch, seconds
    pub alert_cooldown_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            ttl_secs: cache::RATE_TTL_SECS,
            alert_cooldown_secs: cache::ALERT_COOLDOWN_SECS,
        }
    }
}

/// Validation section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Rates older than this warn as stale, seconds
    pub staleness_secs: i64,
    /// |z| threshold for anomaly flagging
    pub anomaly_z_threshold: f64,
    /// Samples required before anomaly scoring
    pub min_history_samples: usize,
    /// Ring buffer capacity per pair
    pub history_capacity: usize,
    /// Direct vs derived cross-rate agreement tolerance
    pub cross_rate_tolerance: f64,
    /// Triangular cycle product deviation tolerance
    pub triangular_tolerance: f64,
    /// Exponential smoothing factor for provider reliability
    pub reliability_alpha: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            staleness_secs: validation::STALENESS_SECS,
            anomaly_z_threshold: validation::ANOMALY_Z_THRESHOLD,
            min_history_samples: validation::MIN_HISTORY_SAMPLES,
            history_capacity: validation::HISTORY_CAPACITY,
            cross_rate_tolerance: validation::CROSS_RATE_TOLERANCE,
            triangular_tolerance: validation::TRIANGULAR_TOLERANCE,
            reliability_alpha: validation::RELIABILITY_ALPHA,
        }
    }
}

/// A stress-test scenario: per-currency rate shocks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressScenario {
    /// Scenario name ("EUR crisis")
    pub name: String,
    /// Shocks by currency, as signed fractional moves (-0.15 = -15%)
    pub shocks: FxHashMap<String, f64>,
}

impl StressScenario {
    pub fn new(name: &str, shocks: &[(&str, f64)]) -> Self {
        Self {
            name: name.to_string(),
            shocks: shocks
                .iter()
                .map(|(ccy, shock)| (ccy.to_uppercase(), *shock))
                .collect(),
        }
    }
}

/// Default scenario library applied by the risk engine
pub fn default_stress_scenarios() -> Vec<StressScenario> {
    vec![
        StressScenario::new("EUR crisis", &[("EUR", -0.15)]),
        StressScenario::new("GBP flash crash", &[("GBP", -0.20), ("JPY", 0.10)]),
        StressScenario::new(
            "USD strength",
            &[("EUR", -0.10), ("GBP", -0.10), ("JPY", -0.10), ("CHF", -0.10)],
        ),
        StressScenario::new(
            "EM contagion",
            &[("BRL", -0.25), ("TRY", -0.30), ("ZAR", -0.25), ("MXN", -0.20)],
        ),
    ]
}

/// Trailing analysis windows, in daily returns.
///
/// The engine reads short for reactive per-currency volatility, medium for
/// covariance and the analytic VaR estimators, and long for the historical
/// VaR sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VolatilityWindows {
    pub short_days: usize,
    pub medium_days: usize,
    pub long_days: usize,
}

impl Default for VolatilityWindows {
    fn default() -> Self {
        Self {
            short_days: 30,
            medium_days: 90,
            long_days: 252,
        }
    }
}

/// Risk-engine section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Confidence levels for VaR/ES, e.g. [0.95, 0.99]
    pub confidence_levels: Vec<f64>,
    /// Monte Carlo simulation count
    pub monte_carlo_simulations: usize,
    /// Monte Carlo seed, for reproducible runs
    pub monte_carlo_seed: u64,
    /// Short/medium/long lookback windows for volatility and correlation
    pub volatility_windows: VolatilityWindows,
    /// Volatility assumed when a currency has insufficient history
    pub default_volatility: f64,
    /// Stress scenario library
    pub stress_scenarios: Vec<StressScenario>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            confidence_levels: vec![0.95, 0.99],
            monte_carlo_simulations: 2000,
            monte_carlo_seed: 42,
            volatility_windows: VolatilityWindows::default(),
            default_volatility: risk::DEFAULT_VOLATILITY,
            stress_scenarios: default_stress_scenarios(),
        }
    }
}

/// Hedging instrument kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    /// Outright forward contract
    Forward,
    /// FX option (protective put/call)
    Option,
    /// Cross-currency swap
    Swap,
    /// Natural hedge via offsetting cash flows
    NaturalHedge,
}

impl std::fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Forward => "forward",
            Self::Option => "option",
            Self::Swap => "swap",
            Self::NaturalHedge => "natural_hedge",
        };
        f.write_str(s)
    }
}

/// Liquidity tier of an instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityTier {
    Low,
    Medium,
    High,
}

/// One instrument in the hedging catalogue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Instrument kind
    pub kind: InstrumentKind,
    /// All-in cost in basis points of notional
    pub cost_bps: f64,
    /// Hedge effectiveness in [0, 1]
    pub effectiveness: f64,
    /// Minimum notional (base currency)
    pub min_notional: f64,
    /// Maximum tenor in days
    pub max_tenor_days: u32,
    /// Liquidity tier
    pub liquidity: LiquidityTier,
    /// Whether the instrument requires an ISDA master agreement
    pub requires_isda: bool,
}

/// Default instrument catalogue
pub fn default_instruments() -> Vec<InstrumentSpec> {
    vec![
        InstrumentSpec {
            kind: InstrumentKind::Forward,
            cost_bps: 25.0,
            effectiveness: 0.95,
            min_notional: 10_000.0,
            max_tenor_days: 365,
            liquidity: LiquidityTier::High,
            requires_isda: false,
        },
        InstrumentSpec {
            kind: InstrumentKind::Option,
            cost_bps: 150.0,
            effectiveness: 0.85,
            min_notional: 25_000.0,
            max_tenor_days: 180,
            liquidity: LiquidityTier::High,
            requires_isda: true,
        },
        InstrumentSpec {
            kind: InstrumentKind::Swap,
            cost_bps: 40.0,
            effectiveness: 0.90,
            min_notional: 100_000.0,
            max_tenor_days: 730,
            liquidity: LiquidityTier::Medium,
            requires_isda: true,
        },
        InstrumentSpec {
            kind: InstrumentKind::NaturalHedge,
            cost_bps: 5.0,
            effectiveness: 0.50,
            min_notional: 5_000.0,
            max_tenor_days: 3650,
            liquidity: LiquidityTier::Low,
            requires_isda: false,
        },
    ]
}

/// Hedging-optimizer section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgingConfig {
    /// Upper bound on optimizer iterations per call
    pub max_iterations: usize,
    /// Instrument catalogue
    pub instruments: Vec<InstrumentSpec>,
    /// Exposures below this share of the portfolio are not hedged
    pub min_exposure_share: f64,
}

impl Default for HedgingConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            instruments: default_instruments(),
            min_exposure_share: 0.05,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base currency all exposures are expressed in
    pub base_currency: String,
    /// Currencies tracked by the ingestion pipeline
    pub target_currencies: Vec<String>,
    /// Rate providers, in reliability order
    pub providers: Vec<ProviderConfig>,
    /// Seconds between ingestion cycles
    pub update_interval_secs: u64,
    /// Per-provider fetch timeout, seconds
    pub provider_timeout_secs: u64,
    /// Consecutive total-failure cycles before the pipeline stops itself
    pub max_consecutive_failures: u32,
    /// Cache section
    pub cache: CacheConfig,
    /// Validation section
    pub validation: ValidationConfig,
    /// Risk section
    pub risk: RiskConfig,
    /// Hedging section
    pub hedging: HedgingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_currency: "USD".to_string(),
            target_currencies: vec![
                "EUR".to_string(),
                "GBP".to_string(),
                "JPY".to_string(),
                "CHF".to_string(),
                "AUD".to_string(),
                "CAD".to_string(),
            ],
            providers: vec![
                ProviderConfig {
                    name: "exchangerate-host".to_string(),
                    api_key: None,
                    reliability: Some(0.9),
                },
                ProviderConfig {
                    name: "frankfurter".to_string(),
                    api_key: None,
                    reliability: Some(0.85),
                },
            ],
            update_interval_secs: pipeline::UPDATE_INTERVAL_SECS,
            provider_timeout_secs: pipeline::PROVIDER_TIMEOUT_SECS,
            max_consecutive_failures: pipeline::MAX_CONSECUTIVE_FAILURES,
            cache: CacheConfig::default(),
            validation: ValidationConfig::default(),
            risk: RiskConfig::default(),
            hedging: HedgingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a file with `FX_` environment overrides
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("FX").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Initial reliability score for a provider, defaulting when unspecified
    pub fn provider_reliability(&self, name: &str) -> f64 {
        self.providers
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.reliability)
            .unwrap_or(quality::DEFAULT_RELIABILITY)
    }
}
