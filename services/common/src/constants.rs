//! Engine-wide constants
//!
//! Thresholds here are implementation policy: chosen to be monotonic and kept
//! in one place so the property tests can pin them down.

/// Consolidation quality scoring
pub mod quality {
    /// Fixed score for a rate backed by a single provider
    pub const SINGLE_PROVIDER_SCORE: f64 = 60.0;

    /// Base score floor for multi-provider rates: 50 + 5 * min(n, 6)
    pub const MULTI_PROVIDER_FLOOR: f64 = 50.0;

    /// Per-provider increment applied to the base score
    pub const PER_PROVIDER_BONUS: f64 = 5.0;

    /// Provider count beyond which the count bonus saturates
    pub const PROVIDER_BONUS_CAP: usize = 6;

    /// Coefficient of variation at which provider agreement counts for nothing
    pub const CV_TOLERANCE: f64 = 0.02;

    /// Quality multiplier applied to inverse/cross derived rates
    pub const DERIVED_RATE_DISCOUNT: f64 = 0.9;

    /// Default reliability assumed for providers with no track record
    pub const DEFAULT_RELIABILITY: f64 = 0.5;
}

/// Rate validation thresholds
pub mod validation {
    /// Rates older than this get a staleness warning
    pub const STALENESS_SECS: i64 = 300;

    /// |z| above this flags an anomaly warning
    pub const ANOMALY_Z_THRESHOLD: f64 = 3.0;

    /// Samples required before anomaly scoring kicks in
    pub const MIN_HISTORY_SAMPLES: usize = 10;

    /// Ring buffer capacity per currency pair
    pub const HISTORY_CAPACITY: usize = 256;

    /// Relative spread above this is suspicious for a liquid FX pair
    pub const MAX_SPREAD: f64 = 0.05;

    /// Direct vs derived cross rate must agree within this tolerance
    pub const CROSS_RATE_TOLERANCE: f64 = 0.01;

    /// Triangular cycle product deviation reported above this
    pub const TRIANGULAR_TOLERANCE: f64 = 0.005;

    /// Exponential smoothing factor for provider reliability updates
    pub const RELIABILITY_ALPHA: f64 = 0.1;
}

/// Risk computation parameters
pub mod risk {
    /// Trading days per year, for volatility annualization
    pub const TRADING_DAYS: f64 = 252.0;

    /// Volatility assumed for currencies with insufficient history
    pub const DEFAULT_VOLATILITY: f64 = 0.10;

    /// VaR (95%) as a share of exposure that normalizes to a full risk-score bar
    pub const VAR_SCORE_SCALE: f64 = 0.10;

    /// Portfolio volatility that normalizes to a full risk-score bar
    pub const VOL_SCORE_SCALE: f64 = 0.20;

    /// Risk score component weights: VaR / concentration / volatility
    pub const SCORE_WEIGHTS: (f64, f64, f64) = (0.4, 0.3, 0.3);
}

/// Concentration level thresholds (max single share, Herfindahl index)
pub mod concentration {
    pub const CRITICAL_MAX: f64 = 0.65;
    pub const CRITICAL_HHI: f64 = 0.50;
    pub const HIGH_MAX: f64 = 0.45;
    pub const HIGH_HHI: f64 = 0.35;
    pub const MEDIUM_MAX: f64 = 0.30;
    pub const MEDIUM_HHI: f64 = 0.22;
}

/// Ingestion pipeline defaults
pub mod pipeline {
    /// Seconds between ingestion cycles
    pub const UPDATE_INTERVAL_SECS: u64 = 60;

    /// Per-provider fetch timeout
    pub const PROVIDER_TIMEOUT_SECS: u64 = 10;

    /// Consecutive total-failure cycles before the pipeline stops itself
    pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;

    /// Provider failures before that provider is marked unhealthy
    pub const PROVIDER_FAILURE_THRESHOLD: u32 = 3;

    /// Event channel capacity
    pub const EVENT_CHANNEL_CAPACITY: usize = 1024;
}

/// Cache defaults
pub mod cache {
    /// Rate entry TTL in the primary store
    pub const RATE_TTL_SECS: u64 = 3600;

    /// Minimum interval between repeated firings of the same alert watch
    pub const ALERT_COOLDOWN_SECS: i64 = 900;

    /// Key prefix for rate entries
    pub const RATE_KEY_PREFIX: &str = "fx:rate";
}
