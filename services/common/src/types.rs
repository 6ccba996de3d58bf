//! Core currency and rate types shared across services

use crate::constants::quality;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A directed currency pair, e.g. EUR/USD quotes USD per EUR
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Base currency (ISO 4217 code)
    pub base: String,
    /// Quote currency (ISO 4217 code)
    pub quote: String,
}

impl CurrencyPair {
    /// Create a pair from currency codes, normalized to uppercase
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
        }
    }

    /// Parse a "EUR/USD" style pair string
    pub fn parse(s: &str) -> Option<Self> {
        let (base, quote) = s.split_once('/')?;
        if base.len() != 3 || quote.len() != 3 {
            return None;
        }
        Some(Self::new(base, quote))
    }

    /// The reversed pair (quote/base)
    pub fn inverse(&self) -> Self {
        Self {
            base: self.quote.clone(),
            quote: self.base.clone(),
        }
    }

    /// True for degenerate pairs like USD/USD
    pub fn is_identity(&self) -> bool {
        self.base == self.quote
    }
}

impl std::fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// One provider's quote for a currency pair, normalized at the adapter boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRate {
    /// Currency pair
    pub pair: CurrencyPair,
    /// Mid rate (quote units per base unit)
    pub rate: f64,
    /// Bid price, when the provider publishes one
    pub bid: Option<f64>,
    /// Ask price, when the provider publishes one
    pub ask: Option<f64>,
    /// Provider identifier
    pub provider: String,
    /// When the rate was fetched
    pub fetched_at: DateTime<Utc>,
}

impl RawRate {
    /// Structural sanity: finite positive rate, ask >= bid when both present
    pub fn is_sane(&self) -> bool {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return false;
        }
        if let (Some(bid), Some(ask)) = (self.bid, self.ask) {
            if ask < bid {
                return false;
            }
        }
        true
    }

    /// Relative bid/ask spread, when both sides are quoted
    pub fn spread(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) if bid > 0.0 => Some((ask - bid) / bid),
            _ => None,
        }
    }
}

/// Cross-provider merged rate for one pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedRate {
    /// Currency pair
    pub pair: CurrencyPair,
    /// Reliability-weighted rate
    pub rate: f64,
    /// Contributing providers (at least one)
    pub providers: Vec<String>,
    /// Number of contributing providers
    pub provider_count: usize,
    /// Quality score in [0, 100], higher with more agreeing providers
    pub quality_score: f64,
    /// Consolidation timestamp
    pub timestamp: DateTime<Utc>,
}

/// How a served rate was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateDerivation {
    /// Straight from the consolidated feed
    Direct,
    /// Computed as 1/rate of the opposite pair
    Inverse,
    /// Computed via a third common currency
    Cross,
}

/// A rate as persisted in and served from the cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRate {
    /// Underlying consolidated rate
    pub consolidated: ConsolidatedRate,
    /// When the cache entry was written
    pub cached_at: DateTime<Utc>,
    /// How this rate was derived for the caller
    pub derivation: RateDerivation,
    /// Pairs used to derive an inverse or cross rate
    pub source_rates: Vec<CurrencyPair>,
}

impl CachedRate {
    /// Wrap a consolidated rate as a direct cache entry
    pub fn direct(consolidated: ConsolidatedRate) -> Self {
        Self {
            consolidated,
            cached_at: Utc::now(),
            derivation: RateDerivation::Direct,
            source_rates: Vec::new(),
        }
    }

    /// The served rate value
    pub fn rate(&self) -> f64 {
        self.consolidated.rate
    }

    pub fn is_inverse(&self) -> bool {
        self.derivation == RateDerivation::Inverse
    }

    pub fn is_cross_rate(&self) -> bool {
        self.derivation == RateDerivation::Cross
    }

    /// Derived rates carry a discounted quality score
    pub fn derived_quality(&self) -> f64 {
        match self.derivation {
            RateDerivation::Direct => self.consolidated.quality_score,
            RateDerivation::Inverse | RateDerivation::Cross => {
                self.consolidated.quality_score * quality::DERIVED_RATE_DISCOUNT
            }
        }
    }
}

/// Direction of a rate alert threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertDirection {
    /// Fire when the rate rises above the threshold
    Above,
    /// Fire when the rate falls below the threshold
    Below,
}

/// A user-defined threshold watch on a pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateAlert {
    /// Watch identifier
    pub id: uuid::Uuid,
    /// Watched pair
    pub pair: CurrencyPair,
    /// Threshold rate
    pub threshold: f64,
    /// Crossing direction
    pub direction: AlertDirection,
    /// Last time this watch fired, for cooldown suppression
    pub last_fired: Option<DateTime<Utc>>,
}

impl RateAlert {
    pub fn new(pair: CurrencyPair, threshold: f64, direction: AlertDirection) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            pair,
            threshold,
            direction,
            last_fired: None,
        }
    }

    /// Whether the given rate crosses this watch's threshold
    pub fn is_triggered(&self, rate: f64) -> bool {
        match self.direction {
            AlertDirection::Above => rate > self.threshold,
            AlertDirection::Below => rate < self.threshold,
        }
    }
}

/// Account type of a portfolio row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Checking,
    Savings,
    Investment,
    Credit,
}

/// One portfolio account as supplied by the surrounding application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Account currency (ISO 4217 code)
    pub currency: String,
    /// Balance in the account currency
    pub balance: f64,
    /// Account type
    pub account_type: AccountType,
}
