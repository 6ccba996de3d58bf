//! Cross-provider rate consolidation.
//!
//! Merges the quotes each provider returned for one pair into a single
//! reliability-weighted rate, and scores how much we trust it. Quality
//! rises with provider count and falls with cross-provider disagreement.

use chrono::Utc;
use rustc_hash::FxHashMap;
use services_common::constants::quality;
use services_common::{ConsolidatedRate, CurrencyPair, RawRate};

/// Merges per-provider quotes into consolidated rates.
pub struct RateConsolidator {
    /// Provider name -> reliability weight in (0, 1].
    reliability: FxHashMap<String, f64>,
}

impl RateConsolidator {
    pub fn new(reliability: FxHashMap<String, f64>) -> Self {
        Self { reliability }
    }

    /// Replace the reliability weights, typically with the validator's
    /// smoothed per-provider track record.
    pub fn set_reliability(&mut self, reliability: FxHashMap<String, f64>) {
        self.reliability = reliability;
    }

    fn weight_for(&self, provider: &str) -> f64 {
        self.reliability
            .get(provider)
            .copied()
            .unwrap_or(quality::DEFAULT_RELIABILITY)
            .max(f64::EPSILON)
    }

    /// Consolidate the quotes for a single pair. Returns `None` when no
    /// quote is structurally usable.
    pub fn consolidate(&self, pair: &CurrencyPair, quotes: &[RawRate]) -> Option<ConsolidatedRate> {
        let usable: Vec<&RawRate> = quotes
            .iter()
            .filter(|q| &q.pair == pair && q.is_sane())
            .collect();
        if usable.is_empty() {
            return None;
        }

        let mut weight_sum = 0.0;
        let mut weighted_rate = 0.0;
        for quote in &usable {
            let w = self.weight_for(&quote.provider);
            weight_sum += w;
            weighted_rate += w * quote.rate;
        }
        let rate = weighted_rate / weight_sum;

        let mut providers: Vec<String> = usable.iter().map(|q| q.provider.clone()).collect();
        providers.sort();
        providers.dedup();
        let provider_count = providers.len();

        Some(ConsolidatedRate {
            pair: pair.clone(),
            rate,
            quality_score: quality_score(provider_count, dispersion(&usable)),
            providers,
            provider_count,
            timestamp: Utc::now(),
        })
    }

    /// Group a mixed batch of quotes by pair and consolidate each group.
    pub fn consolidate_all(&self, quotes: &[RawRate]) -> FxHashMap<CurrencyPair, ConsolidatedRate> {
        let mut by_pair: FxHashMap<CurrencyPair, Vec<RawRate>> = FxHashMap::default();
        for quote in quotes {
            by_pair
                .entry(quote.pair.clone())
                .or_default()
                .push(quote.clone());
        }

        by_pair
            .into_iter()
            .filter_map(|(pair, group)| {
                self.consolidate(&pair, &group).map(|rate| (pair, rate))
            })
            .collect()
    }
}

/// Coefficient of variation of the raw (unweighted) quotes.
fn dispersion(quotes: &[&RawRate]) -> f64 {
    if quotes.len() < 2 {
        return 0.0;
    }
    let n = quotes.len() as f64;
    let mean = quotes.iter().map(|q| q.rate).sum::<f64>() / n;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance = quotes
        .iter()
        .map(|q| (q.rate - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    variance.sqrt() / mean
}

/// Quality score in [0, 100].
///
/// One provider earns a fixed middling score. With more sources the floor
/// rises per provider (capped), and tight cross-provider agreement lifts
/// the score toward 100.
fn quality_score(provider_count: usize, cv: f64) -> f64 {
    if provider_count <= 1 {
        return quality::SINGLE_PROVIDER_SCORE;
    }
    let capped = provider_count.min(quality::PROVIDER_BONUS_CAP) as f64;
    let base = quality::MULTI_PROVIDER_FLOOR + quality::PER_PROVIDER_BONUS * capped;
    let agreement = 1.0 - (cv / quality::CV_TOLERANCE).min(1.0);
    base + agreement * (100.0 - base)
}
