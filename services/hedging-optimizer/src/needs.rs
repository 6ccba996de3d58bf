//! Per-currency hedging need derivation.
//!
//! Priority and urgency both come from the same blended score of relative
//! exposure and volatility; neither is set independently. The recommended
//! hedge ratio rises with that score and is capped at full coverage.

use risk_engine::{CurrencyRiskReport, RiskLevel};
use serde::{Deserialize, Serialize};

/// Volatility at which the blended score saturates.
const VOL_SATURATION: f64 = 0.15;
/// Blend weights: relative exposure vs volatility.
const EXPOSURE_WEIGHT: f64 = 0.6;
const VOLATILITY_WEIGHT: f64 = 0.4;
/// Hedge ratio = BASE + exposure and volatility uplifts, capped at 1.
const RATIO_BASE: f64 = 0.4;
const RATIO_EXPOSURE_UPLIFT: f64 = 0.4;
const RATIO_VOLATILITY_UPLIFT: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Routine,
    Soon,
    Immediate,
}

/// One currency's derived hedge requirement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgingNeed {
    pub currency: String,
    /// Absolute exposure in base currency
    pub exposure: f64,
    /// Share of gross exposure, in [0, 1]
    pub relative_exposure: f64,
    /// Annualized volatility against the base
    pub volatility: f64,
    pub priority: RiskLevel,
    /// Fraction of the exposure worth covering, in [0, 1]
    pub recommended_hedge_ratio: f64,
    pub time_horizon_days: u32,
    pub urgency: Urgency,
}

/// Derive hedging needs from a risk report.
///
/// Base-currency holdings and exposures below `min_share` are skipped.
/// The result keeps the report's ranking, largest exposure first.
pub fn derive_needs(report: &CurrencyRiskReport, min_share: f64) -> Vec<HedgingNeed> {
    report
        .exposures
        .iter()
        .filter(|e| e.currency != report.base_currency && e.share >= min_share)
        .filter(|e| e.base_amount.abs() > 0.0)
        .map(|e| {
            let vol_norm = (e.volatility / VOL_SATURATION).min(1.0);
            let score = EXPOSURE_WEIGHT * e.share + VOLATILITY_WEIGHT * vol_norm;
            let (priority, urgency, time_horizon_days) = classify(score);
            HedgingNeed {
                currency: e.currency.clone(),
                exposure: e.base_amount.abs(),
                relative_exposure: e.share,
                volatility: e.volatility,
                priority,
                recommended_hedge_ratio: (RATIO_BASE
                    + RATIO_EXPOSURE_UPLIFT * e.share
                    + RATIO_VOLATILITY_UPLIFT * vol_norm)
                    .clamp(0.0, 1.0),
                time_horizon_days,
                urgency,
            }
        })
        .collect()
}

/// Priority, urgency and horizon from the blended score. Urgent needs get
/// short horizons so the hedge can be revisited quickly.
fn classify(score: f64) -> (RiskLevel, Urgency, u32) {
    if score >= 0.75 {
        (RiskLevel::Critical, Urgency::Immediate, 90)
    } else if score >= 0.5 {
        (RiskLevel::High, Urgency::Soon, 180)
    } else if score >= 0.3 {
        (RiskLevel::Medium, Urgency::Routine, 365)
    } else {
        (RiskLevel::Low, Urgency::Routine, 365)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use risk_engine::{MarketView, RiskEngine};
    use services_common::{AccountSnapshot, AccountType, RiskConfig};

    fn report_for(accounts: &[(&str, f64)]) -> CurrencyRiskReport {
        let snapshots: Vec<AccountSnapshot> = accounts
            .iter()
            .map(|(c, b)| AccountSnapshot {
                currency: c.to_string(),
                balance: *b,
                account_type: AccountType::Checking,
            })
            .collect();
        let mut market = MarketView::new("USD");
        market.set_rate("EUR", 1.09);
        market.set_rate("GBP", 1.27);
        market.set_rate("JPY", 0.0068);
        RiskEngine::new(RiskConfig::default())
            .calculate_currency_risk("user-1", &snapshots, &market)
            .unwrap()
    }

    #[test]
    fn base_currency_is_never_a_need() {
        let report = report_for(&[("USD", 50_000.0), ("EUR", 50_000.0)]);
        let needs = derive_needs(&report, 0.05);
        assert_eq!(needs.len(), 1);
        assert_eq!(needs[0].currency, "EUR");
    }

    #[test]
    fn small_exposures_are_skipped() {
        let report = report_for(&[("EUR", 98_000.0), ("GBP", 1_000.0)]);
        let needs = derive_needs(&report, 0.05);
        assert_eq!(needs.len(), 1);
        assert_eq!(needs[0].currency, "EUR");
    }

    #[test]
    fn dominant_exposure_is_high_priority_with_high_ratio() {
        let report = report_for(&[("EUR", 90_000.0), ("GBP", 10_000.0)]);
        let needs = derive_needs(&report, 0.05);

        let eur = &needs[0];
        assert_eq!(eur.currency, "EUR");
        assert!(eur.priority >= RiskLevel::High);
        assert!(eur.recommended_hedge_ratio > needs[1].recommended_hedge_ratio);
        assert!(eur.recommended_hedge_ratio <= 1.0);
        assert!(eur.urgency >= needs[1].urgency);
    }

    #[test]
    fn hedge_ratio_stays_in_unit_interval() {
        let report = report_for(&[("EUR", 1_000_000.0)]);
        let needs = derive_needs(&report, 0.05);
        assert!(needs[0].recommended_hedge_ratio <= 1.0);
        assert!(needs[0].recommended_hedge_ratio >= RATIO_BASE);
    }
}
