//! Exposure concentration via the Herfindahl-Hirschman index.

use serde::{Deserialize, Serialize};
use services_common::constants::concentration;

use crate::exposure::CurrencyExposure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcentrationLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcentrationReport {
    /// Sum of squared exposure shares, in (0, 1]
    pub herfindahl_index: f64,
    /// Largest single-currency share
    pub max_share: f64,
    /// Currency holding the largest share
    pub dominant_currency: Option<String>,
    pub level: ConcentrationLevel,
}

/// Score how lopsided the exposure mix is.
///
/// A single-currency portfolio scores HHI 1.0 and comes out critical;
/// an even n-way split scores 1/n.
pub fn assess(exposures: &[CurrencyExposure]) -> ConcentrationReport {
    let herfindahl_index: f64 = exposures.iter().map(|e| e.share * e.share).sum();
    let dominant = exposures
        .iter()
        .max_by(|a, b| a.share.total_cmp(&b.share));
    let max_share = dominant.map_or(0.0, |e| e.share);

    let level = if max_share >= concentration::CRITICAL_MAX
        || herfindahl_index >= concentration::CRITICAL_HHI
    {
        ConcentrationLevel::Critical
    } else if max_share >= concentration::HIGH_MAX || herfindahl_index >= concentration::HIGH_HHI {
        ConcentrationLevel::High
    } else if max_share >= concentration::MEDIUM_MAX
        || herfindahl_index >= concentration::MEDIUM_HHI
    {
        ConcentrationLevel::Medium
    } else {
        ConcentrationLevel::Low
    };

    ConcentrationReport {
        herfindahl_index,
        max_share,
        dominant_currency: dominant.map(|e| e.currency.clone()),
        level,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn exposure(currency: &str, share: f64) -> CurrencyExposure {
        CurrencyExposure {
            currency: currency.to_string(),
            amount: 0.0,
            base_amount: 0.0,
            share,
            volatility: 0.10,
        }
    }

    #[test]
    fn single_currency_is_critical() {
        let report = assess(&[exposure("EUR", 1.0)]);
        assert_relative_eq!(report.herfindahl_index, 1.0);
        assert_eq!(report.level, ConcentrationLevel::Critical);
        assert_eq!(report.dominant_currency.as_deref(), Some("EUR"));
    }

    #[test]
    fn even_split_is_low() {
        let exposures: Vec<_> = ["EUR", "GBP", "JPY", "CHF", "AUD"]
            .iter()
            .map(|c| exposure(c, 0.2))
            .collect();
        let report = assess(&exposures);
        assert_relative_eq!(report.herfindahl_index, 0.2, epsilon = 1e-12);
        assert_eq!(report.level, ConcentrationLevel::Low);
    }

    #[test]
    fn half_in_one_currency_is_at_least_high() {
        let report = assess(&[
            exposure("EUR", 0.5),
            exposure("GBP", 0.25),
            exposure("JPY", 0.25),
        ]);
        assert!(report.level >= ConcentrationLevel::High);
        assert_eq!(report.dominant_currency.as_deref(), Some("EUR"));
    }

    #[test]
    fn empty_exposures_are_low() {
        let report = assess(&[]);
        assert_eq!(report.level, ConcentrationLevel::Low);
        assert!(report.dominant_currency.is_none());
    }
}
