//! Scenario stress testing.
//!
//! Applies configured rate shocks to the current exposures and reports the
//! immediate revaluation P&L. The base currency is the numeraire and never
//! shocks against itself.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use services_common::StressScenario;

use crate::exposure::{CurrencyExposure, gross_exposure};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressResult {
    pub scenario: String,
    /// Revaluation P&L in base currency (negative = loss)
    pub pnl: f64,
    /// P&L as a fraction of gross exposure
    pub pnl_pct: f64,
    /// Per-currency revaluation legs summing to `pnl`
    pub contributions: FxHashMap<String, f64>,
    /// Currencies the scenario actually touched
    pub affected_currencies: Vec<String>,
}

/// Apply one scenario to the exposures.
pub fn apply(
    scenario: &StressScenario,
    exposures: &[CurrencyExposure],
    base_currency: &str,
) -> StressResult {
    let mut pnl = 0.0;
    let mut contributions = FxHashMap::default();
    for exposure in exposures {
        if exposure.currency == base_currency {
            continue;
        }
        if let Some(&shock) = scenario.shocks.get(&exposure.currency) {
            let leg = exposure.base_amount * shock;
            pnl += leg;
            contributions.insert(exposure.currency.clone(), leg);
        }
    }
    let mut affected: Vec<String> = contributions.keys().cloned().collect();
    affected.sort();

    let gross = gross_exposure(exposures);
    StressResult {
        scenario: scenario.name.clone(),
        pnl,
        pnl_pct: if gross > 0.0 { pnl / gross } else { 0.0 },
        contributions,
        affected_currencies: affected,
    }
}

/// Run the whole scenario library, worst loss first.
pub fn run_all(
    scenarios: &[StressScenario],
    exposures: &[CurrencyExposure],
    base_currency: &str,
) -> Vec<StressResult> {
    let mut results: Vec<StressResult> = scenarios
        .iter()
        .map(|s| apply(s, exposures, base_currency))
        .collect();
    results.sort_by(|a, b| a.pnl.total_cmp(&b.pnl));
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn exposure(currency: &str, base_amount: f64) -> CurrencyExposure {
        CurrencyExposure {
            currency: currency.to_string(),
            amount: base_amount,
            base_amount,
            share: 0.0,
            volatility: 0.10,
        }
    }

    #[test]
    fn shock_scales_with_exposure() {
        let scenario = StressScenario::new("EUR crisis", &[("EUR", -0.15)]);
        let exposures = vec![exposure("EUR", 100_000.0), exposure("GBP", 50_000.0)];

        let result = apply(&scenario, &exposures, "USD");
        assert_relative_eq!(result.pnl, -15_000.0, epsilon = 1e-9);
        assert_relative_eq!(result.pnl_pct, -0.1, epsilon = 1e-9);
        assert_eq!(result.affected_currencies, vec!["EUR".to_string()]);
    }

    #[test]
    fn base_currency_is_never_shocked() {
        let scenario = StressScenario::new("USD strength", &[("USD", 0.08), ("EUR", -0.05)]);
        let exposures = vec![exposure("USD", 200_000.0), exposure("EUR", 100_000.0)];

        let result = apply(&scenario, &exposures, "USD");
        assert_relative_eq!(result.pnl, -5_000.0, epsilon = 1e-9);
        assert_eq!(result.affected_currencies, vec!["EUR".to_string()]);
    }

    #[test]
    fn contributions_break_pnl_down_per_currency() {
        let scenario =
            StressScenario::new("GBP flash crash", &[("GBP", -0.20), ("JPY", 0.10)]);
        let exposures = vec![exposure("GBP", 100_000.0), exposure("JPY", 68_000.0)];

        let result = apply(&scenario, &exposures, "USD");
        assert_relative_eq!(result.contributions["GBP"], -20_000.0, epsilon = 1e-9);
        assert_relative_eq!(result.contributions["JPY"], 6_800.0, epsilon = 1e-9);
        assert_relative_eq!(
            result.pnl,
            result.contributions.values().sum::<f64>(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn short_exposure_profits_from_a_downward_shock() {
        let scenario = StressScenario::new("EUR crisis", &[("EUR", -0.15)]);
        let exposures = vec![exposure("EUR", -40_000.0)];
        let result = apply(&scenario, &exposures, "USD");
        assert_relative_eq!(result.pnl, 6_000.0, epsilon = 1e-9);
    }

    #[test]
    fn run_all_sorts_worst_first() {
        let scenarios = vec![
            StressScenario::new("mild", &[("EUR", -0.01)]),
            StressScenario::new("severe", &[("EUR", -0.20)]),
        ];
        let exposures = vec![exposure("EUR", 100_000.0)];
        let results = run_all(&scenarios, &exposures, "USD");
        assert_eq!(results[0].scenario, "severe");
        assert!(results[0].pnl < results[1].pnl);
    }
}
