//! Multi-currency risk engine.
//!
//! Turns a set of accounts plus current market data into a risk report:
//! ranked exposures, VaR and expected shortfall under three estimators,
//! concentration, factor decomposition, stress losses and a composite
//! 0-100 risk score with recommendations.

use chrono::{DateTime, Utc};
use nalgebra::DVector;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use services_common::constants::risk::{
    SCORE_WEIGHTS, TRADING_DAYS, VAR_SCORE_SCALE, VOL_SCORE_SCALE,
};
use services_common::{AccountSnapshot, EngineError, RiskConfig};
use tracing::debug;

pub mod concentration;
pub mod exposure;
pub mod statistics;
pub mod stress;
pub mod var;

pub use concentration::{ConcentrationLevel, ConcentrationReport};
pub use exposure::CurrencyExposure;
pub use stress::StressResult;
pub use var::{VarEstimate, VarMethod};

/// Daily returns needed before historical VaR is attempted.
const MIN_HISTORICAL_SAMPLES: usize = 10;
/// A pairwise factor below this share of total variance is noise.
const FACTOR_FLOOR: f64 = 0.05;

/// Rates and return history the engine prices against.
///
/// Rates are quoted as base-currency units per unit of foreign currency;
/// returns are daily and most recent last.
#[derive(Debug, Clone, Default)]
pub struct MarketView {
    pub base_currency: String,
    rates: FxHashMap<String, f64>,
    returns: FxHashMap<String, Vec<f64>>,
}

impl MarketView {
    pub fn new(base_currency: &str) -> Self {
        Self {
            base_currency: base_currency.to_string(),
            rates: FxHashMap::default(),
            returns: FxHashMap::default(),
        }
    }

    pub fn set_rate(&mut self, currency: &str, rate_to_base: f64) {
        self.rates.insert(currency.to_string(), rate_to_base);
    }

    pub fn set_returns(&mut self, currency: &str, returns: Vec<f64>) {
        self.returns.insert(currency.to_string(), returns);
    }

    /// Base units per unit of `currency`; the base itself converts at 1.
    pub fn rate_to_base(&self, currency: &str) -> Option<f64> {
        if currency == self.base_currency {
            return Some(1.0);
        }
        self.rates.get(currency).copied()
    }

    pub fn returns_for(&self, currency: &str) -> &[f64] {
        self.returns.get(currency).map_or(&[], Vec::as_slice)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Rule-driven advice attached to a risk report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskRecommendation {
    pub priority: RiskLevel,
    pub description: String,
    /// Suggested next step for the portfolio owner
    pub action: String,
}

/// One named driver of portfolio variance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    /// Signed share of portfolio variance; contributions sum to 1 across
    /// the decomposition.
    pub contribution: f64,
}

/// Full output of one risk calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyRiskReport {
    /// Portfolio owner the report was generated for
    pub user_id: String,
    pub generated_at: DateTime<Utc>,
    pub base_currency: String,
    /// Sum of absolute exposures, base currency
    pub gross_exposure: f64,
    /// Signed sum of exposures, base currency
    pub net_exposure: f64,
    /// Ranked largest share first
    pub exposures: Vec<CurrencyExposure>,
    pub var_estimates: Vec<VarEstimate>,
    pub concentration: ConcentrationReport,
    pub risk_factors: Vec<RiskFactor>,
    /// Worst losses first
    pub stress_results: Vec<StressResult>,
    /// Annualized portfolio volatility
    pub portfolio_volatility: f64,
    /// Composite score in [0, 100]
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<RiskRecommendation>,
}

/// Risk calculation engine. Stateless between calls.
pub struct RiskEngine {
    config: RiskConfig,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Run the full risk calculation for the given accounts.
    ///
    /// Fails when an account currency has no rate against the base; an
    /// empty or fully netted-out portfolio yields a zeroed report rather
    /// than an error.
    pub fn calculate_currency_risk(
        &self,
        user_id: &str,
        accounts: &[AccountSnapshot],
        market: &MarketView,
    ) -> Result<CurrencyRiskReport, EngineError> {
        let windows = self.config.volatility_windows;
        let exposures = exposure::compute_exposures(
            accounts,
            market,
            self.config.default_volatility,
            windows.short_days,
        )?;
        let gross = exposure::gross_exposure(&exposures);
        let net = exposure::net_exposure(&exposures);

        if gross <= 0.0 {
            return Ok(empty_report(user_id, &market.base_currency, exposures));
        }

        // Exposure weights and aligned per-currency history, exposure order.
        // Covariance works off the medium window; the historical VaR sample
        // gets the long one.
        let n = exposures.len();
        let weights = DVector::from_iterator(n, exposures.iter().map(|e| e.base_amount / gross));
        let series: Vec<Vec<f64>> = exposures
            .iter()
            .map(|e| trailing_window(market.returns_for(&e.currency), windows.medium_days))
            .collect();
        let long_series: Vec<Vec<f64>> = exposures
            .iter()
            .map(|e| trailing_window(market.returns_for(&e.currency), windows.long_days))
            .collect();
        let daily_vols: Vec<f64> = exposures
            .iter()
            .zip(&series)
            .map(|(e, s)| {
                if e.currency == market.base_currency {
                    0.0
                } else {
                    statistics::daily_volatility(s, self.config.default_volatility)
                }
            })
            .collect();

        let covariance = statistics::covariance_matrix(&series, &daily_vols);
        let sigma_daily = weights.dot(&(&covariance * &weights)).max(0.0).sqrt();
        let portfolio_volatility = sigma_daily * TRADING_DAYS.sqrt();

        let portfolio_returns = portfolio_return_series(&exposures, &long_series, &weights, market);
        debug!(
            user_id,
            currencies = n,
            gross,
            sigma_daily,
            historical_samples = portfolio_returns.len(),
            "risk inputs assembled"
        );

        let mut var_estimates = Vec::new();
        for &confidence in &self.config.confidence_levels {
            if portfolio_returns.len() >= MIN_HISTORICAL_SAMPLES {
                if let Some(estimate) = var::historical(&portfolio_returns, gross, confidence) {
                    var_estimates.push(estimate);
                }
            }
            var_estimates.push(var::parametric(sigma_daily, gross, confidence)?);
            var_estimates.push(var::monte_carlo(
                &covariance,
                &weights,
                gross,
                confidence,
                self.config.monte_carlo_simulations,
                self.config.monte_carlo_seed,
            )?);
        }

        let concentration = concentration::assess(&exposures);
        let risk_factors = decompose_risk_factors(&exposures, &covariance, &weights);
        let stress_results =
            stress::run_all(&self.config.stress_scenarios, &exposures, &market.base_currency);

        let risk_score = composite_score(
            &var_estimates,
            gross,
            concentration.herfindahl_index,
            portfolio_volatility,
        );
        let risk_level = level_for(risk_score);
        let recommendations = recommend(
            &exposures,
            &concentration,
            &stress_results,
            risk_level,
            gross,
        );

        Ok(CurrencyRiskReport {
            user_id: user_id.to_string(),
            generated_at: Utc::now(),
            base_currency: market.base_currency.clone(),
            gross_exposure: gross,
            net_exposure: net,
            exposures,
            var_estimates,
            concentration,
            risk_factors,
            stress_results,
            portfolio_volatility,
            risk_score,
            risk_level,
            recommendations,
        })
    }
}

fn empty_report(
    user_id: &str,
    base_currency: &str,
    exposures: Vec<CurrencyExposure>,
) -> CurrencyRiskReport {
    CurrencyRiskReport {
        user_id: user_id.to_string(),
        generated_at: Utc::now(),
        base_currency: base_currency.to_string(),
        gross_exposure: 0.0,
        net_exposure: 0.0,
        concentration: concentration::assess(&exposures),
        exposures,
        var_estimates: Vec::new(),
        risk_factors: Vec::new(),
        stress_results: Vec::new(),
        portfolio_volatility: 0.0,
        risk_score: 0.0,
        risk_level: RiskLevel::Low,
        recommendations: Vec::new(),
    }
}

fn trailing_window(returns: &[f64], days: usize) -> Vec<f64> {
    let take = returns.len().min(days);
    returns[returns.len() - take..].to_vec()
}

/// Weighted sum of per-currency returns over their common trailing window.
fn portfolio_return_series(
    exposures: &[CurrencyExposure],
    series: &[Vec<f64>],
    weights: &DVector<f64>,
    market: &MarketView,
) -> Vec<f64> {
    // The window is bounded by the shortest non-base history; the base
    // currency contributes zero return at full length.
    let window = exposures
        .iter()
        .zip(series)
        .filter(|(e, _)| e.currency != market.base_currency)
        .map(|(_, s)| s.len())
        .min()
        .unwrap_or(0);
    if window == 0 {
        return Vec::new();
    }

    (0..window)
        .map(|t| {
            exposures
                .iter()
                .enumerate()
                .map(|(i, e)| {
                    if e.currency == market.base_currency {
                        0.0
                    } else {
                        let s = &series[i];
                        weights[i] * s[s.len() - window + t]
                    }
                })
                .sum()
        })
        .collect()
}

/// Variance attribution: one factor per currency plus the pairwise
/// co-movement terms large enough to matter; the small pairwise terms are
/// rolled into a residual so the shares always sum to 1.
fn decompose_risk_factors(
    exposures: &[CurrencyExposure],
    covariance: &nalgebra::DMatrix<f64>,
    weights: &DVector<f64>,
) -> Vec<RiskFactor> {
    let n = exposures.len();
    let mut raw: Vec<(String, f64)> = Vec::new();

    for i in 0..n {
        raw.push((
            format!("{} volatility", exposures[i].currency),
            weights[i] * weights[i] * covariance[(i, i)],
        ));
    }
    for i in 0..n {
        for j in (i + 1)..n {
            raw.push((
                format!(
                    "{}/{} co-movement",
                    exposures[i].currency, exposures[j].currency
                ),
                2.0 * weights[i] * weights[j] * covariance[(i, j)],
            ));
        }
    }

    // Normalize by total portfolio variance so the signed shares sum to 1.
    let total: f64 = raw.iter().map(|(_, c)| c).sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let mut factors: Vec<RiskFactor> = Vec::new();
    let mut residual = 0.0;
    for (name, c) in raw {
        let contribution = c / total;
        if contribution.abs() >= FACTOR_FLOOR || !name.contains('/') {
            factors.push(RiskFactor { name, contribution });
        } else {
            residual += contribution;
        }
    }
    if residual != 0.0 {
        factors.push(RiskFactor {
            name: "residual co-movement".to_string(),
            contribution: residual,
        });
    }
    factors.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));
    factors
}

/// Composite 0-100 score: scaled parametric VaR, concentration, volatility.
fn composite_score(
    var_estimates: &[VarEstimate],
    gross_exposure: f64,
    herfindahl_index: f64,
    portfolio_volatility: f64,
) -> f64 {
    let var_component = var_estimates
        .iter()
        .find(|e| e.method == VarMethod::Parametric)
        .map_or(0.0, |e| {
            (e.value / gross_exposure / VAR_SCORE_SCALE).clamp(0.0, 1.0)
        });
    let concentration_component = herfindahl_index.clamp(0.0, 1.0);
    let volatility_component = (portfolio_volatility / VOL_SCORE_SCALE).clamp(0.0, 1.0);

    let (w_var, w_conc, w_vol) = SCORE_WEIGHTS;
    100.0
        * (w_var * var_component
            + w_conc * concentration_component
            + w_vol * volatility_component)
}

fn level_for(score: f64) -> RiskLevel {
    if score >= 75.0 {
        RiskLevel::Critical
    } else if score >= 50.0 {
        RiskLevel::High
    } else if score >= 25.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn recommend(
    exposures: &[CurrencyExposure],
    concentration: &ConcentrationReport,
    stress_results: &[StressResult],
    risk_level: RiskLevel,
    gross_exposure: f64,
) -> Vec<RiskRecommendation> {
    let mut recommendations = Vec::new();

    if concentration.level >= ConcentrationLevel::High {
        if let Some(dominant) = &concentration.dominant_currency {
            recommendations.push(RiskRecommendation {
                priority: if concentration.level == ConcentrationLevel::Critical {
                    RiskLevel::Critical
                } else {
                    RiskLevel::High
                },
                description: format!(
                    "{dominant} holds {:.0}% of gross exposure",
                    concentration.max_share * 100.0
                ),
                action: "diversify across additional currencies".to_string(),
            });
        }
    }

    for exposure in exposures {
        if exposure.share >= 0.10 && exposure.volatility >= 0.15 {
            recommendations.push(RiskRecommendation {
                priority: RiskLevel::High,
                description: format!(
                    "{} shows {:.0}% annualized volatility on {:.0}% of exposure",
                    exposure.currency,
                    exposure.volatility * 100.0,
                    exposure.share * 100.0
                ),
                action: format!("hedge the {} exposure", exposure.currency),
            });
        }
    }

    if let Some(worst) = stress_results.first() {
        if worst.pnl / gross_exposure <= -0.10 {
            recommendations.push(RiskRecommendation {
                priority: RiskLevel::Medium,
                description: format!(
                    "scenario '{}' loses {:.1}% of gross exposure",
                    worst.scenario,
                    -worst.pnl_pct * 100.0
                ),
                action: "consider protective hedges against the scenario currencies".to_string(),
            });
        }
    }

    if recommendations.is_empty() && risk_level == RiskLevel::Low {
        recommendations.push(RiskRecommendation {
            priority: RiskLevel::Low,
            description: "risk profile within acceptable bounds".to_string(),
            action: "no action required".to_string(),
        });
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use services_common::AccountType;

    fn account(currency: &str, balance: f64) -> AccountSnapshot {
        AccountSnapshot {
            currency: currency.to_string(),
            balance,
            account_type: AccountType::Checking,
        }
    }

    fn noisy_returns(scale: f64, n: usize) -> Vec<f64> {
        // Deterministic pseudo-noise; mean-free over full periods.
        (0..n)
            .map(|i| scale * ((i % 5) as f64 - 2.0) / 2.0)
            .collect()
    }

    fn market_with_history() -> MarketView {
        let mut market = MarketView::new("USD");
        market.set_rate("EUR", 1.09);
        market.set_rate("GBP", 1.27);
        market.set_returns("EUR", noisy_returns(0.008, 60));
        market.set_returns("GBP", noisy_returns(0.010, 60));
        market
    }

    fn engine() -> RiskEngine {
        RiskEngine::new(RiskConfig::default())
    }

    #[test]
    fn report_covers_all_methods_and_confidences() {
        let accounts = vec![
            account("EUR", 50_000.0),
            account("GBP", 30_000.0),
            account("USD", 40_000.0),
        ];
        let report = engine()
            .calculate_currency_risk("user-1", &accounts, &market_with_history())
            .unwrap();

        // 2 confidence levels x 3 methods
        assert_eq!(report.var_estimates.len(), 6);
        for method in [VarMethod::Historical, VarMethod::Parametric, VarMethod::MonteCarlo] {
            let of_method: Vec<&VarEstimate> = report
                .var_estimates
                .iter()
                .filter(|e| e.method == method)
                .collect();
            assert_eq!(of_method.len(), 2, "{method}");
        }
    }

    #[test]
    fn var_orderings_hold() {
        let accounts = vec![account("EUR", 50_000.0), account("GBP", 30_000.0)];
        let report = engine()
            .calculate_currency_risk("user-1", &accounts, &market_with_history())
            .unwrap();

        for method in [VarMethod::Historical, VarMethod::Parametric, VarMethod::MonteCarlo] {
            let mut by_confidence: Vec<&VarEstimate> = report
                .var_estimates
                .iter()
                .filter(|e| e.method == method)
                .collect();
            by_confidence.sort_by(|a, b| a.confidence.total_cmp(&b.confidence));
            assert!(
                by_confidence[1].value >= by_confidence[0].value,
                "{method}: VaR99 {} < VaR95 {}",
                by_confidence[1].value,
                by_confidence[0].value
            );
            for estimate in by_confidence {
                assert!(estimate.expected_shortfall >= estimate.value, "{method}");
            }
        }
    }

    #[test]
    fn concentrated_portfolio_scores_higher() {
        let concentrated = vec![account("EUR", 90_000.0), account("USD", 10_000.0)];
        let spread = vec![
            account("EUR", 25_000.0),
            account("GBP", 25_000.0),
            account("USD", 50_000.0),
        ];
        let market = market_with_history();

        let high = engine().calculate_currency_risk("user-1", &concentrated, &market).unwrap();
        let low = engine().calculate_currency_risk("user-1", &spread, &market).unwrap();

        assert!(high.risk_score > low.risk_score);
        assert!(high.concentration.level >= ConcentrationLevel::High);
    }

    #[test]
    fn missing_rate_propagates() {
        let accounts = vec![account("NOK", 10_000.0)];
        let err = engine()
            .calculate_currency_risk("user-1", &accounts, &market_with_history())
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingRate { .. }));
    }

    #[test]
    fn empty_portfolio_yields_zero_report() {
        let report = engine()
            .calculate_currency_risk("user-1", &[], &market_with_history())
            .unwrap();
        assert_relative_eq!(report.gross_exposure, 0.0);
        assert_relative_eq!(report.risk_score, 0.0);
        assert_eq!(report.risk_level, RiskLevel::Low);
        assert!(report.var_estimates.is_empty());
    }

    #[test]
    fn base_only_portfolio_is_riskless_in_fx_terms() {
        let accounts = vec![account("USD", 100_000.0)];
        let report = engine()
            .calculate_currency_risk("user-1", &accounts, &market_with_history())
            .unwrap();

        assert_relative_eq!(report.portfolio_volatility, 0.0);
        let parametric = report
            .var_estimates
            .iter()
            .find(|e| e.method == VarMethod::Parametric)
            .unwrap();
        assert_relative_eq!(parametric.value, 0.0);
        // Concentration still flags the single-currency pile-up.
        assert_eq!(report.concentration.level, ConcentrationLevel::Critical);
    }

    #[test]
    fn risk_factors_are_normalized_and_ranked() {
        let accounts = vec![account("EUR", 60_000.0), account("GBP", 40_000.0)];
        let report = engine()
            .calculate_currency_risk("user-1", &accounts, &market_with_history())
            .unwrap();

        assert!(!report.risk_factors.is_empty());
        let sum: f64 = report.risk_factors.iter().map(|f| f.contribution).sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-9);
        assert!(
            report
                .risk_factors
                .windows(2)
                .all(|w| w[0].contribution.abs() >= w[1].contribution.abs())
        );
    }

    #[test]
    fn report_carries_the_user_id() {
        let accounts = vec![account("EUR", 1_000.0)];
        let report = engine()
            .calculate_currency_risk("user-7", &accounts, &market_with_history())
            .unwrap();
        assert_eq!(report.user_id, "user-7");

        let empty = engine()
            .calculate_currency_risk("user-7", &[], &market_with_history())
            .unwrap();
        assert_eq!(empty.user_id, "user-7");
    }

    #[test]
    fn small_pairwise_factors_roll_into_a_residual() {
        // Near-zero cross-covariance: every pairwise term falls under the
        // floor, yet the shares still sum to exactly 1.
        let exposures: Vec<CurrencyExposure> = ["EUR", "GBP", "CHF"]
            .iter()
            .map(|c| CurrencyExposure {
                currency: c.to_string(),
                amount: 10_000.0,
                base_amount: 10_000.0,
                share: 1.0 / 3.0,
                volatility: 0.10,
            })
            .collect();
        let mut covariance = nalgebra::DMatrix::from_element(3, 3, 1e-6);
        for i in 0..3 {
            covariance[(i, i)] = 1e-4;
        }
        let weights = DVector::from_element(3, 1.0 / 3.0);

        let factors = decompose_risk_factors(&exposures, &covariance, &weights);
        let sum: f64 = factors.iter().map(|f| f.contribution).sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
        assert!(factors.iter().any(|f| f.name == "residual co-movement"));
        assert!(factors.iter().all(|f| !f.name.contains('/')));
    }

    #[test]
    fn medium_window_bounds_the_covariance_sample() {
        // Old turbulence, flat recent stretch: a 10-day medium window sees
        // zero variance while the long-window historical sample does not.
        let mut config = RiskConfig::default();
        config.volatility_windows.medium_days = 10;
        let mut market = MarketView::new("USD");
        market.set_rate("EUR", 1.09);
        let mut returns = noisy_returns(0.01, 50);
        returns.extend(std::iter::repeat(0.0).take(10));
        market.set_returns("EUR", returns);

        let report = RiskEngine::new(config)
            .calculate_currency_risk("user-1", &[account("EUR", 100_000.0)], &market)
            .unwrap();

        assert_relative_eq!(report.portfolio_volatility, 0.0, epsilon = 1e-12);
        let parametric = report
            .var_estimates
            .iter()
            .find(|e| e.method == VarMethod::Parametric)
            .unwrap();
        assert_relative_eq!(parametric.value, 0.0, epsilon = 1e-12);
        let historical = report
            .var_estimates
            .iter()
            .find(|e| e.method == VarMethod::Historical)
            .unwrap();
        assert!(historical.value > 0.0);
    }

    #[test]
    fn stress_results_feed_recommendations() {
        // Everything in EUR: the EUR crisis scenario bites hard.
        let accounts = vec![account("EUR", 100_000.0)];
        let report = engine()
            .calculate_currency_risk("user-1", &accounts, &market_with_history())
            .unwrap();

        let worst = report.stress_results.first().unwrap();
        assert!(worst.pnl < 0.0);
        assert!(!report.recommendations.is_empty());
    }
}
