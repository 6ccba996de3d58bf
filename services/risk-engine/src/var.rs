//! Value-at-Risk and Expected Shortfall.
//!
//! Three estimators over a one-day horizon: empirical quantile of realized
//! portfolio returns, the variance-covariance closed form, and a seeded
//! Monte Carlo over correlated normal shocks. Losses are reported as
//! positive base-currency amounts.

use nalgebra::{Cholesky, DMatrix, DVector};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use services_common::EngineError;
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarMethod {
    Historical,
    Parametric,
    MonteCarlo,
}

impl std::fmt::Display for VarMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Historical => write!(f, "historical"),
            Self::Parametric => write!(f, "parametric"),
            Self::MonteCarlo => write!(f, "monte_carlo"),
        }
    }
}

/// One VaR/ES estimate at a given confidence level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarEstimate {
    pub method: VarMethod,
    /// Confidence level in (0, 1), e.g. 0.95
    pub confidence: f64,
    /// Horizon in days
    pub horizon_days: u32,
    /// Loss not exceeded with `confidence`, in base currency, >= 0
    pub value: f64,
    /// Mean loss beyond the VaR threshold, >= `value`
    pub expected_shortfall: f64,
}

/// Empirical VaR/ES from realized portfolio returns.
///
/// Returns `None` when the series is too short to carve out a tail at the
/// requested confidence.
pub fn historical(
    portfolio_returns: &[f64],
    gross_exposure: f64,
    confidence: f64,
) -> Option<VarEstimate> {
    let n = portfolio_returns.len();
    if n < 2 || gross_exposure <= 0.0 {
        return None;
    }
    let mut sorted = portfolio_returns.to_vec();
    sorted.sort_by(f64::total_cmp);

    let index = (((1.0 - confidence) * n as f64).floor() as usize).min(n - 1);
    let quantile = sorted[index];
    let tail = &sorted[..=index];
    let tail_mean = tail.iter().sum::<f64>() / tail.len() as f64;

    let value = (-quantile * gross_exposure).max(0.0);
    Some(VarEstimate {
        method: VarMethod::Historical,
        confidence,
        horizon_days: 1,
        value,
        expected_shortfall: (-tail_mean * gross_exposure).max(value),
    })
}

/// Variance-covariance VaR/ES for a normal portfolio.
///
/// `sigma_daily` is the portfolio's one-day return standard deviation. The
/// ES uses the analytic normal tail expectation `sigma * phi(z) / (1 - c)`.
pub fn parametric(
    sigma_daily: f64,
    gross_exposure: f64,
    confidence: f64,
) -> Result<VarEstimate, EngineError> {
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| EngineError::Computation(format!("standard normal: {e}")))?;
    let z = normal.inverse_cdf(confidence);
    let value = (z * sigma_daily * gross_exposure).max(0.0);
    let expected_shortfall =
        (sigma_daily * gross_exposure * normal.pdf(z) / (1.0 - confidence)).max(value);
    Ok(VarEstimate {
        method: VarMethod::Parametric,
        confidence,
        horizon_days: 1,
        value,
        expected_shortfall,
    })
}

/// Monte Carlo VaR/ES over correlated normal shocks.
///
/// `covariance` is the daily covariance matrix of currency returns and
/// `weights` the signed exposure shares. The run is reproducible for a
/// fixed seed. The covariance factorization tolerates a numerically
/// semi-definite matrix via escalating diagonal loading.
pub fn monte_carlo(
    covariance: &DMatrix<f64>,
    weights: &DVector<f64>,
    gross_exposure: f64,
    confidence: f64,
    simulations: usize,
    seed: u64,
) -> Result<VarEstimate, EngineError> {
    let n = covariance.nrows();
    if n == 0 || weights.len() != n {
        return Err(EngineError::Computation(
            "covariance and weights dimensions disagree".to_string(),
        ));
    }
    if simulations < 2 {
        return Err(EngineError::Computation(
            "monte carlo needs at least 2 simulations".to_string(),
        ));
    }

    let factor = factorize(covariance)?;
    let mut rng = StdRng::seed_from_u64(seed);

    let mut simulated: Vec<f64> = Vec::with_capacity(simulations);
    for _ in 0..simulations {
        let shocks = DVector::from_fn(n, |_, _| StandardNormal.sample(&mut rng));
        let correlated = &factor * shocks;
        simulated.push(weights.dot(&correlated));
    }
    simulated.sort_by(f64::total_cmp);

    let index = (((1.0 - confidence) * simulations as f64).floor() as usize).min(simulations - 1);
    let quantile = simulated[index];
    let tail = &simulated[..=index];
    let tail_mean = tail.iter().sum::<f64>() / tail.len() as f64;

    let value = (-quantile * gross_exposure).max(0.0);
    Ok(VarEstimate {
        method: VarMethod::MonteCarlo,
        confidence,
        horizon_days: 1,
        value,
        expected_shortfall: (-tail_mean * gross_exposure).max(value),
    })
}

/// Lower-triangular factor of the covariance matrix.
///
/// A sample covariance can fail strict positive-definiteness; retry with
/// progressively larger diagonal loading before giving up.
fn factorize(covariance: &DMatrix<f64>) -> Result<DMatrix<f64>, EngineError> {
    if let Some(cholesky) = Cholesky::new(covariance.clone()) {
        return Ok(cholesky.l());
    }

    let n = covariance.nrows();
    let scale = covariance.trace() / n as f64;
    if scale <= 0.0 {
        // All-zero covariance: a riskless portfolio, not a failure.
        return Ok(DMatrix::zeros(n, n));
    }
    let mut loading = scale * 1e-10;
    for _ in 0..8 {
        let loaded = covariance + DMatrix::identity(n, n) * loading;
        if let Some(cholesky) = Cholesky::new(loaded) {
            return Ok(cholesky.l());
        }
        loading *= 10.0;
    }
    Err(EngineError::Computation(
        "covariance matrix is not positive semi-definite".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn alternating_returns(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| if i % 2 == 0 { 0.01 } else { -0.01 })
            .collect()
    }

    #[test]
    fn historical_var_picks_the_tail_quantile() {
        // 100 returns with one -5% crash. At 99% the quantile is the
        // second-worst return, and the ES tail averages in the crash.
        let mut returns = alternating_returns(99);
        returns.push(-0.05);
        let estimate = historical(&returns, 1_000_000.0, 0.99).unwrap();
        assert_relative_eq!(estimate.value, 10_000.0, epsilon = 1e-6);
        assert_relative_eq!(estimate.expected_shortfall, 30_000.0, epsilon = 1e-6);
    }

    #[test]
    fn historical_confidence_ordering() {
        let mut returns = alternating_returns(99);
        returns.push(-0.05);
        let var95 = historical(&returns, 1_000_000.0, 0.95).unwrap();
        let var99 = historical(&returns, 1_000_000.0, 0.99).unwrap();
        assert!(var99.value >= var95.value);
    }

    #[test]
    fn historical_needs_history() {
        assert!(historical(&[0.01], 1_000.0, 0.95).is_none());
        assert!(historical(&[], 1_000.0, 0.95).is_none());
    }

    #[test]
    fn parametric_matches_closed_form() {
        // z(0.95) ~ 1.6449
        let estimate = parametric(0.01, 1_000_000.0, 0.95).unwrap();
        assert_relative_eq!(estimate.value, 16_448.5, epsilon = 1.0);
        assert!(estimate.expected_shortfall > estimate.value);

        let deeper = parametric(0.01, 1_000_000.0, 0.99).unwrap();
        assert!(deeper.value > estimate.value);
    }

    #[test]
    fn monte_carlo_is_reproducible() {
        let cov = DMatrix::from_diagonal_element(2, 2, 0.0001);
        let weights = DVector::from_vec(vec![0.6, 0.4]);

        let a = monte_carlo(&cov, &weights, 1_000_000.0, 0.95, 2000, 42).unwrap();
        let b = monte_carlo(&cov, &weights, 1_000_000.0, 0.95, 2000, 42).unwrap();
        assert_relative_eq!(a.value, b.value, epsilon = 1e-12);

        let other_seed = monte_carlo(&cov, &weights, 1_000_000.0, 0.95, 2000, 7).unwrap();
        assert!((a.value - other_seed.value).abs() > 1e-9);
    }

    #[test]
    fn monte_carlo_approximates_parametric_for_normal_portfolio() {
        // Single asset, sigma 1%: MC should land near the closed form.
        let cov = DMatrix::from_element(1, 1, 0.0001);
        let weights = DVector::from_element(1, 1.0);

        let mc = monte_carlo(&cov, &weights, 1_000_000.0, 0.95, 20_000, 42).unwrap();
        let closed = parametric(0.01, 1_000_000.0, 0.95).unwrap();
        let relative_gap = (mc.value - closed.value).abs() / closed.value;
        assert!(relative_gap < 0.10, "relative gap {relative_gap}");
        assert!(mc.expected_shortfall >= mc.value);
    }

    #[test]
    fn factorize_tolerates_semi_definite_covariance() {
        // Perfectly correlated pair: rank-deficient covariance.
        let cov = DMatrix::from_row_slice(2, 2, &[0.0001, 0.0001, 0.0001, 0.0001]);
        let weights = DVector::from_vec(vec![0.5, 0.5]);
        let estimate = monte_carlo(&cov, &weights, 1_000_000.0, 0.95, 2000, 42);
        assert!(estimate.is_ok());
    }
}
