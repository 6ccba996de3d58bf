//! Return-series statistics: volatility, correlation, covariance.

use nalgebra::DMatrix;
use services_common::constants::risk::TRADING_DAYS;

/// Minimum observations before a sample statistic is trusted.
pub const MIN_SAMPLES: usize = 2;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (Bessel-corrected).
pub fn stddev(values: &[f64]) -> f64 {
    if values.len() < MIN_SAMPLES {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Daily volatility of a return series, falling back to a configured
/// assumption when history is too thin.
pub fn daily_volatility(returns: &[f64], default_annual: f64) -> f64 {
    if returns.len() < MIN_SAMPLES {
        return default_annual / TRADING_DAYS.sqrt();
    }
    stddev(returns)
}

/// Annualized volatility of a daily return series.
pub fn annualized_volatility(returns: &[f64], default_annual: f64) -> f64 {
    if returns.len() < MIN_SAMPLES {
        return default_annual;
    }
    stddev(returns) * TRADING_DAYS.sqrt()
}

/// Pearson correlation over the trailing overlap of two series.
///
/// Returns 0 when either series is degenerate (too short or constant).
pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < MIN_SAMPLES {
        return 0.0;
    }
    let a = &a[a.len() - n..];
    let b = &b[b.len() - n..];
    let (ma, mb) = (mean(a), mean(b));

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - ma;
        let db = b[i] - mb;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return 0.0;
    }
    (cov / (var_a * var_b).sqrt()).clamp(-1.0, 1.0)
}

/// Daily covariance matrix assembled from pairwise correlations and
/// per-series daily volatilities. Series without overlap contribute a
/// zero correlation, leaving the matrix valid.
pub fn covariance_matrix(series: &[Vec<f64>], daily_vols: &[f64]) -> DMatrix<f64> {
    let n = daily_vols.len();
    DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            daily_vols[i] * daily_vols[i]
        } else {
            correlation(&series[i], &series[j]) * daily_vols[i] * daily_vols[j]
        }
    })
}
