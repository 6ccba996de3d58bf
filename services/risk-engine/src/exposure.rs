//! Account-to-exposure conversion.
//!
//! Nets the supplied accounts per currency, converts each net balance into
//! the base currency, and attaches volatility. Credit accounts count as
//! liabilities, so a large credit balance offsets a deposit in the same
//! currency.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use services_common::{AccountSnapshot, AccountType, EngineError};

use crate::MarketView;
use crate::statistics;

/// Net position in one currency, expressed in the base currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyExposure {
    /// ISO 4217 code
    pub currency: String,
    /// Net balance in the currency itself
    pub amount: f64,
    /// Net balance converted to the base currency (signed)
    pub base_amount: f64,
    /// Share of gross exposure, in [0, 1]
    pub share: f64,
    /// Annualized volatility of this currency against the base
    pub volatility: f64,
}

/// Net, convert and rank the accounts' exposures.
///
/// Shares are computed against gross (absolute) exposure and sum to 1
/// whenever gross exposure is non-zero. Volatility is measured over the
/// trailing `volatility_window` daily returns. The result is sorted by
/// share, largest first. Fails with [`EngineError::MissingRate`] when a
/// non-base currency has no rate.
pub fn compute_exposures(
    accounts: &[AccountSnapshot],
    market: &MarketView,
    default_volatility: f64,
    volatility_window: usize,
) -> Result<Vec<CurrencyExposure>, EngineError> {
    let mut net: FxHashMap<String, f64> = FxHashMap::default();
    for account in accounts {
        let sign = match account.account_type {
            AccountType::Credit => -1.0,
            _ => 1.0,
        };
        *net.entry(account.currency.clone()).or_insert(0.0) += sign * account.balance;
    }

    let mut exposures = Vec::with_capacity(net.len());
    for (currency, amount) in net {
        let rate = market
            .rate_to_base(&currency)
            .ok_or_else(|| EngineError::MissingRate {
                currency: currency.clone(),
                base: market.base_currency.clone(),
            })?;
        // The base currency is the numeraire: it cannot move against itself.
        let volatility = if currency == market.base_currency {
            0.0
        } else {
            let returns = market.returns_for(&currency);
            let take = returns.len().min(volatility_window);
            statistics::annualized_volatility(&returns[returns.len() - take..], default_volatility)
        };
        exposures.push(CurrencyExposure {
            currency,
            amount,
            base_amount: amount * rate,
            share: 0.0,
            volatility,
        });
    }

    let gross = gross_exposure(&exposures);
    if gross > 0.0 {
        for exposure in &mut exposures {
            exposure.share = exposure.base_amount.abs() / gross;
        }
    }
    exposures.sort_by(|a, b| b.share.total_cmp(&a.share));
    Ok(exposures)
}

/// Sum of absolute base-currency exposures.
pub fn gross_exposure(exposures: &[CurrencyExposure]) -> f64 {
    exposures.iter().map(|e| e.base_amount.abs()).sum()
}

/// Signed sum of base-currency exposures.
pub fn net_exposure(exposures: &[CurrencyExposure]) -> f64 {
    exposures.iter().map(|e| e.base_amount).sum()
}
