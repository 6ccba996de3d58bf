//! Adapter for Open Exchange Rates.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use services_common::{CurrencyPair, RawRate};
use std::collections::HashMap;

use super::RateProvider;

const API_URL: &str = "https://openexchangerates.org/api/latest.json";

/// Open Exchange Rates quotes everything against USD on the standard plan.
/// For any other base the adapter rebases locally:
/// `rate(base -> sym) = usd_rate(sym) / usd_rate(base)`.
pub struct OpenExchangeRatesProvider {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    base: String,
    rates: HashMap<String, f64>,
}

impl OpenExchangeRatesProvider {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl RateProvider for OpenExchangeRatesProvider {
    fn name(&self) -> &str {
        "open-exchange-rates"
    }

    async fn fetch_rates(&self, base: &str, symbols: &[String]) -> Result<Vec<RawRate>> {
        let response: LatestResponse = self
            .client
            .get(API_URL)
            .query(&[("app_id", self.api_key.as_str())])
            .send()
            .await
            .context("open exchange rates request failed")?
            .error_for_status()
            .context("open exchange rates returned an error status")?
            .json()
            .await
            .context("open exchange rates returned malformed JSON")?;

        anyhow::ensure!(
            response.base == "USD",
            "open exchange rates quoted unexpected base {}",
            response.base
        );

        let base_in_usd = if base == "USD" {
            1.0
        } else {
            match response.rates.get(base) {
                Some(&r) if r > 0.0 => r,
                _ => anyhow::bail!("open exchange rates does not quote base {base}"),
            }
        };

        let fetched_at = Utc::now();
        Ok(symbols
            .iter()
            .filter(|symbol| symbol.as_str() != base)
            .filter_map(|symbol| {
                response.rates.get(symbol).map(|&usd_rate| RawRate {
                    pair: CurrencyPair::new(base, symbol),
                    rate: usd_rate / base_in_usd,
                    bid: None,
                    ask: None,
                    provider: "open-exchange-rates".to_string(),
                    fetched_at,
                })
            })
            .collect())
    }
}
