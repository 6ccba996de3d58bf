//! Adapter for the exchangerate.host latest-rates endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use services_common::{CurrencyPair, RawRate};
use std::collections::HashMap;

use super::RateProvider;

const API_URL: &str = "https://api.exchangerate.host/latest";

/// exchangerate.host quotes any base directly and works without a key;
/// a key lifts the rate limit.
pub struct ExchangeRateHostProvider {
    client: reqwest::Client,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    #[serde(default)]
    success: Option<bool>,
    base: String,
    rates: HashMap<String, f64>,
}

impl ExchangeRateHostProvider {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl RateProvider for ExchangeRateHostProvider {
    fn name(&self) -> &str {
        "exchangerate-host"
    }

    async fn fetch_rates(&self, base: &str, symbols: &[String]) -> Result<Vec<RawRate>> {
        let symbols_param = symbols.join(",");
        let mut request = self
            .client
            .get(API_URL)
            .query(&[("base", base), ("symbols", symbols_param.as_str())]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("access_key", key.as_str())]);
        }

        let response: LatestResponse = request
            .send()
            .await
            .context("exchangerate.host request failed")?
            .error_for_status()
            .context("exchangerate.host returned an error status")?
            .json()
            .await
            .context("exchangerate.host returned malformed JSON")?;

        if response.success == Some(false) {
            anyhow::bail!("exchangerate.host reported failure");
        }
        anyhow::ensure!(
            response.base == base,
            "exchangerate.host quoted base {} instead of {}",
            response.base,
            base
        );

        let fetched_at = Utc::now();
        Ok(symbols
            .iter()
            .filter_map(|symbol| {
                response.rates.get(symbol).map(|&rate| RawRate {
                    pair: CurrencyPair::new(base, symbol),
                    rate,
                    bid: None,
                    ask: None,
                    provider: "exchangerate-host".to_string(),
                    fetched_at,
                })
            })
            .collect())
    }
}
