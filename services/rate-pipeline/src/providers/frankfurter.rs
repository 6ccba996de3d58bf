//! Adapter for the Frankfurter (ECB reference rates) API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use services_common::{CurrencyPair, RawRate};
use std::collections::HashMap;

use super::RateProvider;

const API_URL: &str = "https://api.frankfurter.app/latest";

/// Frankfurter serves daily ECB reference rates, keyless. It rejects
/// requests where `from` appears in `to`, so the adapter strips the base
/// from the symbol list before querying.
pub struct FrankfurterProvider {
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    base: String,
    rates: HashMap<String, f64>,
}

impl FrankfurterProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RateProvider for FrankfurterProvider {
    fn name(&self) -> &str {
        "frankfurter"
    }

    async fn fetch_rates(&self, base: &str, symbols: &[String]) -> Result<Vec<RawRate>> {
        let targets: Vec<&str> = symbols
            .iter()
            .map(String::as_str)
            .filter(|s| *s != base)
            .collect();
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let to_param = targets.join(",");

        let response: LatestResponse = self
            .client
            .get(API_URL)
            .query(&[("from", base), ("to", to_param.as_str())])
            .send()
            .await
            .context("frankfurter request failed")?
            .error_for_status()
            .context("frankfurter returned an error status")?
            .json()
            .await
            .context("frankfurter returned malformed JSON")?;

        anyhow::ensure!(
            response.base == base,
            "frankfurter quoted base {} instead of {}",
            response.base,
            base
        );

        let fetched_at = Utc::now();
        Ok(response
            .rates
            .into_iter()
            .filter(|(symbol, _)| symbols.iter().any(|s| s == symbol))
            .map(|(symbol, rate)| RawRate {
                pair: CurrencyPair::new(base, &symbol),
                rate,
                bid: None,
                ask: None,
                provider: "frankfurter".to_string(),
                fetched_at,
            })
            .collect())
    }
}
