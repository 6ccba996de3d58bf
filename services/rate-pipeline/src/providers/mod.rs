//! Rate provider adapters.
//!
//! Each adapter wraps one public FX rate API and normalizes its response
//! shape into [`RawRate`] values. Adapters are stateless beyond the shared
//! HTTP client; retry and failure accounting belong to the pipeline.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use services_common::{ProviderConfig, RawRate};

mod exchangerate_host;
mod frankfurter;
mod open_exchange_rates;

pub use exchangerate_host::ExchangeRateHostProvider;
pub use frankfurter::FrankfurterProvider;
pub use open_exchange_rates::OpenExchangeRatesProvider;

/// A source of spot FX rates for one base currency against many quotes.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Stable provider identifier used in rate attribution and stats.
    fn name(&self) -> &str;

    /// Fetch current rates from `base` into each of `symbols`.
    ///
    /// Returns one [`RawRate`] per symbol the provider was able to quote.
    /// Symbols the provider does not cover are silently omitted; a failed
    /// request is an error.
    async fn fetch_rates(&self, base: &str, symbols: &[String]) -> Result<Vec<RawRate>>;
}

/// Builds provider adapters from configuration entries.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Instantiate the adapter named by `config`, or `None` for an
    /// unrecognized provider name.
    pub fn create(
        config: &ProviderConfig,
        client: reqwest::Client,
    ) -> Option<Box<dyn RateProvider>> {
        match config.name.as_str() {
            "exchangerate-host" => Some(Box::new(ExchangeRateHostProvider::new(
                client,
                config.api_key.clone(),
            ))),
            "frankfurter" => Some(Box::new(FrankfurterProvider::new(client))),
            "open-exchange-rates" => config
                .api_key
                .clone()
                .map(|key| Box::new(OpenExchangeRatesProvider::new(client, key)) as _),
            _ => None,
        }
    }

    /// Shared HTTP client with the per-request timeout all adapters use.
    pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("fxlattice-rate-pipeline")
            .build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_config(name: &str, api_key: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            api_key: api_key.map(String::from),
            reliability: Some(0.9),
        }
    }

    #[test]
    fn factory_builds_known_providers() {
        let client = ProviderFactory::http_client(5).unwrap();
        let p = ProviderFactory::create(&provider_config("frankfurter", None), client.clone());
        assert_eq!(p.unwrap().name(), "frankfurter");

        let p = ProviderFactory::create(&provider_config("exchangerate-host", None), client);
        assert_eq!(p.unwrap().name(), "exchangerate-host");
    }

    #[test]
    fn factory_rejects_unknown_provider() {
        let client = ProviderFactory::http_client(5).unwrap();
        assert!(ProviderFactory::create(&provider_config("no-such-api", None), client).is_none());
    }

    #[test]
    fn open_exchange_rates_requires_api_key() {
        let client = ProviderFactory::http_client(5).unwrap();
        let without = provider_config("open-exchange-rates", None);
        assert!(ProviderFactory::create(&without, client.clone()).is_none());

        let with = provider_config("open-exchange-rates", Some("key"));
        assert!(ProviderFactory::create(&with, client).is_some());
    }
}
