//! Rate pipeline service binary.
//!
//! Loads configuration, connects the rate cache, and drives the ingestion
//! loop until interrupted. An unreachable primary cache at startup is fatal;
//! failures after startup degrade to the in-memory fallback.

use std::sync::Arc;

use anyhow::{Context, Result};
use rate_cache::RateCache;
use rate_pipeline::RatePipeline;
use services_common::{EngineConfig, EngineEvent, EventBus};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "rate-pipeline";
const CONFIG_ENV: &str = "FX_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("starting {SERVICE_NAME} v{}", env!("CARGO_PKG_VERSION"));

    let config = match std::env::var(CONFIG_ENV) {
        Ok(path) => EngineConfig::from_file(&path)
            .with_context(|| format!("loading configuration from {path}"))?,
        Err(_) => {
            info!("{CONFIG_ENV} not set, using default configuration");
            EngineConfig::default()
        }
    };

    let events = EventBus::default();
    let cache = Arc::new(
        RateCache::connect(&config.cache, events.clone())
            .await
            .context("primary cache unreachable at startup")?,
    );
    info!(redis_url = %config.cache.redis_url, "rate cache connected");

    let pipeline = Arc::new(
        RatePipeline::from_config(config, Arc::clone(&cache), events.clone())
            .context("building rate pipeline")?,
    );
    pipeline.start()?;

    // Surface engine events in the service log until shutdown.
    let mut subscription = events.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            event = subscription.recv() => match event {
                Ok(EngineEvent::RatesUpdated { rates, validation, quality_score }) => {
                    info!(
                        pairs = rates.len(),
                        valid = validation.valid,
                        invalid = validation.invalid,
                        quality = format!("{quality_score:.1}"),
                        "rates updated"
                    );
                }
                Ok(EngineEvent::RateAlert { pair, threshold, direction, current_rate }) => {
                    warn!(%pair, threshold, ?direction, current_rate, "rate alert fired");
                }
                Ok(EngineEvent::PipelineStopped { reason }) => {
                    error!(%reason, "pipeline stopped itself");
                    break;
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagging");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    pipeline.stop();
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "{}=info,rate_cache=info,rate_validator=info",
                    SERVICE_NAME.replace('-', "_")
                )
                .into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();
}
