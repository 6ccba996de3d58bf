//! Hedging strategy optimizer.
//!
//! Consumes a risk report and produces a full hedging recommendation:
//! per-currency needs, an optimized strategy per need, the single best
//! strategy across currencies, an implementation plan and a rebalance
//! schedule. Pure computation; safe to call concurrently for different
//! portfolios.

use chrono::{DateTime, Utc};
use risk_engine::CurrencyRiskReport;
use serde::{Deserialize, Serialize};
use services_common::{EngineError, HedgingConfig};
use tracing::{debug, info};

pub mod needs;
pub mod optimizer;
pub mod plan;

pub use needs::{HedgingNeed, Urgency};
pub use optimizer::{CostBenefitAnalysis, HedgingStrategy, IterationBudget, ScenarioOutcome};
pub use plan::{ImplementationPlan, PlanPhase, RebalanceSchedule};

/// Final output of one optimizer run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgingRecommendation {
    /// Portfolio owner the recommendation was generated for
    pub user_id: String,
    pub generated_at: DateTime<Utc>,
    /// Needs the optimizer worked from, largest exposure first
    pub hedging_needs: Vec<HedgingNeed>,
    /// Best strategy across currencies by normalized benefit
    pub recommended_strategy: Option<HedgingStrategy>,
    /// Remaining per-currency strategies
    pub alternative_strategies: Vec<HedgingStrategy>,
    pub implementation_plan: ImplementationPlan,
    pub rebalance_schedule: RebalanceSchedule,
    /// Sum of all per-currency strategy costs, base currency
    pub total_cost: f64,
    /// Exposure-weighted hedge effectiveness across strategies, in [0, 1]
    pub expected_effectiveness: f64,
    /// Exposure-weighted fraction of hedged risk removed, in [0, 1]
    pub risk_reduction: f64,
}

impl HedgingRecommendation {
    /// Every selected strategy: the recommendation plus the alternatives.
    pub fn strategies(&self) -> Vec<&HedgingStrategy> {
        self.recommended_strategy
            .iter()
            .chain(self.alternative_strategies.iter())
            .collect()
    }
}

pub struct HedgingOptimizer {
    config: HedgingConfig,
}

impl HedgingOptimizer {
    pub fn new(config: HedgingConfig) -> Self {
        Self { config }
    }

    /// Derive needs from the risk report and optimize a strategy for each.
    ///
    /// A portfolio with nothing worth hedging yields an empty
    /// recommendation rather than an error; an empty instrument catalogue
    /// is a configuration error.
    pub fn generate_hedging_strategies(
        &self,
        user_id: &str,
        report: &CurrencyRiskReport,
    ) -> Result<HedgingRecommendation, EngineError> {
        if self.config.instruments.is_empty() {
            return Err(EngineError::Config(
                "hedging instrument catalogue is empty".to_string(),
            ));
        }

        let hedging_needs = needs::derive_needs(report, self.config.min_exposure_share);
        debug!(needs = hedging_needs.len(), "hedging needs derived");

        let mut budget = IterationBudget::new(self.config.max_iterations);
        let mut strategies: Vec<HedgingStrategy> = hedging_needs
            .iter()
            .filter_map(|need| {
                optimizer::optimize_need(
                    need,
                    &self.config.instruments,
                    &report.stress_results,
                    &mut budget,
                )
            })
            .collect();

        // Best normalized benefit leads; the rest stay as alternatives.
        strategies.sort_by(|a, b| b.normalized_benefit().total_cmp(&a.normalized_benefit()));
        let mut iter = strategies.into_iter();
        let recommended_strategy = iter.next();
        let alternative_strategies: Vec<HedgingStrategy> = iter.collect();

        let all: Vec<HedgingStrategy> = recommended_strategy
            .iter()
            .cloned()
            .chain(alternative_strategies.iter().cloned())
            .collect();
        let requires_isda = all.iter().any(|s| {
            self.config
                .instruments
                .iter()
                .any(|spec| spec.kind == s.instrument && spec.requires_isda)
        });

        let total_cost: f64 = all.iter().map(|s| s.cost).sum();
        let hedged_exposure: f64 = all.iter().map(|s| s.exposure).sum();
        let (expected_effectiveness, risk_reduction) = if hedged_exposure > 0.0 {
            (
                all.iter().map(|s| s.effectiveness * s.exposure).sum::<f64>() / hedged_exposure,
                all.iter().map(|s| s.risk_reduction() * s.exposure).sum::<f64>() / hedged_exposure,
            )
        } else {
            (0.0, 0.0)
        };

        info!(
            user_id,
            strategies = all.len(),
            total_cost = format!("{total_cost:.0}"),
            risk_reduction = format!("{risk_reduction:.2}"),
            "hedging recommendation assembled"
        );

        Ok(HedgingRecommendation {
            user_id: user_id.to_string(),
            generated_at: Utc::now(),
            hedging_needs,
            implementation_plan: plan::build_plan(&all, requires_isda),
            rebalance_schedule: plan::build_schedule(&all),
            recommended_strategy,
            alternative_strategies,
            total_cost,
            expected_effectiveness,
            risk_reduction,
        })
    }
}
