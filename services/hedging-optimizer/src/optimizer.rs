//! Instrument selection by bounded grid search.
//!
//! For each hedging need, feasible instrument and hedge-ratio combinations
//! are scored by net benefit: the volatility-scaled loss the hedge is
//! expected to avoid, minus its carry cost. The search is bounded by a
//! shared iteration budget so a large catalogue cannot run away.

use risk_engine::StressResult;
use serde::{Deserialize, Serialize};
use services_common::{InstrumentKind, InstrumentSpec, LiquidityTier};
use tracing::warn;

use crate::needs::{HedgingNeed, Urgency};

/// Hedge ratio grid, coarse on purpose; the recommended ratio caps it.
const RATIO_STEPS: usize = 10;

/// How one scenario plays out with the hedge in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub scenario: String,
    /// Portfolio P&L without the hedge, base currency
    pub unhedged_pnl: f64,
    /// Same scenario with the hedged currency's leg damped
    pub hedged_pnl: f64,
    /// Fraction of the unhedged move recovered, in [0, 1]
    pub protection: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostBenefitAnalysis {
    /// Carry cost of the hedge, base currency
    pub total_cost: f64,
    /// Expected avoided loss, base currency
    pub total_benefit: f64,
    pub benefit_cost_ratio: f64,
    pub net_benefit: f64,
    pub scenario_outcomes: Vec<ScenarioOutcome>,
}

/// One candidate hedge for one currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgingStrategy {
    pub instrument: InstrumentKind,
    pub currency: String,
    /// Absolute exposure being hedged, base currency
    pub exposure: f64,
    /// Fraction of the exposure covered, in (0, 1]
    pub hedge_ratio: f64,
    pub time_horizon_days: u32,
    /// Carry cost, base currency
    pub cost: f64,
    /// Instrument effectiveness in [0, 1]
    pub effectiveness: f64,
    pub liquidity: LiquidityTier,
    pub cost_benefit: CostBenefitAnalysis,
}

impl HedgingStrategy {
    /// Fraction of the currency's risk removed.
    pub fn risk_reduction(&self) -> f64 {
        self.hedge_ratio * self.effectiveness
    }

    /// Benefit per unit of exposure, for cross-currency comparison.
    pub fn normalized_benefit(&self) -> f64 {
        if self.exposure > 0.0 {
            self.cost_benefit.net_benefit / self.exposure
        } else {
            0.0
        }
    }
}

/// Mutable iteration budget shared across one optimizer call.
pub struct IterationBudget {
    remaining: usize,
}

impl IterationBudget {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            remaining: max_iterations,
        }
    }

    fn consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    pub fn exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Best feasible strategy for one need, or `None` when nothing in the
/// catalogue fits (or the budget ran dry before a candidate was scored).
pub fn optimize_need(
    need: &HedgingNeed,
    catalogue: &[InstrumentSpec],
    stress_results: &[StressResult],
    budget: &mut IterationBudget,
) -> Option<HedgingStrategy> {
    let mut best: Option<HedgingStrategy> = None;

    for spec in catalogue {
        if !liquidity_suits(spec.liquidity, need.urgency) {
            continue;
        }
        if spec.max_tenor_days < need.time_horizon_days {
            continue;
        }
        for step in 1..=RATIO_STEPS {
            if !budget.consume() {
                warn!(
                    currency = %need.currency,
                    "iteration budget exhausted mid-search"
                );
                return best;
            }
            let ratio =
                need.recommended_hedge_ratio * (step as f64 / RATIO_STEPS as f64);
            let notional = need.exposure * ratio;
            if notional < spec.min_notional {
                continue;
            }

            let candidate = build_strategy(need, spec, ratio, stress_results);
            let better = match &best {
                None => true,
                Some(current) => {
                    candidate.cost_benefit.net_benefit > current.cost_benefit.net_benefit
                }
            };
            if better {
                best = Some(candidate);
            }
        }
    }
    best
}

/// An immediate need can only be met in a deep market; a near-term need
/// tolerates medium liquidity.
fn liquidity_suits(liquidity: LiquidityTier, urgency: Urgency) -> bool {
    match urgency {
        Urgency::Immediate => liquidity == LiquidityTier::High,
        Urgency::Soon => liquidity >= LiquidityTier::Medium,
        Urgency::Routine => true,
    }
}

fn build_strategy(
    need: &HedgingNeed,
    spec: &InstrumentSpec,
    ratio: f64,
    stress_results: &[StressResult],
) -> HedgingStrategy {
    let notional = need.exposure * ratio;
    let cost = notional * spec.cost_bps / 10_000.0;
    // Expected avoided loss: the covered, effective share of a one-sigma
    // annual move on the exposure.
    let benefit = ratio * spec.effectiveness * need.exposure * need.volatility;
    let risk_reduction = ratio * spec.effectiveness;

    // The hedge only touches this currency's leg; other legs of a
    // multi-currency scenario pass through untouched.
    let scenario_outcomes = stress_results
        .iter()
        .filter_map(|r| {
            let own_leg = *r.contributions.get(&need.currency)?;
            let unhedged = r.pnl;
            let hedged = unhedged - own_leg * risk_reduction;
            let protection = if unhedged.abs() > f64::EPSILON {
                ((hedged - unhedged) / unhedged.abs()).clamp(0.0, 1.0)
            } else {
                0.0
            };
            Some(ScenarioOutcome {
                scenario: r.scenario.clone(),
                unhedged_pnl: unhedged,
                hedged_pnl: hedged,
                protection,
            })
        })
        .collect();

    HedgingStrategy {
        instrument: spec.kind,
        currency: need.currency.clone(),
        exposure: need.exposure,
        hedge_ratio: ratio,
        time_horizon_days: need.time_horizon_days,
        cost,
        effectiveness: spec.effectiveness,
        liquidity: spec.liquidity,
        cost_benefit: CostBenefitAnalysis {
            total_cost: cost,
            total_benefit: benefit,
            benefit_cost_ratio: if cost > 0.0 { benefit / cost } else { 0.0 },
            net_benefit: benefit - cost,
            scenario_outcomes,
        },
    }
}
