//! Implementation plan and rebalance schedule generation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::optimizer::HedgingStrategy;

const SETUP_BASE_DAYS: u32 = 5;
const ISDA_EXTRA_DAYS: u32 = 10;
const EXECUTION_DAYS: u32 = 2;
const MONITORING_SETUP_DAYS: u32 = 1;

const MIN_REBALANCE_DAYS: i64 = 7;
const MAX_REBALANCE_DAYS: i64 = 90;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanPhase {
    pub name: String,
    pub tasks: Vec<String>,
    pub duration_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementationPlan {
    pub phases: Vec<PlanPhase>,
    /// Sum of phase durations
    pub total_days: u32,
    /// Contractual groundwork implied by the chosen instruments
    pub prerequisites: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceSchedule {
    pub frequency_days: i64,
    pub next_rebalance: DateTime<Utc>,
    pub triggers: Vec<String>,
}

/// Fixed three-phase template filled in from the chosen strategies.
pub fn build_plan(strategies: &[HedgingStrategy], requires_isda: bool) -> ImplementationPlan {
    if strategies.is_empty() {
        return ImplementationPlan {
            phases: Vec::new(),
            total_days: 0,
            prerequisites: Vec::new(),
        };
    }

    let mut setup_tasks = vec![
        "confirm exposures against latest account snapshots".to_string(),
        "verify counterparty credit lines".to_string(),
    ];
    let mut prerequisites = Vec::new();
    let mut setup_days = SETUP_BASE_DAYS;
    if requires_isda {
        setup_tasks.push("execute ISDA master agreement with hedging counterparty".to_string());
        prerequisites.push("ISDA master agreement".to_string());
        setup_days += ISDA_EXTRA_DAYS;
    }

    let execution_tasks: Vec<String> = strategies
        .iter()
        .map(|s| {
            format!(
                "place {} covering {:.0}% of {} exposure (notional {:.0})",
                s.instrument,
                s.hedge_ratio * 100.0,
                s.currency,
                s.exposure * s.hedge_ratio
            )
        })
        .collect();

    let phases = vec![
        PlanPhase {
            name: "setup".to_string(),
            tasks: setup_tasks,
            duration_days: setup_days,
        },
        PlanPhase {
            name: "execution".to_string(),
            tasks: execution_tasks,
            duration_days: EXECUTION_DAYS,
        },
        PlanPhase {
            name: "monitoring".to_string(),
            tasks: vec![
                "register rate alerts on hedged pairs".to_string(),
                "schedule periodic effectiveness review".to_string(),
            ],
            duration_days: MONITORING_SETUP_DAYS,
        },
    ];
    let total_days = phases.iter().map(|p| p.duration_days).sum();

    ImplementationPlan {
        phases,
        total_days,
        prerequisites,
    }
}

/// Rebalance cadence from the shortest horizon in play: a quarter of the
/// horizon, clamped to a weekly/quarterly band.
pub fn build_schedule(strategies: &[HedgingStrategy]) -> RebalanceSchedule {
    let horizon = strategies
        .iter()
        .map(|s| i64::from(s.time_horizon_days))
        .min()
        .unwrap_or(MAX_REBALANCE_DAYS * 4);
    let frequency_days = (horizon / 4).clamp(MIN_REBALANCE_DAYS, MAX_REBALANCE_DAYS);

    RebalanceSchedule {
        frequency_days,
        next_rebalance: Utc::now() + Duration::days(frequency_days),
        triggers: vec![
            "exposure drift beyond 10% of hedged notional".to_string(),
            "volatility regime change on a hedged currency".to_string(),
            "rate alert fired on a hedged pair".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::CostBenefitAnalysis;
    use services_common::{InstrumentKind, LiquidityTier};

    fn strategy(instrument: InstrumentKind, horizon: u32) -> HedgingStrategy {
        HedgingStrategy {
            instrument,
            currency: "EUR".to_string(),
            exposure: 100_000.0,
            hedge_ratio: 0.8,
            time_horizon_days: horizon,
            cost: 200.0,
            effectiveness: 0.95,
            liquidity: LiquidityTier::High,
            cost_benefit: CostBenefitAnalysis {
                total_cost: 200.0,
                total_benefit: 9_000.0,
                benefit_cost_ratio: 45.0,
                net_benefit: 8_800.0,
                scenario_outcomes: Vec::new(),
            },
        }
    }

    #[test]
    fn isda_extends_setup_and_adds_prerequisite() {
        let strategies = [strategy(InstrumentKind::Option, 180)];
        let without = build_plan(&strategies, false);
        let with = build_plan(&strategies, true);

        assert_eq!(with.prerequisites, vec!["ISDA master agreement".to_string()]);
        assert!(without.prerequisites.is_empty());
        assert_eq!(with.total_days, without.total_days + ISDA_EXTRA_DAYS);
    }

    #[test]
    fn plan_has_one_execution_task_per_strategy() {
        let strategies = [
            strategy(InstrumentKind::Forward, 180),
            strategy(InstrumentKind::Swap, 365),
        ];
        let plan = build_plan(&strategies, false);
        let execution = plan.phases.iter().find(|p| p.name == "execution").unwrap();
        assert_eq!(execution.tasks.len(), 2);
    }

    #[test]
    fn empty_strategies_make_an_empty_plan() {
        let plan = build_plan(&[], false);
        assert!(plan.phases.is_empty());
        assert_eq!(plan.total_days, 0);
    }

    #[test]
    fn schedule_follows_shortest_horizon() {
        let strategies = [
            strategy(InstrumentKind::Forward, 90),
            strategy(InstrumentKind::Swap, 365),
        ];
        let schedule = build_schedule(&strategies);
        assert_eq!(schedule.frequency_days, 22);
        assert!(schedule.next_rebalance > Utc::now());
        assert!(!schedule.triggers.is_empty());
    }

    #[test]
    fn schedule_frequency_is_clamped() {
        let short = build_schedule(&[strategy(InstrumentKind::Forward, 10)]);
        assert_eq!(short.frequency_days, MIN_REBALANCE_DAYS);

        let long = build_schedule(&[strategy(InstrumentKind::Swap, 3650)]);
        assert_eq!(long.frequency_days, MAX_REBALANCE_DAYS);
    }
}
