//! Risk report invariants across portfolio shapes.

use approx::assert_relative_eq;
use risk_engine::{ConcentrationLevel, MarketView, RiskEngine, RiskLevel, VarMethod};
use rstest::*;
use services_common::{AccountSnapshot, AccountType, RiskConfig};

#[fixture]
fn engine() -> RiskEngine {
    RiskEngine::new(RiskConfig::default())
}

#[fixture]
fn market() -> MarketView {
    let mut market = MarketView::new("USD");
    market.set_rate("EUR", 1.09);
    market.set_rate("GBP", 1.27);
    market.set_rate("JPY", 0.0068);
    market.set_rate("CHF", 1.12);
    // Daily returns with enough spread and length for all three VaR methods.
    for (currency, scale) in [("EUR", 0.006), ("GBP", 0.008), ("JPY", 0.011), ("CHF", 0.005)] {
        let series: Vec<f64> = (0..90)
            .map(|i| scale * (((i * 7 + 3) % 11) as f64 - 5.0) / 5.0)
            .collect();
        market.set_returns(currency, series);
    }
    market
}

fn accounts(entries: &[(&str, f64)]) -> Vec<AccountSnapshot> {
    entries
        .iter()
        .map(|(currency, balance)| AccountSnapshot {
            currency: currency.to_string(),
            balance: *balance,
            account_type: AccountType::Checking,
        })
        .collect()
}

#[rstest]
#[case::two_currencies(&[("EUR", 50_000.0), ("GBP", 30_000.0)])]
#[case::four_currencies(&[
    ("EUR", 30_000.0),
    ("GBP", 25_000.0),
    ("JPY", 4_000_000.0),
    ("CHF", 20_000.0),
])]
#[case::with_base(&[("USD", 40_000.0), ("EUR", 35_000.0), ("GBP", 25_000.0)])]
fn shares_sum_to_one_and_score_is_bounded(
    engine: RiskEngine,
    market: MarketView,
    #[case] entries: &[(&str, f64)],
) {
    let report = engine
        .calculate_currency_risk("user-1", &accounts(entries), &market)
        .unwrap();

    let share_sum: f64 = report.exposures.iter().map(|e| e.share).sum();
    assert_relative_eq!(share_sum, 1.0, epsilon = 1e-9);
    assert!(report.risk_score >= 0.0 && report.risk_score <= 100.0);
    assert!(report.gross_exposure > 0.0);
}

#[rstest]
#[case::balanced(&[("EUR", 50_000.0), ("GBP", 30_000.0)])]
#[case::lopsided(&[("EUR", 200_000.0), ("JPY", 500_000.0)])]
fn tail_orderings_hold_everywhere(
    engine: RiskEngine,
    market: MarketView,
    #[case] entries: &[(&str, f64)],
) {
    let report = engine
        .calculate_currency_risk("user-1", &accounts(entries), &market)
        .unwrap();

    for method in [VarMethod::Historical, VarMethod::Parametric, VarMethod::MonteCarlo] {
        let mut estimates: Vec<_> = report
            .var_estimates
            .iter()
            .filter(|e| e.method == method)
            .collect();
        assert_eq!(estimates.len(), 2, "{method}: missing a confidence level");
        estimates.sort_by(|a, b| a.confidence.total_cmp(&b.confidence));

        assert!(
            estimates[1].value >= estimates[0].value,
            "{method}: deeper confidence must not shrink VaR"
        );
        for estimate in estimates {
            assert!(estimate.value >= 0.0);
            assert!(estimate.expected_shortfall >= estimate.value, "{method}");
        }
    }
}

#[rstest]
fn eur_half_concentration_scenario(engine: RiskEngine, market: MarketView) {
    // EUR at ~50% of the portfolio: concentration must come out at least
    // high and carry a diversification recommendation.
    let report = engine
        .calculate_currency_risk(
            "user-1",
            &accounts(&[("EUR", 46_000.0), ("GBP", 20_000.0), ("USD", 25_000.0)]),
            &market,
        )
        .unwrap();

    assert!(report.concentration.level >= ConcentrationLevel::High);
    assert_eq!(report.concentration.dominant_currency.as_deref(), Some("EUR"));
    assert!(
        report
            .recommendations
            .iter()
            .any(|r| r.priority >= RiskLevel::High && r.description.contains("EUR")),
        "expected a high-priority EUR recommendation, got {:?}",
        report.recommendations
    );
}

#[rstest]
fn top_heavy_three_currency_portfolio_flags_concentration(
    engine: RiskEngine,
    market: MarketView,
) {
    // 150k EUR / 90k GBP / 60k JPY account balances: EUR carries well over
    // half of the base-currency exposure.
    let report = engine
        .calculate_currency_risk(
            "user-1",
            &accounts(&[("EUR", 150_000.0), ("GBP", 90_000.0), ("JPY", 60_000.0)]),
            &market,
        )
        .unwrap();

    assert!(report.concentration.level >= ConcentrationLevel::High);
    assert_eq!(report.concentration.dominant_currency.as_deref(), Some("EUR"));
    assert!(report.concentration.max_share > 0.5);
    assert!(
        report
            .recommendations
            .iter()
            .any(|r| r.priority >= RiskLevel::High && r.description.contains("EUR"))
    );
}

#[rstest]
fn monte_carlo_reports_are_reproducible(engine: RiskEngine, market: MarketView) {
    let entries = [("EUR", 50_000.0), ("GBP", 30_000.0)];
    let first = engine
        .calculate_currency_risk("user-1", &accounts(&entries), &market)
        .unwrap();
    let second = engine
        .calculate_currency_risk("user-1", &accounts(&entries), &market)
        .unwrap();

    let mc = |report: &risk_engine::CurrencyRiskReport| -> Vec<f64> {
        report
            .var_estimates
            .iter()
            .filter(|e| e.method == VarMethod::MonteCarlo)
            .map(|e| e.value)
            .collect()
    };
    assert_eq!(mc(&first), mc(&second));
}

proptest::proptest! {
    /// Historical VaR never exceeds its expected shortfall and never goes
    /// negative, whatever the return sample looks like.
    #[test]
    fn historical_tail_ordering_holds(
        returns in proptest::collection::vec(-0.2f64..0.2, 2..200),
        gross in 1_000.0f64..10_000_000.0,
    ) {
        if let Some(estimate) = risk_engine::var::historical(&returns, gross, 0.95) {
            proptest::prop_assert!(estimate.value >= 0.0);
            proptest::prop_assert!(estimate.expected_shortfall >= estimate.value);
            proptest::prop_assert!(estimate.value <= 0.2 * gross + 1e-6);
        }
    }
}
