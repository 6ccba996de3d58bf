//! Validation invariants over generated inputs.

use approx::assert_relative_eq;
use chrono::Utc;
use proptest::prelude::*;
use rate_validator::RateValidator;
use rstest::*;
use services_common::{CurrencyPair, RawRate, ValidationConfig};

fn quote(rate: f64) -> RawRate {
    RawRate {
        pair: CurrencyPair::new("USD", "EUR"),
        rate,
        bid: None,
        ask: None,
        provider: "prop-provider".to_string(),
        fetched_at: Utc::now(),
    }
}

#[fixture]
fn validator() -> RateValidator {
    RateValidator::new(ValidationConfig::default())
}

#[rstest]
#[case(1e-6)]
#[case(0.92)]
#[case(147.25)]
#[case(1e6)]
fn fresh_positive_rates_pass(mut validator: RateValidator, #[case] rate: f64) {
    let result = validator.validate_single_rate(&quote(rate));
    assert!(result.is_valid, "{rate}: {:?}", result.errors);
    // Fresh, spreadless, unremarkable: nothing to penalize.
    assert_relative_eq!(result.quality_score, 100.0);
}

#[rstest]
fn warm_history_leaves_steady_rates_unflagged(mut validator: RateValidator) {
    let pair = CurrencyPair::new("USD", "EUR");
    for i in 0..30 {
        validator.record_rate(&pair, 0.92 + 0.0005 * f64::from(i % 3));
    }
    let result = validator.validate_single_rate(&quote(0.9205));
    assert!(result.is_valid);
    assert!(result.anomaly_score < 3.0);
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
}

proptest! {
    #[test]
    fn quality_score_is_always_bounded(rate in 1e-9f64..1e9) {
        let mut validator = RateValidator::new(ValidationConfig::default());
        let result = validator.validate_single_rate(&quote(rate));
        prop_assert!((0.0..=100.0).contains(&result.quality_score));
        prop_assert!(result.anomaly_score >= 0.0);
    }

    #[test]
    fn nonpositive_and_nonfinite_rates_never_pass(
        rate in prop_oneof![
            Just(0.0),
            Just(f64::NAN),
            Just(f64::INFINITY),
            -1e9f64..0.0,
        ]
    ) {
        let mut validator = RateValidator::new(ValidationConfig::default());
        let result = validator.validate_single_rate(&quote(rate));
        prop_assert!(!result.is_valid);
        prop_assert!(!result.errors.is_empty());
    }

    #[test]
    fn validation_is_idempotent_against_fixed_history(
        rate in 0.5f64..2.0,
        history in proptest::collection::vec(0.8f64..1.2, 0..40),
    ) {
        let mut validator = RateValidator::new(ValidationConfig::default());
        let pair = CurrencyPair::new("USD", "EUR");
        for observed in history {
            validator.record_rate(&pair, observed);
        }

        let first = validator.validate_single_rate(&quote(rate));
        let second = validator.validate_single_rate(&quote(rate));
        prop_assert_eq!(first.is_valid, second.is_valid);
        prop_assert_eq!(first.quality_score, second.quality_score);
        prop_assert_eq!(first.anomaly_score, second.anomaly_score);
    }
}
