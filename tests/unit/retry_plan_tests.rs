use std::time::Duration;

use rand::SeedableRng;

use resilient_request::retry::{JitterStrategy, MAX_RETRY_BUDGET, RetryPlan};

#[test]
fn default_plan_doubles_from_one_second() {
    let plan = RetryPlan::default_plan();
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let delays: Vec<Duration> = (0..plan.max_retries)
        .map(|attempt| plan.delay_for_attempt(attempt, &mut rng))
        .collect();
    assert_eq!(
        delays,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4)
        ]
    );
}

#[test]
fn decorrelated_jitter_stays_within_half_and_one_and_a_half() {
    let plan = RetryPlan::new(5, Duration::from_millis(100), 2.0, JitterStrategy::Decorrelated);
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let delay = plan.delay_for_attempt(2, &mut rng);
        assert!(delay >= Duration::from_millis(200));
        assert!(delay <= Duration::from_millis(600));
    }
}

#[test]
fn budget_override_keeps_the_curve() {
    let plan = RetryPlan::default_plan().with_max_retries(0);
    assert_eq!(plan.max_retries, 0);
    assert_eq!(plan.unit, Duration::from_secs(1));
    assert_eq!(plan.jitter, JitterStrategy::None);
}

#[test]
fn jitter_parses_case_insensitively() {
    assert_eq!("FULL".parse::<JitterStrategy>().unwrap(), JitterStrategy::Full);
    assert!("wobbly".parse::<JitterStrategy>().is_err());
}

#[test]
fn oversized_budget_override_is_clamped() {
    let plan = RetryPlan::default_plan().with_max_retries(u8::MAX);
    assert_eq!(plan.max_retries, MAX_RETRY_BUDGET);
}

#[test]
fn extreme_attempts_saturate_instead_of_panicking() {
    let plan = RetryPlan::new(u8::MAX, Duration::from_secs(3600), 2.0, JitterStrategy::Full);
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let delay = plan.delay_for_attempt(u8::MAX - 1, &mut rng);
    assert!(delay <= Duration::MAX);
    let plain = RetryPlan::new(u8::MAX, Duration::from_secs(3600), 2.0, JitterStrategy::None);
    assert_eq!(plain.delay_for_attempt(u8::MAX - 1, &mut rng), Duration::MAX);
}
