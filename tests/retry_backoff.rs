use judgebench::config;
use judgebench::judge::{Backoff, RetryPolicy, Step};
use std::time::Duration;

fn no_jitter() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 4,
        initial_delay: Duration::from_millis(100),
        backoff_factor: 2.0,
        max_delay: Duration::from_millis(300),
        jitter_fraction: 0.0,
    }
}

#[test]
fn delays_grow_then_cap() {
    let p = no_jitter();
    assert_eq!(p.delay_for(0, None), Duration::from_millis(100));
    assert_eq!(p.delay_for(1, None), Duration::from_millis(200));
    assert_eq!(p.delay_for(2, None), Duration::from_millis(300));
    assert_eq!(p.delay_for(8, None), Duration::from_millis(300));
}

#[test]
fn retry_after_hint_is_bounded() {
    let p = no_jitter();
    assert_eq!(p.delay_for(0, Some(Duration::from_millis(50))), Duration::from_millis(50));
    assert_eq!(p.delay_for(0, Some(Duration::from_secs(60))), Duration::from_millis(300));
}

#[test]
fn gives_up_after_max_attempts() {
    let mut b = Backoff::new(no_jitter());
    assert_eq!(b.on_failure(true, None), Step::Retry(Duration::from_millis(100)));
    assert_eq!(b.on_failure(true, None), Step::Retry(Duration::from_millis(200)));
    assert_eq!(b.on_failure(true, None), Step::Retry(Duration::from_millis(300)));
    assert_eq!(b.on_failure(true, None), Step::GiveUp);
    assert_eq!(b.attempts(), 4);
}

#[test]
fn permanent_failure_gives_up_immediately() {
    let mut b = Backoff::new(no_jitter());
    assert_eq!(b.on_failure(false, None), Step::GiveUp);
    assert_eq!(b.attempts(), 1);
}

#[test]
fn policy_from_config_sanitizes_values() {
    let cfg = config::Retry {
        max_attempts: 0,
        initial_delay_ms: 10,
        backoff_factor: 0.5,
        max_delay_ms: 1_000,
        jitter_fraction: 3.0,
    };
    let p = RetryPolicy::from(&cfg);
    assert_eq!(p.max_attempts, 1);
    assert_eq!(p.backoff_factor, 1.0);
    assert_eq!(p.jitter_fraction, 1.0);

    let mut b = Backoff::new(p);
    assert_eq!(b.on_failure(true, None), Step::GiveUp);
}

#[test]
fn jittered_delay_stays_within_fraction() {
    let p = RetryPolicy {
        jitter_fraction: 0.2,
        ..no_jitter()
    };
    for retry in 0..6 {
        let base = no_jitter().delay_for(retry, None).as_millis() as f64;
        let got = p.delay_for(retry, None).as_millis() as f64;
        assert!(got >= base * 0.8 - 1.0 && got <= base * 1.2 + 1.0, "retry {retry}: {got} vs {base}");
    }
}

#[test]
fn immediate_policy_never_sleeps() {
    let mut b = Backoff::new(RetryPolicy::immediate(3));
    assert_eq!(b.on_failure(true, Some(Duration::from_secs(5))), Step::Retry(Duration::ZERO));
    assert_eq!(b.on_failure(true, None), Step::Retry(Duration::ZERO));
    assert_eq!(b.on_failure(true, None), Step::GiveUp);
}
