use farm_core::{
    sleep_cancellable, with_retry, ProxyConfig, ProxyRotator, RetryAction, RetryController,
    RetryMode, RetryPolicy,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn policy(max_attempts: u32, rotation: bool) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        delay_seconds: 1,
        farming_wait_seconds: 60,
        proxy_rotation: rotation,
        max_rotations: 3,
    }
}

#[test]
fn registration_without_rotation_abandons_after_max_attempts() {
    let mut ctl = RetryController::new(policy(3, false), RetryMode::Registration);

    assert_eq!(
        ctl.on_failure(),
        RetryAction::RetryAfter(Duration::from_secs(1))
    );
    assert_eq!(
        ctl.on_failure(),
        RetryAction::RetryAfter(Duration::from_secs(1))
    );
    // Third consecutive failure exhausts the account: exactly 3 attempts,
    // 2 inter-attempt delays.
    assert_eq!(ctl.on_failure(), RetryAction::Abandon);
}

#[test]
fn registration_with_rotation_cycles_then_abandons() {
    let mut ctl = RetryController::new(policy(2, true), RetryMode::Registration);

    assert!(matches!(ctl.on_failure(), RetryAction::RetryAfter(_)));
    assert_eq!(ctl.on_failure(), RetryAction::RotateProxy);
    assert_eq!(ctl.rotations(), 1);

    // Attempt counter resets per proxy.
    assert_eq!(ctl.attempt(), 1);

    assert!(matches!(ctl.on_failure(), RetryAction::RetryAfter(_)));
    assert_eq!(ctl.on_failure(), RetryAction::RotateProxy);

    assert!(matches!(ctl.on_failure(), RetryAction::RetryAfter(_)));
    assert_eq!(ctl.on_failure(), RetryAction::Abandon);
}

#[test]
fn farming_never_abandons() {
    let mut ctl = RetryController::new(policy(2, true), RetryMode::Farming);

    for _ in 0..50 {
        let exhausted = loop {
            match ctl.on_failure() {
                RetryAction::RetryAfter(_) => continue,
                other => break other,
            }
        };
        assert_eq!(
            exhausted,
            RetryAction::FarmingWait {
                wait: Duration::from_secs(60),
                rotate: true,
            }
        );
    }
}

#[test]
fn farming_without_rotation_keeps_current_proxy() {
    let mut ctl = RetryController::new(policy(1, false), RetryMode::Farming);

    match ctl.on_failure() {
        RetryAction::FarmingWait { rotate, .. } => assert!(!rotate),
        other => panic!("expected FarmingWait, got {:?}", other),
    }
}

#[test]
fn success_resets_all_counters() {
    let mut ctl = RetryController::new(policy(2, true), RetryMode::Registration);

    let _ = ctl.on_failure();
    let _ = ctl.on_failure();
    assert_eq!(ctl.rotations(), 1);

    ctl.on_success();
    assert_eq!(ctl.attempt(), 1);
    assert_eq!(ctl.rotations(), 0);
}

#[test]
fn rotation_action_produces_a_fresh_proxy() {
    let pool: Vec<ProxyConfig> = (0..4)
        .map(|i| ProxyConfig {
            url: format!("http://10.1.1.{}:3128", i + 1),
            username: None,
            password: None,
        })
        .collect();

    let current = ProxyRotator::assign(&pool, 0);
    let failing_proxy = current.clone().unwrap();
    let mut rotator = ProxyRotator::new(pool, current);
    let mut ctl = RetryController::new(policy(3, true), RetryMode::Registration);

    // Exhaust max_attempts against the first proxy.
    assert!(matches!(ctl.on_failure(), RetryAction::RetryAfter(_)));
    assert!(matches!(ctl.on_failure(), RetryAction::RetryAfter(_)));
    assert_eq!(ctl.on_failure(), RetryAction::RotateProxy);

    let next = rotator.next().unwrap();
    assert_ne!(next.url, failing_proxy.url);
}

#[tokio::test]
async fn with_retry_succeeds_after_failures() {
    let counter = Arc::new(AtomicUsize::new(0));

    let result: anyhow::Result<&str> =
        with_retry(3, Duration::from_millis(10), "test_op", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) + 1 < 3 {
                    Err(anyhow::anyhow!("temporary error"))
                } else {
                    Ok("success")
                }
            }
        })
        .await;

    assert!(result.is_ok());
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn with_retry_exhausts_and_reports() {
    let counter = Arc::new(AtomicUsize::new(0));

    let result: anyhow::Result<&str> =
        with_retry(3, Duration::from_millis(10), "test_op", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("permanent error"))
            }
        })
        .await;

    assert!(result.is_err());
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn with_retry_sleeps_between_attempts() {
    let start = tokio::time::Instant::now();

    let _: anyhow::Result<&str> = with_retry(3, Duration::from_millis(50), "test_op", || async {
        Err(anyhow::anyhow!("always fails"))
    })
    .await;

    // Two inter-attempt delays for three attempts.
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn cancellable_sleep_wakes_on_cancel() {
    let token = CancellationToken::new();
    token.cancel();

    let start = tokio::time::Instant::now();
    let completed = sleep_cancellable(Duration::from_secs(30), &token).await;

    assert!(!completed);
    assert!(start.elapsed() < Duration::from_secs(1));
}
