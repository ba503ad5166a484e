use quorum_wait::metrics::keys;
use quorum_wait::poll::probe_fn;
use quorum_wait::{bounded_poll, Attempt, MetricSample, MetricStore, PollSettings, SimulatedCluster, WaitError};
use std::time::Duration;
use tokio::time::Instant;

/// Poll `lastExecutedSeqNum` on member 0 until it is registered.
async fn poll_registered(sim: &SimulatedCluster, timeout: Duration, interval: Duration) -> Result<u64, WaitError> {
    let probe = probe_fn("seq_num_registered", move || async move {
        Ok(match sim.fetch_integer(0, &keys::LAST_EXECUTED_SEQ_NUM).await? {
            Some(value) => Attempt::Ready(value),
            None => Attempt::pending(),
        })
    });
    bounded_poll(&probe, PollSettings::new(timeout, interval)).await
}

#[tokio::test(start_paused = true)]
async fn test_absences_are_retried_until_value() {
    let sim = SimulatedCluster::new();
    sim.script(
        0,
        keys::LAST_EXECUTED_SEQ_NUM,
        [MetricSample::Absent, MetricSample::Absent, MetricSample::Value(7.into())],
    );

    let started = Instant::now();
    let value = poll_registered(&sim, Duration::from_secs(5), Duration::from_millis(100))
        .await
        .unwrap();

    assert_eq!(value, 7);
    assert!(started.elapsed() <= Duration::from_millis(300));
    assert_eq!(sim.fetch_count(0), 3);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_absence_times_out() {
    let sim = SimulatedCluster::new();
    let started = Instant::now();
    let err = poll_registered(&sim, Duration::from_secs(1), Duration::from_millis(200))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(started.elapsed() >= Duration::from_secs(1));
    let attempts = sim.fetch_count(0);
    assert!((3..=6).contains(&attempts), "observed {} attempts", attempts);
    assert_eq!(err.diagnostics().unwrap().attempts as u64, attempts);
}

#[tokio::test(start_paused = true)]
async fn test_slow_member_attempts_are_abandoned() {
    let sim = SimulatedCluster::new();
    sim.set(0, keys::LAST_EXECUTED_SEQ_NUM, 1);
    sim.set_latency(0, Duration::from_secs(10));

    let err = poll_registered(&sim, Duration::from_secs(1), Duration::from_millis(250))
        .await
        .unwrap_err();

    // One fetch per attempt, each dropped at the interval
    assert_eq!(err.diagnostics().unwrap().attempts, 4);
    assert_eq!(sim.fetch_count(0), 4);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_member_is_not_retried() {
    let sim = SimulatedCluster::new();
    sim.disconnect(0, "connection refused");

    let err = poll_registered(&sim, Duration::from_secs(5), Duration::from_millis(100))
        .await
        .unwrap_err();

    assert!(matches!(err, WaitError::UnreachableMember { member: 0, .. }));
    assert_eq!(sim.fetch_count(0), 1);
}

#[test_log::test(tokio::test)]
async fn test_ready_value_returns_without_sleeping() {
    let sim = SimulatedCluster::new();
    sim.set(0, keys::LAST_EXECUTED_SEQ_NUM, 11);
    let value = tokio_test::assert_ok!(poll_registered(&sim, Duration::from_secs(5), Duration::from_secs(1)).await);
    assert_eq!(value, 11);
}
