//! In-memory cluster
//!
//! A [`MetricStore`] and [`ProcessControl`] backed by a `DashMap`, used by
//! the scenario tests, the benches and the `simulate` command. Metrics can be
//! set directly or scripted as a sequence of samples (the last one repeats),
//! and members can be made silent (fetches never answer) or unreachable
//! (fetches fail).

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tokio::time;
use tracing::trace;

use crate::cluster::{MemberId, ProcessControl};
use crate::error::{Result, WaitError};
use crate::metrics::{MetricKey, MetricSample, MetricSnapshot, MetricStore, MetricValue};

#[derive(Debug, Default)]
struct MemberState {
    metrics: BTreeMap<MetricKey, VecDeque<MetricSample>>,
    running: bool,
    silent: bool,
    unreachable: Option<String>,
    latency: Duration,
    fetches: u64,
}

enum Access {
    Ready(Duration),
    Silent,
    Unreachable(String),
}

/// Scriptable stand-in for a running replica group.
#[derive(Debug, Default)]
pub struct SimulatedCluster {
    members: DashMap<MemberId, MemberState>,
}

impl SimulatedCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, member: MemberId, key: MetricKey, value: impl Into<MetricValue>) {
        self.script(member, key, [MetricSample::Value(value.into())]);
    }

    /// Unregister a metric; fetches report it absent again.
    pub fn clear(&self, member: MemberId, key: &MetricKey) {
        self.members.entry(member).or_default().metrics.remove(key);
    }

    /// Replace the metric with `samples`, served one per fetch. The last
    /// sample keeps being served once the others are used up.
    pub fn script(&self, member: MemberId, key: MetricKey, samples: impl IntoIterator<Item = MetricSample>) {
        let samples: VecDeque<MetricSample> = samples.into_iter().collect();
        let mut state = self.members.entry(member).or_default();
        if samples.is_empty() {
            state.metrics.remove(&key);
        } else {
            state.metrics.insert(key, samples);
        }
    }

    /// Add `by` to an integer metric (absent counts as 0) and return the new value.
    pub fn increment(&self, member: MemberId, key: MetricKey, by: u64) -> u64 {
        let mut state = self.members.entry(member).or_default();
        let current = state
            .metrics
            .get(&key)
            .and_then(|script| script.back())
            .and_then(|sample| sample.clone().value())
            .and_then(|value| value.as_integer())
            .unwrap_or(0);
        let next = current + by;
        state
            .metrics
            .insert(key, VecDeque::from([MetricSample::Value(MetricValue::Integer(next))]));
        next
    }

    /// Fetches to `member` stay pending until [`restore`](Self::restore).
    pub fn silence(&self, member: MemberId) {
        self.members.entry(member).or_default().silent = true;
    }

    pub fn restore(&self, member: MemberId) {
        let mut state = self.members.entry(member).or_default();
        state.silent = false;
        state.unreachable = None;
    }

    /// Fetches to `member` fail with [`WaitError::UnreachableMember`].
    pub fn disconnect(&self, member: MemberId, reason: impl Into<String>) {
        self.members.entry(member).or_default().unreachable = Some(reason.into());
    }

    /// Delay every fetch to `member`.
    pub fn set_latency(&self, member: MemberId, latency: Duration) {
        self.members.entry(member).or_default().latency = latency;
    }

    /// Fetches issued to `member` so far, answered or not.
    pub fn fetch_count(&self, member: MemberId) -> u64 {
        self.members.get(&member).map(|state| state.fetches).unwrap_or(0)
    }

    pub fn is_running(&self, member: MemberId) -> bool {
        self.members.get(&member).map(|state| state.running).unwrap_or(false)
    }

    fn access(&self, member: MemberId) -> Access {
        let mut state = self.members.entry(member).or_default();
        state.fetches += 1;
        if let Some(reason) = &state.unreachable {
            return Access::Unreachable(reason.clone());
        }
        if state.silent {
            return Access::Silent;
        }
        Access::Ready(state.latency)
    }

    async fn gate(&self, member: MemberId) -> Result<()> {
        match self.access(member) {
            Access::Unreachable(reason) => Err(WaitError::unreachable(member, reason)),
            Access::Silent => {
                trace!(member, "fetch to silent member");
                futures::future::pending::<()>().await;
                Ok(())
            }
            Access::Ready(latency) => {
                if !latency.is_zero() {
                    time::sleep(latency).await;
                }
                Ok(())
            }
        }
    }
}

fn advance(script: &mut VecDeque<MetricSample>) -> MetricSample {
    if script.len() > 1 {
        script.pop_front().unwrap_or(MetricSample::Absent)
    } else {
        script.front().cloned().unwrap_or(MetricSample::Absent)
    }
}

#[async_trait]
impl MetricStore for SimulatedCluster {
    async fn fetch(&self, member: MemberId, key: &MetricKey) -> Result<MetricSample> {
        self.gate(member).await?;
        let sample = self
            .members
            .get_mut(&member)
            .and_then(|mut state| state.metrics.get_mut(key).map(advance))
            .unwrap_or(MetricSample::Absent);
        Ok(sample)
    }

    async fn fetch_all(&self, member: MemberId) -> Result<MetricSnapshot> {
        self.gate(member).await?;
        let snapshot = match self.members.get_mut(&member) {
            Some(mut state) => state
                .metrics
                .iter_mut()
                .filter_map(|(key, script)| advance(script).value().map(|value| (key.clone(), value)))
                .collect(),
            None => MetricSnapshot::default(),
        };
        Ok(snapshot)
    }
}

#[async_trait]
impl ProcessControl for SimulatedCluster {
    async fn start(&self, member: MemberId) -> Result<()> {
        let mut state = self.members.entry(member).or_default();
        state.running = true;
        state.silent = false;
        Ok(())
    }

    /// A stopped member stops answering.
    async fn stop(&self, member: MemberId) -> Result<()> {
        let mut state = self.members.entry(member).or_default();
        state.running = false;
        state.silent = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::keys;

    #[tokio::test]
    async fn test_script_then_repeat_last() {
        let sim = SimulatedCluster::new();
        sim.script(
            0,
            keys::LAST_AGREED_VIEW,
            [MetricSample::Absent, MetricSample::Value(3.into())],
        );
        assert_eq!(sim.fetch(0, &keys::LAST_AGREED_VIEW).await.unwrap(), MetricSample::Absent);
        assert_eq!(sim.fetch_integer(0, &keys::LAST_AGREED_VIEW).await.unwrap(), Some(3));
        assert_eq!(sim.fetch_integer(0, &keys::LAST_AGREED_VIEW).await.unwrap(), Some(3));
        assert_eq!(sim.fetch_count(0), 3);
    }

    #[tokio::test]
    async fn test_unknown_metric_is_absent() {
        let sim = SimulatedCluster::new();
        assert_eq!(sim.fetch(5, &keys::SLOW_PATH_COUNT).await.unwrap(), MetricSample::Absent);
        sim.set(5, keys::SLOW_PATH_COUNT, 1);
        sim.clear(5, &keys::SLOW_PATH_COUNT);
        assert_eq!(sim.fetch(5, &keys::SLOW_PATH_COUNT).await.unwrap(), MetricSample::Absent);
    }

    #[tokio::test]
    async fn test_increment_and_snapshot() {
        let sim = SimulatedCluster::new();
        assert_eq!(sim.increment(1, keys::RECEIVED_STATE_TRANSFER_MSGS, 2), 2);
        assert_eq!(sim.increment(1, keys::RECEIVED_STATE_TRANSFER_MSGS, 1), 3);
        sim.set(1, keys::FETCHING_STATE, MetricValue::State(keys::NOT_FETCHING.into()));
        let snapshot = sim.fetch_all(1).await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot.get_local(&keys::RECEIVED_STATE_TRANSFER_MSGS),
            MetricSample::Value(MetricValue::Integer(3))
        );
    }

    #[tokio::test]
    async fn test_disconnected_member_fails_fetch() {
        let sim = SimulatedCluster::new();
        sim.disconnect(2, "connection refused");
        let err = sim.fetch(2, &keys::LAST_AGREED_VIEW).await.unwrap_err();
        assert!(matches!(err, WaitError::UnreachableMember { member: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_member_never_answers() {
        let sim = SimulatedCluster::new();
        sim.set(0, keys::LAST_AGREED_VIEW, 1);
        sim.start(0).await.unwrap();
        sim.stop(0).await.unwrap();
        let key = keys::LAST_AGREED_VIEW;
        let fetch = sim.fetch(0, &key);
        assert!(time::timeout(Duration::from_secs(10), fetch).await.is_err());
        sim.start(0).await.unwrap();
        assert_eq!(sim.fetch_integer(0, &keys::LAST_AGREED_VIEW).await.unwrap(), Some(1));
    }
}
