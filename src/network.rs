//! BFT Network
//!
//! Handles:
//! - Bundling the cluster sizing, metrics capability and replica set
//! - Process control on behalf of test orchestration
//! - Generic predicate waits
//!
//! The convergence protocols are implemented on [`BftNetwork`] in
//! [`crate::protocols`].

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cluster::{MemberId, ProcessControl, ReplicaSet};
use crate::config::{ClusterConfig, Config, NetworkLayout, WaitSettings};
use crate::error::Result;
use crate::metrics::{Expected, MetricKey, MetricStore};
use crate::poll::{bounded_poll, probe_fn, Attempt, PollSettings, Probe};

/// A replica group as seen by test orchestration code.
pub struct BftNetwork {
    config: ClusterConfig,
    metrics: Arc<dyn MetricStore>,
    replicas: ReplicaSet,
    waits: WaitSettings,
}

impl BftNetwork {
    pub fn new(
        config: ClusterConfig,
        layout: &NetworkLayout,
        metrics: Arc<dyn MetricStore>,
        control: Arc<dyn ProcessControl>,
    ) -> Result<Self> {
        info!(
            n = config.n(),
            f = config.f(),
            c = config.c(),
            ro_replicas = config.num_ro_replicas(),
            "creating BFT network"
        );
        Ok(Self {
            config,
            metrics,
            replicas: ReplicaSet::new(config, layout, control)?,
            waits: WaitSettings::default(),
        })
    }

    pub fn from_config(config: &Config, metrics: Arc<dyn MetricStore>, control: Arc<dyn ProcessControl>) -> Result<Self> {
        Ok(Self::new(config.cluster, &config.layout, metrics, control)?.with_waits(config.waits.clone()))
    }

    pub fn with_waits(mut self, waits: WaitSettings) -> Self {
        self.waits = waits;
        self
    }

    /// Attach to members that are already running.
    pub fn with_running(mut self, running: impl IntoIterator<Item = MemberId>) -> Self {
        self.replicas = self.replicas.with_running(running);
        self
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn metrics(&self) -> &dyn MetricStore {
        self.metrics.as_ref()
    }

    pub fn replicas(&self) -> &ReplicaSet {
        &self.replicas
    }

    pub fn waits(&self) -> &WaitSettings {
        &self.waits
    }

    pub async fn start_replica(&self, id: MemberId) -> Result<()> {
        self.replicas.start_replica(id).await
    }

    pub async fn stop_replica(&self, id: MemberId) -> Result<()> {
        self.replicas.stop_replica(id).await
    }

    pub async fn start_replicas(&self, ids: &[MemberId]) -> Result<()> {
        self.replicas.start_replicas(ids).await
    }

    pub async fn stop_replicas(&self, ids: &[MemberId]) -> Result<()> {
        self.replicas.stop_replicas(ids).await
    }

    pub async fn start_all_replicas(&self) -> Result<()> {
        self.replicas.start_all_replicas().await
    }

    pub async fn stop_all_replicas(&self) -> Result<()> {
        self.replicas.stop_all_replicas().await
    }

    pub fn live_replicas(&self) -> Vec<MemberId> {
        self.replicas.live_replicas()
    }

    pub async fn force_quorum_including_replica(&self, replica: MemberId, primary: MemberId) -> Result<Vec<MemberId>> {
        self.replicas.force_quorum_including_replica(replica, primary).await
    }

    /// Retry `predicate` every `interval` until it returns `true`.
    ///
    /// An evaluation that takes longer than `interval` is abandoned and
    /// retried; errors from the predicate propagate.
    pub async fn wait_for<F, Fut>(&self, operation: &str, timeout: Duration, interval: Duration, predicate: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<bool>> + Send,
    {
        let probe = probe_fn(operation, || {
            let evaluation = predicate();
            async move {
                Ok(if evaluation.await? {
                    Attempt::Ready(())
                } else {
                    Attempt::pending()
                })
            }
        });
        bounded_poll(&probe, PollSettings::new(timeout, interval)).await
    }

    /// Poll one integer metric on `member` until it matches `expected`.
    pub(crate) async fn poll_integer(
        &self,
        operation: &str,
        member: MemberId,
        key: MetricKey,
        settings: PollSettings,
        expected: Expected,
    ) -> Result<u64> {
        self.integer_probe(operation, member, key, expected).poll(settings).await
    }

    pub(crate) fn integer_probe(&self, operation: &str, member: MemberId, key: MetricKey, expected: Expected) -> IntegerProbe {
        IntegerProbe {
            operation: operation.to_string(),
            metrics: self.metrics.clone(),
            member,
            key,
            expected,
        }
    }
}

/// Reads one integer metric of one member. Owns everything it touches, so
/// its poll future can be nested inside other probes and fan-outs.
pub(crate) struct IntegerProbe {
    operation: String,
    metrics: Arc<dyn MetricStore>,
    member: MemberId,
    key: MetricKey,
    expected: Expected,
}

impl IntegerProbe {
    pub(crate) async fn poll(self, settings: PollSettings) -> Result<u64> {
        bounded_poll(&self, settings).await
    }
}

#[async_trait]
impl Probe for IntegerProbe {
    type Output = u64;

    fn operation(&self) -> &str {
        &self.operation
    }

    async fn attempt(&self) -> Result<Attempt<u64>> {
        Ok(match self.metrics.fetch_integer(self.member, &self.key).await? {
            Some(value) if self.expected.matches(value) => Attempt::Ready(value),
            Some(value) => Attempt::observed(format!("{}={} on member {}", self.key.name, value, self.member)),
            None => Attempt::pending(),
        })
    }
}
