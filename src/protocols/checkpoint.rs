//! Checkpoint convergence

use std::collections::BTreeMap;
use tokio::time::Instant;
use tracing::info;

use crate::cluster::MemberId;
use crate::error::Result;
use crate::fanout::{fan_out_join, JoinPolicy};
use crate::metrics::keys;
use crate::network::BftNetwork;
use crate::poll::PollSettings;

impl BftNetwork {
    /// Wait for `replica` to store checkpoint `expected`, or with no target,
    /// return the first checkpoint number it reports.
    pub async fn wait_for_checkpoint(&self, replica: MemberId, expected: Option<u64>) -> Result<u64> {
        let settings = PollSettings::new(self.waits().checkpoint_timeout(), self.waits().checkpoint_poll_interval());
        self.poll_integer("wait_for_checkpoint", replica, keys::LAST_STORED_CHECKPOINT, settings, expected.into())
            .await
    }

    /// Every listed replica must reach the checkpoint; there is no quorum
    /// short-circuit. Returns the checkpoint each replica reported.
    pub async fn wait_for_replicas_to_checkpoint(
        &self,
        replicas: &[MemberId],
        expected: Option<u64>,
    ) -> Result<BTreeMap<MemberId, u64>> {
        let timeout = self.waits().checkpoint_timeout();
        let deadline = Instant::now() + timeout;
        let interval = self.waits().checkpoint_poll_interval();

        let report = fan_out_join("wait_for_replicas_to_checkpoint", replicas, JoinPolicy::All, timeout, move |replica| {
            self.integer_probe("wait_for_checkpoint", replica, keys::LAST_STORED_CHECKPOINT, expected.into())
                .poll(PollSettings::new(timeout, interval).within(deadline))
        })
        .await?;

        info!(replicas = ?report.members(), ?expected, "replicas checkpointed");
        Ok(report.converged.into_iter().collect())
    }
}
