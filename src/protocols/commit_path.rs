//! Fast/slow commit path prevalence
//!
//! Point-in-time checks over `slowPathCount` (and `lastExecutedSeqNum`) on
//! one replica, plus short poll loops that retry them until they hold.

use tracing::info;

use crate::cluster::MemberId;
use crate::error::{Result, WaitError};
use crate::metrics::{keys, Expected, MetricKey};
use crate::network::BftNetwork;
use crate::poll::{bounded_poll, probe_fn, Attempt, PollSettings};

/// At most one sequence went through the slow path since `baseline_slow`.
pub fn fast_path_prevalent(baseline_slow: u64, current_slow: u64) -> bool {
    current_slow >= baseline_slow && current_slow - baseline_slow <= 1
}

/// Every sequence executed after `as_of_seq_num` went through the slow path.
pub fn slow_path_prevalent(as_of_seq_num: u64, baseline_slow: u64, executed: u64, current_slow: u64) -> bool {
    current_slow >= baseline_slow && current_slow - baseline_slow >= executed.saturating_sub(as_of_seq_num)
}

impl BftNetwork {
    /// Fails with [`WaitError::ConditionNotMet`] unless the fast path is
    /// prevalent on `replica`.
    pub async fn assert_fast_path_prevalent(&self, baseline_slow: u64, replica: MemberId) -> Result<()> {
        let current_slow = self.required_integer(replica, keys::SLOW_PATH_COUNT).await?;
        if fast_path_prevalent(baseline_slow, current_slow) {
            Ok(())
        } else {
            Err(self.not_prevalent("Fast", baseline_slow, current_slow))
        }
    }

    /// Fails with [`WaitError::ConditionNotMet`] unless every sequence
    /// executed after `as_of_seq_num` took the slow path on `replica`.
    pub async fn assert_slow_path_prevalent(
        &self,
        as_of_seq_num: u64,
        baseline_slow: u64,
        replica: MemberId,
    ) -> Result<()> {
        let executed = self.required_integer(replica, keys::LAST_EXECUTED_SEQ_NUM).await?;
        let current_slow = self.required_integer(replica, keys::SLOW_PATH_COUNT).await?;
        if slow_path_prevalent(as_of_seq_num, baseline_slow, executed, current_slow) {
            Ok(())
        } else {
            Err(self.not_prevalent("Slow", baseline_slow, current_slow))
        }
    }

    pub async fn wait_for_fast_path_to_be_prevalent(&self, baseline_slow: u64, replica: MemberId) -> Result<()> {
        let probe = probe_fn("wait_for_fast_path_to_be_prevalent", move || async move {
            retry_unmet(self.assert_fast_path_prevalent(baseline_slow, replica).await)
        });
        bounded_poll(&probe, self.commit_path_settings()).await?;
        info!(replica, baseline_slow, "fast path prevalent");
        Ok(())
    }

    pub async fn wait_for_slow_path_to_be_prevalent(
        &self,
        as_of_seq_num: u64,
        baseline_slow: u64,
        replica: MemberId,
    ) -> Result<()> {
        let probe = probe_fn("wait_for_slow_path_to_be_prevalent", move || async move {
            retry_unmet(self.assert_slow_path_prevalent(as_of_seq_num, baseline_slow, replica).await)
        });
        bounded_poll(&probe, self.commit_path_settings()).await?;
        info!(replica, as_of_seq_num, baseline_slow, "slow path prevalent");
        Ok(())
    }

    /// Slow-path commits so far on replica 0.
    pub async fn num_of_slow_path(&self) -> Result<u64> {
        self.poll_integer("num_of_slow_path", 0, keys::SLOW_PATH_COUNT, self.commit_path_settings(), Expected::Any)
            .await
    }

    fn commit_path_settings(&self) -> PollSettings {
        PollSettings::new(self.waits().commit_path_timeout(), self.waits().commit_path_poll_interval())
    }

    async fn required_integer(&self, replica: MemberId, key: MetricKey) -> Result<u64> {
        match self.metrics().fetch_integer(replica, &key).await? {
            Some(value) => Ok(value),
            None => Err(WaitError::MissingMetric { member: replica, key }),
        }
    }

    fn not_prevalent(&self, path: &str, baseline_slow: u64, current_slow: u64) -> WaitError {
        let config = self.config();
        WaitError::condition(format!(
            "{} path is not prevalent for n={}, f={}, c={} (slowPathCount {} -> {})",
            path,
            config.n(),
            config.f(),
            config.c(),
            baseline_slow,
            current_slow
        ))
    }
}

/// Unmet conditions and unregistered metrics mean "keep polling".
fn retry_unmet(checked: Result<()>) -> Result<Attempt<()>> {
    match checked {
        Ok(()) => Ok(Attempt::Ready(())),
        Err(WaitError::ConditionNotMet(reason)) => Ok(Attempt::observed(reason)),
        Err(WaitError::MissingMetric { key, .. }) => Ok(Attempt::observed(format!("{} not registered", key))),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_path_prevalence() {
        assert!(fast_path_prevalent(3, 3));
        assert!(fast_path_prevalent(3, 4));
        assert!(!fast_path_prevalent(3, 6));
        assert!(!fast_path_prevalent(3, 2));
    }

    #[test]
    fn test_slow_path_prevalence() {
        // 5 sequences executed after seq 1, all on the slow path
        assert!(slow_path_prevalent(1, 0, 6, 5));
        assert!(!slow_path_prevalent(1, 0, 6, 4));
        assert!(!slow_path_prevalent(1, 5, 6, 4));
        assert!(slow_path_prevalent(10, 2, 3, 2));
    }

    #[test]
    fn test_retry_unmet_classification() {
        assert!(retry_unmet(Ok(())).unwrap().is_ready());
        assert!(!retry_unmet(Err(WaitError::condition("not yet"))).unwrap().is_ready());
        assert!(retry_unmet(Err(WaitError::unreachable(0, "refused"))).is_err());
    }
}
