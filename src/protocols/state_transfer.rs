//! State-transfer start/stop detection
//!
//! Start is a race: the first member to report received state-transfer
//! messages ends the wait for everyone. Stop captures a target sequence
//! number from an up-to-date replica once, then polls the stale replica's
//! full snapshot until it catches up.

use parking_lot::Mutex;
use tokio::time::{self, Instant};
use tracing::{debug, info};

use crate::cluster::MemberId;
use crate::error::{Result, TimeoutDiagnostics, WaitError};
use crate::fanout::{fan_out_join, JoinPolicy};
use crate::metrics::{keys, Expected, MetricSample};
use crate::network::BftNetwork;
use crate::poll::{bounded_poll, probe_fn, Attempt, PollSettings};

impl BftNetwork {
    /// Wait until any member, read-only replicas included, has received
    /// state-transfer messages. Returns that member.
    pub async fn wait_for_state_transfer_to_start(&self) -> Result<MemberId> {
        let timeout = self.waits().state_transfer_timeout();
        let deadline = Instant::now() + timeout;
        let interval = self.waits().state_transfer_poll_interval();
        let members = self.replicas().member_ids();

        let report = fan_out_join("wait_for_state_transfer_to_start", &members, JoinPolicy::First, timeout, move |member| {
            self.integer_probe("wait_to_receive_st_msgs", member, keys::RECEIVED_STATE_TRANSFER_MSGS, Expected::GreaterThan(0))
                .poll(PollSettings::new(timeout, interval).within(deadline))
        })
        .await?;

        match report.first() {
            Some(&(member, received)) => {
                info!(member, received, "state transfer started");
                Ok(member)
            }
            None => Err(WaitError::condition("state transfer start reported without a member")),
        }
    }

    /// Wait until `stale` has executed (or, with `stop_on_stable_seq_num`,
    /// stabilised) up to the sequence number `up_to_date` reports right now.
    /// Returns the stale replica's final sequence number.
    pub async fn wait_for_state_transfer_to_stop(
        &self,
        up_to_date: MemberId,
        stale: MemberId,
        stop_on_stable_seq_num: bool,
    ) -> Result<u64> {
        let started = Instant::now();
        let timeout = self.waits().state_transfer_timeout();
        let deadline = started + timeout;
        let key = if stop_on_stable_seq_num {
            keys::LAST_STABLE_SEQ_NUM
        } else {
            keys::LAST_EXECUTED_SEQ_NUM
        };

        let fetched = match time::timeout_at(deadline, self.metrics().fetch_integer(up_to_date, &key)).await {
            Ok(fetched) => fetched?,
            Err(_) => {
                let mut diagnostics = TimeoutDiagnostics::new("wait_for_state_transfer_to_stop", started.elapsed());
                diagnostics.attempts = 1;
                diagnostics.last_observed = Some(format!("no answer from up-to-date replica {}", up_to_date));
                return Err(WaitError::timeout(diagnostics));
            }
        };
        let target = match fetched {
            Some(target) => target,
            None => return Err(WaitError::MissingMetric { member: up_to_date, key }),
        };
        debug!(up_to_date, stale, target, %key, "state transfer target captured");

        let metrics = self.metrics();
        let key = &key;
        let last_seen: Mutex<Option<u64>> = Mutex::new(None);
        let last_seen = &last_seen;
        let probe = probe_fn("wait_for_state_transfer_to_stop", move || async move {
            let snapshot = metrics.fetch_all(stale).await?;
            let seq_num = match snapshot.get_local(key).into_integer(key)? {
                Some(seq_num) => seq_num,
                None => return Ok(Attempt::pending()),
            };

            let changed = last_seen.lock().replace(seq_num) != Some(seq_num);
            if changed {
                debug!(
                    stale,
                    seq_num,
                    target,
                    last_stored_checkpoint = %describe(snapshot.get_local(&keys::LAST_STORED_CHECKPOINT)),
                    on_transferring_complete = %describe(snapshot.get_local(&keys::ON_TRANSFERRING_COMPLETE)),
                    "stale replica progressed"
                );
            }

            Ok(if seq_num >= target {
                Attempt::Ready(seq_num)
            } else {
                Attempt::observed(format!("{}={} of {} on member {}", key.name, seq_num, target, stale))
            })
        });

        let settings = PollSettings::new(timeout, self.waits().state_transfer_poll_interval()).within(deadline);
        let seq_num = bounded_poll(&probe, settings).await?;
        info!(stale, seq_num, target, "state transfer finished");
        Ok(seq_num)
    }

    /// Wait until `replica` reports a fetching state other than
    /// `NotFetching`. Returns the replica it is fetching from.
    pub async fn wait_for_fetching_state(&self, replica: MemberId) -> Result<u64> {
        let metrics = self.metrics();
        let probe = probe_fn("wait_for_fetching_state", move || async move {
            let state = match metrics.fetch(replica, &keys::FETCHING_STATE).await?.value() {
                Some(state) => state,
                None => return Ok(Attempt::pending()),
            };
            if state.as_str() == Some(keys::NOT_FETCHING) {
                return Ok(Attempt::observed(format!("fetching_state={}", state)));
            }
            Ok(match metrics.fetch_integer(replica, &keys::CURRENT_SOURCE_REPLICA).await? {
                Some(source) => Attempt::Ready(source),
                None => Attempt::observed(format!("fetching_state={}, no source replica yet", state)),
            })
        });
        let settings = PollSettings::new(self.waits().fetching_state_timeout(), self.waits().state_transfer_poll_interval());
        let source = bounded_poll(&probe, settings).await?;
        info!(replica, source, "replica is fetching state");
        Ok(source)
    }

    /// Wait until `replica` has executed at least `expected` sequences.
    pub async fn wait_for_last_executed_seq_num(&self, replica: MemberId, expected: u64) -> Result<u64> {
        let settings = PollSettings::new(self.waits().seq_num_timeout(), self.waits().state_transfer_poll_interval());
        self.poll_integer("wait_for_last_executed_seq_num", replica, keys::LAST_EXECUTED_SEQ_NUM, settings, Expected::AtLeast(expected))
            .await
    }

    /// Point-in-time check that none of `up_replicas` has received any
    /// state-transfer message.
    pub async fn assert_state_transfer_not_started_all_up_nodes(&self, up_replicas: &[MemberId]) -> Result<()> {
        let metrics = self.metrics();
        fan_out_join(
            "assert_state_transfer_not_started",
            up_replicas,
            JoinPolicy::All,
            self.waits().metrics_timeout(),
            move |replica| async move {
                match metrics.fetch_integer(replica, &keys::RECEIVED_STATE_TRANSFER_MSGS).await? {
                    Some(0) => Ok(()),
                    Some(received) => Err(WaitError::condition(format!(
                        "replica {} already received {} state transfer messages",
                        replica, received
                    ))),
                    None => Err(WaitError::MissingMetric {
                        member: replica,
                        key: keys::RECEIVED_STATE_TRANSFER_MSGS,
                    }),
                }
            },
        )
        .await?;
        Ok(())
    }
}

fn describe(sample: MetricSample) -> String {
    sample.value().map(|value| value.to_string()).unwrap_or_else(|| "absent".to_string())
}
