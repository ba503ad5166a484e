//! Well-known replica metrics.

use super::MetricKey;

pub const LAST_AGREED_VIEW: MetricKey = MetricKey::from_static("replica", "Gauges", "lastAgreedView");
pub const CURRENT_ACTIVE_VIEW: MetricKey = MetricKey::from_static("replica", "Gauges", "currentActiveView");
pub const LAST_EXECUTED_SEQ_NUM: MetricKey = MetricKey::from_static("replica", "Gauges", "lastExecutedSeqNum");
pub const LAST_STABLE_SEQ_NUM: MetricKey = MetricKey::from_static("replica", "Gauges", "lastStableSeqNum");
pub const SLOW_PATH_COUNT: MetricKey = MetricKey::from_static("replica", "Counters", "slowPathCount");
pub const RECEIVED_STATE_TRANSFER_MSGS: MetricKey =
    MetricKey::from_static("replica", "Counters", "receivedStateTransferMsgs");

pub const LAST_STORED_CHECKPOINT: MetricKey =
    MetricKey::from_static("bc_state_transfer", "Gauges", "last_stored_checkpoint");
pub const ON_TRANSFERRING_COMPLETE: MetricKey =
    MetricKey::from_static("bc_state_transfer", "Counters", "on_transferring_complete");
pub const FETCHING_STATE: MetricKey = MetricKey::from_static("bc_state_transfer", "Statuses", "fetching_state");
pub const CURRENT_SOURCE_REPLICA: MetricKey =
    MetricKey::from_static("bc_state_transfer", "Gauges", "current_source_replica");

/// `fetching_state` value while no state transfer is in progress.
pub const NOT_FETCHING: &str = "NotFetching";
